//! Gateway: HTTP webhook bridges and read-only status.
//!
//! Each webhook decodes its provider payload into an inbound event and hands it to the
//! dispatcher's queue; nothing is processed on the request path.

mod server;

pub use server::{router, serve, GatewayState, AUTH_HEADER};
