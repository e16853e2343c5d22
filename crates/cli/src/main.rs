use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "beacon")]
#[command(about = "Beacon CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Write a default configuration file if none exists.
    Init {
        /// Config file path (default: BEACON_CONFIG_PATH or ~/.beacon/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the bot: realtime connection, dispatcher and webhook gateway.
    Serve {
        /// Config file path (default: BEACON_CONFIG_PATH or ~/.beacon/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Print the aggregated status reported by a running gateway.
    Status {
        /// Config file path (default: BEACON_CONFIG_PATH or ~/.beacon/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Relay a message to every channel the bot is in, through a running gateway.
    Relay {
        /// Config file path (default: BEACON_CONFIG_PATH or ~/.beacon/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Text to post.
        message: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("beacon {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Status { config }) => {
            if let Err(e) = run_status(config).await {
                log::error!("status failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Relay { config, message }) => {
            if let Err(e) = run_relay(config, message).await {
                log::error!("relay failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    if lib::config::init_config_file(&path)? {
        println!("initialized configuration at {}", path.display());
    } else {
        println!("configuration already present at {}", path.display());
    }
    Ok(())
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting beacon on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    lib::daemon::run(config).await
}

/// Base URL for reaching the local gateway. A wildcard bind is reached via loopback.
fn gateway_url(config: &lib::config::Config) -> String {
    let bind = config.gateway.bind.trim();
    let host = if bind.is_empty() || bind == "0.0.0.0" || bind == "::" {
        "127.0.0.1"
    } else {
        bind
    };
    format!("http://{}:{}", host, config.gateway.port)
}

async fn run_status(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let url = format!("{}/status", gateway_url(&config));
    let res = reqwest::get(&url).await?;
    if !res.status().is_success() {
        anyhow::bail!("GET {} returned {}", url, res.status());
    }
    let status: serde_json::Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn run_relay(config_path: Option<std::path::PathBuf>, message: String) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let token = lib::config::resolve_auth_token(&config)
        .ok_or_else(|| anyhow::anyhow!("no relay auth token configured (gateway.authToken or BEACON_AUTH_TOKEN)"))?;
    let url = format!("{}/message", gateway_url(&config));
    let res = reqwest::Client::new()
        .post(&url)
        .header(lib::gateway::AUTH_HEADER, token)
        .json(&serde_json::json!({ "message": message, "type": "cli" }))
        .send()
        .await?;
    if !res.status().is_success() {
        anyhow::bail!("POST {} returned {}", url, res.status());
    }
    println!("relayed");
    Ok(())
}
