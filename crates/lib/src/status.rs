//! Aggregated service status: the latest monitoring snapshot, fed by alerts and the poller.
//!
//! The snapshot is immutable and swapped whole under a write lock, so a reader always sees
//! the fields of exactly one update.

use crate::events::MonitoringAlert;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub summary: String,
    pub apdex: f64,
    pub health: String,
    pub last_reported: Option<DateTime<Utc>>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            summary: "no data yet".to_string(),
            apdex: 0.0,
            health: String::new(),
            last_reported: None,
        }
    }
}

/// Application health as reported by the monitoring API.
#[derive(Debug, Clone, PartialEq)]
pub struct AppReport {
    pub health: String,
    pub apdex: f64,
    pub last_reported: DateTime<Utc>,
}

fn summarize(health: &str) -> String {
    format!("Health: {}", health)
}

#[derive(Debug, Default)]
pub struct StatusAggregator {
    current: RwLock<Arc<StatusSnapshot>>,
}

impl StatusAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an alert: its severity becomes the health label. Apdex is kept from the previous snapshot.
    pub fn update(&self, alert: &MonitoringAlert) {
        let mut current = self.current.write().unwrap_or_else(|p| p.into_inner());
        let next = StatusSnapshot {
            summary: summarize(&alert.severity),
            apdex: current.apdex,
            health: alert.severity.clone(),
            last_reported: Some(alert.created_at),
        };
        *current = Arc::new(next);
    }

    /// Record a monitoring API poll result.
    pub fn update_report(&self, report: &AppReport) {
        let next = Arc::new(StatusSnapshot {
            summary: summarize(&report.health),
            apdex: report.apdex,
            health: report.health.clone(),
            last_reported: Some(report.last_reported),
        });
        *self.current.write().unwrap_or_else(|p| p.into_inner()) = next;
    }

    pub fn read(&self) -> StatusSnapshot {
        let current = self.current.read().unwrap_or_else(|p| p.into_inner());
        (**current).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::{Rng, SeedableRng};
    use std::thread;

    fn alert(severity: &str, minute: u32) -> MonitoringAlert {
        MonitoringAlert {
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap(),
            severity: severity.to_string(),
            short_description: String::new(),
            message: "m".to_string(),
        }
    }

    #[test]
    fn starts_with_placeholder() {
        let s = StatusAggregator::new().read();
        assert_eq!(s.summary, "no data yet");
        assert_eq!(s.apdex, 0.0);
        assert!(s.last_reported.is_none());
    }

    #[test]
    fn alert_keeps_apdex_from_last_poll() {
        let agg = StatusAggregator::new();
        agg.update_report(&AppReport {
            health: "green".into(),
            apdex: 0.93,
            last_reported: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        });
        agg.update(&alert("critical", 5));
        let s = agg.read();
        assert_eq!(s.summary, "Health: critical");
        assert_eq!(s.health, "critical");
        assert_eq!(s.apdex, 0.93);
        assert_eq!(s.last_reported, Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap()));
    }

    #[test]
    fn readers_never_see_mixed_updates() {
        let agg = Arc::new(StatusAggregator::new());
        for round in 0..5u64 {
            let writer = {
                let agg = agg.clone();
                thread::spawn(move || {
                    let mut rng = rand::rngs::StdRng::seed_from_u64(round);
                    for i in 0..500u32 {
                        let minute = i % 60;
                        if rng.gen_bool(0.5) {
                            agg.update(&alert(&format!("sev-{}", minute), minute));
                        } else {
                            agg.update_report(&AppReport {
                                health: format!("sev-{}", minute),
                                apdex: f64::from(minute),
                                last_reported: Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap(),
                            });
                        }
                        if rng.gen_bool(0.1) {
                            thread::yield_now();
                        }
                    }
                })
            };
            let readers: Vec<_> = (0..4)
                .map(|_| {
                    let agg = agg.clone();
                    thread::spawn(move || {
                        for _ in 0..500 {
                            let s = agg.read();
                            let Some(ts) = s.last_reported else { continue };
                            let minute = chrono::Timelike::minute(&ts);
                            assert_eq!(s.health, format!("sev-{}", minute));
                            assert_eq!(s.summary, format!("Health: sev-{}", minute));
                        }
                    })
                })
                .collect();
            writer.join().unwrap();
            for r in readers {
                r.join().unwrap();
            }
        }
    }
}
