//! Execution-trace sink shared by every component.
//!
//! Events go to the remote analytics backend while it is healthy. The first
//! remote failure flips the sink into degraded mode and every later event,
//! including the one that failed, is appended to the local JSONL log instead.
//! Degradation lasts until the process restarts. `emit` never reports failure
//! to its caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::metrics;
use crate::models::TelemetryEvent;

mod local;
mod remote;

pub use local::LocalLog;
pub use remote::{HttpBackend, RemoteBackend};

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("remote backend error: {0}")]
    Remote(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One line of the log: the event plus the process session it came from.
#[derive(Serialize)]
pub struct TelemetryRecord<'a> {
    pub session_id: &'a str,
    #[serde(flatten)]
    pub event: &'a TelemetryEvent,
}

pub struct TelemetrySink {
    session_id: String,
    remote: Option<Arc<dyn RemoteBackend>>,
    local: LocalLog,
    degraded: AtomicBool,
    write_lock: Mutex<()>,
}

impl TelemetrySink {
    /// Without a remote backend the sink starts out degraded.
    pub fn new(remote: Option<Arc<dyn RemoteBackend>>, local: LocalLog) -> Self {
        let degraded = remote.is_none();
        metrics::TELEMETRY_DEGRADED.set(i64::from(degraded));
        Self {
            session_id: format!("session_{}", Utc::now().format("%Y%m%d_%H%M%S")),
            remote,
            local,
            degraded: AtomicBool::new(degraded),
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        let local = LocalLog::new(&config.telemetry_log_dir);
        let remote: Option<Arc<dyn RemoteBackend>> = match &config.telemetry_endpoint {
            Some(endpoint) => Some(Arc::new(HttpBackend::new(
                http,
                endpoint.clone(),
                config.telemetry_api_key.clone(),
                config.telemetry_project.clone(),
            ))),
            None => {
                info!(dir = %config.telemetry_log_dir, "No telemetry endpoint configured, logging locally");
                None
            }
        };
        Self::new(remote, local)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub async fn emit(&self, event: TelemetryEvent) {
        let record = TelemetryRecord {
            session_id: &self.session_id,
            event: &event,
        };

        // Serializes writers so both backends see events in emit order.
        let _guard = self.write_lock.lock().await;

        if !self.is_degraded() {
            if let Some(remote) = &self.remote {
                match remote.send(&record).await {
                    Ok(()) => return,
                    Err(err) => {
                        warn!(
                            backend = remote.name(),
                            error = %err,
                            "Remote telemetry failed, switching to local log for the rest of this run"
                        );
                        self.degraded.store(true, Ordering::SeqCst);
                        metrics::TELEMETRY_DEGRADED.set(1);
                    }
                }
            }
        }

        if let Err(err) = self.local.append(&record, event.timestamp.date_naive()).await {
            error!(error = %err, kind = ?event.kind, "Failed to write telemetry event to local log");
        }
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Remote backend that accepts the first `healthy_calls` events, then fails.
    pub struct FlakyBackend {
        healthy_calls: usize,
        attempts: AtomicUsize,
        delivered: std::sync::Mutex<Vec<serde_json::Value>>,
    }

    impl FlakyBackend {
        pub fn new(healthy_calls: usize) -> Self {
            Self {
                healthy_calls,
                attempts: AtomicUsize::new(0),
                delivered: std::sync::Mutex::new(Vec::new()),
            }
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        pub fn delivered(&self) -> Vec<serde_json::Value> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn send(&self, record: &TelemetryRecord<'_>) -> Result<(), TelemetryError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n >= self.healthy_calls {
                return Err(TelemetryError::Remote("simulated outage".into()));
            }
            self.delivered
                .lock()
                .unwrap()
                .push(serde_json::to_value(record)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::FlakyBackend;
    use super::*;
    use crate::models::EventKind;
    use crate::test_support::read_events;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn event(n: usize) -> TelemetryEvent {
        TelemetryEvent::new(EventKind::AgentStart, Uuid::nil(), serde_json::json!({ "n": n }))
    }

    #[tokio::test]
    async fn degradation_is_monotonic() {
        let temp = tempdir().unwrap();
        let backend = Arc::new(FlakyBackend::new(2));
        let sink = TelemetrySink::new(Some(backend.clone()), LocalLog::new(temp.path()));

        for n in 0..5 {
            sink.emit(event(n)).await;
        }

        // Two delivered remotely, the third failed once, the rest never tried remote.
        assert_eq!(backend.attempts(), 3);
        assert_eq!(backend.delivered().len(), 2);
        assert!(sink.is_degraded());

        let local = read_events(temp.path());
        let ns: Vec<u64> = local.iter().map(|e| e["payload"]["n"].as_u64().unwrap()).collect();
        assert_eq!(ns, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn sink_without_remote_starts_degraded() {
        let temp = tempdir().unwrap();
        let sink = TelemetrySink::new(None, LocalLog::new(temp.path()));
        assert!(sink.is_degraded());

        sink.emit(event(1)).await;
        let local = read_events(temp.path());
        assert_eq!(local.len(), 1);
        assert_eq!(local[0]["kind"], "agent-start");
        assert_eq!(local[0]["session_id"], sink.session_id());
    }

    #[tokio::test]
    async fn unwritable_log_does_not_surface() {
        let temp = tempdir().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let sink = TelemetrySink::new(None, LocalLog::new(&blocker));
        // Must not panic or error.
        sink.emit(event(1)).await;
    }

    #[test]
    fn session_id_uses_timestamp_format() {
        let temp = tempdir().unwrap();
        let sink = TelemetrySink::new(None, LocalLog::new(temp.path()));
        assert!(sink.session_id().starts_with("session_"));
        assert_eq!(sink.session_id().len(), "session_20270110_120000".len());
    }
}
