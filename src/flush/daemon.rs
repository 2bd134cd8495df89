//! Background flush daemon owning the periodic flush task.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::store::RecordStore;

use super::{run_periodic_flush, FlushOutcome};

/// Handle to a spawned periodic flush task.
pub struct FlushDaemon {
    shutdown: Arc<watch::Sender<bool>>,
    task: JoinHandle<FlushOutcome>,
}

impl FlushDaemon {
    /// Spawn the flush loop on the current tokio runtime.
    pub fn spawn(store: Arc<RecordStore>, interval: Duration) -> Self {
        let (shutdown, rx) = watch::channel(false);
        tracing::info!(
            "Flush daemon started for {} (every {:?})",
            store.main_dir().display(),
            interval
        );
        let task = tokio::spawn(run_periodic_flush(store, interval, rx));
        Self {
            shutdown: Arc::new(shutdown),
            task,
        }
    }

    /// Sender side of the shutdown signal, for wiring to other triggers.
    pub fn shutdown_signal(&self) -> Arc<watch::Sender<bool>> {
        self.shutdown.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the loop to stop and wait for its final flush.
    pub async fn shutdown(self) -> FlushOutcome {
        // The task may already have exited on a flush error.
        let _ = self.shutdown.send(true);
        join(self.task).await
    }

    /// Abort the task without waiting for the next interval.
    ///
    /// The final flush still runs while the task is torn down, so the outcome
    /// is [`FlushOutcome::Aborted`] rather than a failure.
    pub async fn abort(self) -> FlushOutcome {
        self.task.abort();
        join(self.task).await
    }
}

async fn join(task: JoinHandle<FlushOutcome>) -> FlushOutcome {
    match task.await {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => FlushOutcome::Aborted,
        Err(e) => FlushOutcome::Failed(Error::Task(e.to_string())),
    }
}

/// Run a flush daemon over `store` until Ctrl+C.
pub async fn run_flush_daemon(store: Arc<RecordStore>, interval: Duration) -> FlushOutcome {
    let daemon = FlushDaemon::spawn(store, interval);

    // Handle Ctrl+C
    let signal = daemon.shutdown_signal();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Flush daemon stopping");
        let _ = signal.send(true);
    });

    join(daemon.task).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn read(dir: &TempDir, name: &str) -> Value {
        let text = std::fs::read_to_string(dir.path().join(name)).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_daemon_shutdown_flushes() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(
            RecordStore::new(Some(temp_dir.path()), json!({"lang": "en"}), false).unwrap(),
        );
        store.check(42).unwrap();

        let daemon = FlushDaemon::spawn(store.clone(), Duration::from_millis(10));
        store.get(42).unwrap().set("lang", json!("pt"));
        let outcome = daemon.shutdown().await;

        assert!(outcome.is_cancelled());
        assert_eq!(outcome.saved(), Some(1));
        assert_eq!(read(&temp_dir, "42.json"), json!({"lang": "pt"}));
    }

    #[tokio::test]
    async fn test_daemon_external_signal() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(
            RecordStore::new(Some(temp_dir.path()), json!({"lang": "en"}), false).unwrap(),
        );
        store.check(-1).unwrap();

        let daemon = FlushDaemon::spawn(store, Duration::from_secs(3600));
        daemon.shutdown_signal().send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(daemon.is_finished());

        assert_eq!(daemon.shutdown().await.saved(), Some(1));
        assert!(temp_dir.path().join("-1.json").exists());
    }

    #[tokio::test]
    async fn test_daemon_abort_flushes() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(
            RecordStore::new(Some(temp_dir.path()), json!({"n": 0}), false).unwrap(),
        );

        let daemon = FlushDaemon::spawn(store.clone(), Duration::from_secs(3600));
        store.check(3).unwrap().set("n", json!(7));
        let outcome = daemon.abort().await;

        assert!(outcome.is_cancelled());
        assert!(matches!(outcome, FlushOutcome::Aborted));
        assert!(matches!(outcome.into_result(), Err(Error::Cancelled)));
        assert_eq!(read(&temp_dir, "3.json"), json!({"n": 7}));
    }
}
