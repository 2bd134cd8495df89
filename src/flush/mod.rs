//! Periodic write-back of the record cache.

pub mod daemon;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::error::Error;
use crate::store::RecordStore;

pub use daemon::{run_flush_daemon, FlushDaemon};

/// Default time between two flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(15);

/// How a periodic flush task ended. Every variant is reported after the
/// final flush has been attempted.
#[derive(Debug)]
pub enum FlushOutcome {
    /// The shutdown channel was closed without a shutdown request.
    Completed { saved: usize },
    /// Shutdown was requested.
    Cancelled { saved: usize },
    /// The task was aborted. The final flush ran as it was torn down, so
    /// its count is unknown.
    Aborted,
    /// A flush failed. Holds the first error seen.
    Failed(Error),
}

impl FlushOutcome {
    /// Files written by the final flush, if it succeeded.
    pub fn saved(&self) -> Option<usize> {
        match self {
            FlushOutcome::Completed { saved } | FlushOutcome::Cancelled { saved } => Some(*saved),
            FlushOutcome::Aborted | FlushOutcome::Failed(_) => None,
        }
    }

    /// True for an intentional stop, requested or aborted.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FlushOutcome::Cancelled { .. } | FlushOutcome::Aborted)
    }

    pub fn into_result(self) -> crate::Result<usize> {
        match self {
            FlushOutcome::Completed { saved } | FlushOutcome::Cancelled { saved } => Ok(saved),
            FlushOutcome::Aborted => Err(Error::Cancelled),
            FlushOutcome::Failed(e) => Err(e),
        }
    }
}

enum Stop {
    Closed,
    Shutdown,
    Error(Error),
}

/// Flushes the store once more if the task is dropped before it finishes,
/// e.g. when its `JoinHandle` is aborted.
struct FinalFlushGuard {
    store: Arc<RecordStore>,
    armed: bool,
}

impl FinalFlushGuard {
    fn new(store: Arc<RecordStore>) -> Self {
        Self { store, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for FinalFlushGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.store.flush() {
            Ok(saved) => log_saved(saved),
            Err(e) => tracing::error!("Final flush after abort failed: {}", e),
        }
    }
}

/// Run one write pass on the blocking pool.
async fn flush_blocking(store: &Arc<RecordStore>) -> crate::Result<usize> {
    let store = store.clone();
    tokio::task::spawn_blocking(move || store.flush())
        .await
        .map_err(|e| Error::Task(e.to_string()))?
}

fn log_saved(saved: usize) {
    let (s, were) = if saved == 1 { ("", "was") } else { ("s", "were") };
    tracing::info!("{} json file{} {} saved", saved, s, were);
}

/// Flush `store` every `interval` until `shutdown` turns true or closes.
///
/// The cache is flushed only when non-empty. Whatever stops the loop, one
/// final unconditional flush runs before the outcome is returned. Dropping
/// the future, polled or not, runs it too.
pub fn run_periodic_flush(
    store: Arc<RecordStore>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> impl Future<Output = FlushOutcome> + Send + 'static {
    let guard = FinalFlushGuard::new(store.clone());
    flush_loop(store, interval, shutdown, guard)
}

async fn flush_loop(
    store: Arc<RecordStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut guard: FinalFlushGuard,
) -> FlushOutcome {
    let stop = loop {
        if *shutdown.borrow_and_update() {
            break Stop::Shutdown;
        }

        if !store.is_empty() {
            match flush_blocking(&store).await {
                Ok(written) => {
                    if store.is_debug() {
                        tracing::debug!("Periodic flush wrote {} records", written);
                    }
                }
                Err(e) => break Stop::Error(e),
            }
        }

        tokio::select! {
            _ = sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break Stop::Closed;
                }
            }
        }
    };

    guard.disarm();
    let last = flush_blocking(&store).await;
    if let Ok(saved) = &last {
        log_saved(*saved);
    }

    match (stop, last) {
        (Stop::Error(e), Ok(_)) => {
            tracing::error!("Periodic flush failed: {}", e);
            FlushOutcome::Failed(e)
        }
        (Stop::Error(e), Err(last)) => {
            tracing::error!("Periodic flush failed: {}; final flush failed: {}", e, last);
            FlushOutcome::Failed(e)
        }
        (_, Err(last)) => {
            tracing::error!("Final flush failed: {}", last);
            FlushOutcome::Failed(last)
        }
        (Stop::Shutdown, Ok(saved)) => FlushOutcome::Cancelled { saved },
        (Stop::Closed, Ok(saved)) => FlushOutcome::Completed { saved },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> Arc<RecordStore> {
        Arc::new(RecordStore::new(Some(dir.path()), json!({"n": 0}), true).unwrap())
    }

    fn read(dir: &TempDir, name: &str) -> Value {
        let text = std::fs::read_to_string(dir.path().join(name)).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_shutdown_before_first_interval_still_flushes() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.check(1).unwrap().set("n", json!(5));

        let (tx, rx) = watch::channel(true);
        let outcome = run_periodic_flush(store, Duration::from_secs(3600), rx).await;
        drop(tx);

        assert!(outcome.is_cancelled());
        assert_eq!(outcome.saved(), Some(1));
        assert_eq!(read(&temp_dir, "1.json"), json!({"n": 5}));
    }

    #[tokio::test]
    async fn test_periodic_flush_then_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let handle = store.check(-3).unwrap();

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run_periodic_flush(
            store.clone(),
            Duration::from_millis(10),
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(read(&temp_dir, "-3.json"), json!({"n": 0}));

        handle.set("n", json!(9));
        tx.send(true).unwrap();
        let outcome = task.await.unwrap();

        assert_eq!(outcome.into_result().unwrap(), 1);
        assert_eq!(read(&temp_dir, "-3.json"), json!({"n": 9}));
    }

    #[tokio::test]
    async fn test_empty_cache_is_not_flushed_until_the_end() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let (tx, rx) = watch::channel(false);
        drop(tx);
        let outcome = run_periodic_flush(store, Duration::from_millis(10), rx).await;

        assert!(matches!(outcome, FlushOutcome::Completed { saved: 0 }));
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_write_error_fails_the_task() {
        crate::logging::init_test();
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("5.json")).unwrap();
        let store = store(&temp_dir);
        store.check(5).unwrap();

        let (_tx, rx) = watch::channel(false);
        let outcome = run_periodic_flush(store, Duration::from_millis(10), rx).await;

        assert!(matches!(outcome, FlushOutcome::Failed(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_dropped_task_flushes() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let (_tx, rx) = watch::channel(false);
        let task = tokio::spawn(run_periodic_flush(
            store.clone(),
            Duration::from_secs(3600),
            rx,
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;

        store.check(11).unwrap().set("n", json!(1));
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert_eq!(read(&temp_dir, "11.json"), json!({"n": 1}));
    }
}
