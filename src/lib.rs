//! chatstate library root.
//!
//! A lazy-write cache of JSON records, one `<id>.json` file per integer id,
//! flushed back to disk by a background task.

pub mod cli;
pub mod config;
pub mod error;
pub mod flush;
pub mod logging;
pub mod store;

pub use cli::Commands;
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use flush::{run_periodic_flush, FlushDaemon, FlushOutcome, DEFAULT_FLUSH_INTERVAL};
pub use store::{Record, RecordHandle, RecordStore};
