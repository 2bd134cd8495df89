//! CLI commands for chatstate using clap.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::error::Error;
use crate::flush::run_flush_daemon;
use crate::store::{parse_identifier, RecordStore};

/// chatstate - lazy-write JSON records, one file per chat id.
#[derive(Parser, Debug)]
#[command(name = "chatstate")]
#[command(version = "0.1.0")]
#[command(about = "Inspect and maintain a directory of <id>.json records", long_about = None)]
pub struct Commands {
    /// Directory holding the records (defaults to the current one)
    #[arg(long, global = true, env = "CHATSTATE_DIR")]
    pub dir: Option<PathBuf>,

    /// JSON settings file with dir, base, debug and flush_interval_secs
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base schema as a JSON object, overriding the config file
    #[arg(long, global = true)]
    pub base: Option<String>,

    /// Verbose per-record logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a record (it must already exist)
    Show {
        #[arg(value_parser = parse_identifier, allow_negative_numbers = true)]
        id: i64,
    },

    /// Create or reconcile a record against the base schema and save it
    Check {
        #[arg(value_parser = parse_identifier, allow_negative_numbers = true)]
        id: i64,
    },

    /// Set one key of a record to a JSON value and save it
    Set {
        #[arg(value_parser = parse_identifier, allow_negative_numbers = true)]
        id: i64,
        key: String,
        /// JSON value; bare words are stored as strings
        value: String,
    },

    /// List the identifiers found in the directory
    List,

    /// Load every record and flush periodically until Ctrl+C
    Watch {
        /// Seconds between flushes
        #[arg(long)]
        interval: Option<f64>,
    },
}

impl Commands {
    /// Merge the config file with command line overrides.
    pub fn store_config(&self) -> Result<StoreConfig> {
        let mut config = match &self.config {
            Some(path) => StoreConfig::load(path)?,
            None => StoreConfig::default(),
        };
        if self.dir.is_some() {
            config.dir = self.dir.clone();
        }
        if let Some(base) = &self.base {
            let value: Value = serde_json::from_str(base).context("--base is not valid JSON")?;
            config = config.with_base_value(value)?;
        }
        if let Command::Watch {
            interval: Some(secs),
        } = &self.command
        {
            config.flush_interval_secs = *secs;
        }
        config.debug |= self.debug;
        config.validate()?;
        Ok(config)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.store_config()?;
        let store = RecordStore::from_config(&config)?;

        match self.command {
            Command::Show { id } => cmd_show(&store, id),
            Command::Check { id } => cmd_check(&store, id),
            Command::Set { id, key, value } => cmd_set(&store, id, key, &value),
            Command::List => cmd_list(&store),
            Command::Watch { .. } => cmd_watch(store, config.flush_interval()).await,
        }
    }
}

fn cmd_show(store: &RecordStore, id: i64) -> Result<()> {
    let record = store.get(id)?;
    println!("{}", serde_json::to_string_pretty(&record.snapshot())?);
    Ok(())
}

/// `check` rebuilds records from the base key set, so an empty base would
/// wipe every existing record it touches.
fn require_base(store: &RecordStore) -> crate::Result<()> {
    if store.base().is_empty() {
        return Err(Error::Config(
            "no base schema configured, pass --base or --config before check/set".to_string(),
        ));
    }
    Ok(())
}

fn cmd_check(store: &RecordStore, id: i64) -> Result<()> {
    require_base(store)?;
    let record = store.check(id)?;
    store.flush_one(id)?;
    println!("{}", serde_json::to_string_pretty(&record.snapshot())?);
    Ok(())
}

fn cmd_set(store: &RecordStore, id: i64, key: String, raw: &str) -> Result<()> {
    require_base(store)?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    let record = store.check(id)?;
    if let Some(old) = record.set(key.clone(), value.clone()) {
        tracing::info!("{}: {} changed from {} to {}", id, key, old, value);
    }
    store.flush_one(id)?;
    println!("{}", serde_json::to_string_pretty(&record.snapshot())?);
    Ok(())
}

fn cmd_list(store: &RecordStore) -> Result<()> {
    let records = store.merge_all()?;
    for (id, record) in &records {
        println!("{}\t{} keys", id, record.len());
    }
    println!("{} records in {}", records.len(), store.main_dir().display());
    Ok(())
}

async fn cmd_watch(store: RecordStore, interval: Duration) -> Result<()> {
    let loaded = store.merge_all()?.len();
    println!("Watching {} records, flushing every {:?}. Ctrl+C to stop.", loaded, interval);

    let outcome = run_flush_daemon(Arc::new(store), interval).await;
    let saved = outcome.into_result()?;
    println!("{} json file(s) saved", saved);
    Ok(())
}
