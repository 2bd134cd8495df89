//! Configuration loading for chatstate.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Default seconds between two periodic flushes.
pub const DEFAULT_FLUSH_INTERVAL_SECS: f64 = 15.0;

/// Store configuration, usually read from a JSON settings file.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StoreConfig {
    /// Directory holding `<id>.json` files. `None` means the current directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Default keys and values every reconciled record carries.
    #[serde(default)]
    pub base: Map<String, Value>,

    /// Verbose per-record diagnostics.
    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: f64,
}

fn default_flush_interval_secs() -> f64 {
    DEFAULT_FLUSH_INTERVAL_SECS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: None,
            base: Map::new(),
            debug: false,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
        }
    }
}

impl StoreConfig {
    /// Load a config file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found at {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config: StoreConfig = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::debug!("Loaded store config from {}", path.display());
        Ok(config)
    }

    /// Build a config whose base schema comes from an arbitrary JSON value.
    ///
    /// Anything other than a JSON object is rejected.
    pub fn with_base_value(mut self, base: Value) -> Result<Self> {
        self.base = base_from_value(base)?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.flush_interval_secs.is_finite() || self.flush_interval_secs < 0.0 {
            return Err(Error::Config(format!(
                "flush_interval_secs must be a non-negative number, got {}",
                self.flush_interval_secs
            )));
        }
        resolve_dir(self.dir.as_deref())?;
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs_f64(self.flush_interval_secs)
    }
}

/// Resolve the target directory, `None` meaning the current one.
pub fn resolve_dir(dir: Option<&Path>) -> Result<PathBuf> {
    let dir = match dir {
        None => PathBuf::from("."),
        Some(d) if d.as_os_str().is_empty() => {
            return Err(Error::Config(
                "'dir' is empty, pass None to use the current directory".to_string(),
            ));
        }
        Some(d) => d.to_path_buf(),
    };

    if !dir.is_dir() {
        return Err(Error::Config(format!(
            "'{}' is not a directory, pass None to use the current one",
            dir.display()
        )));
    }
    Ok(dir)
}

/// Accept a base schema only if it is a JSON object.
pub fn base_from_value(base: Value) -> Result<Map<String, Value>> {
    match base {
        Value::Object(map) => Ok(map),
        other => Err(Error::Config(format!(
            "'base' must be a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
