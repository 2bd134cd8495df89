//! Lazy-write record store.
//!
//! Records live in memory once loaded and are written back to
//! `<dir>/<id>.json` only on [`RecordStore::flush`], either called
//! explicitly or from the periodic flush task.

pub mod identifier;
pub mod record;

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::{base_from_value, resolve_dir, StoreConfig};
use crate::error::{Error, Result};

pub use identifier::{file_name, parse_file_name, parse_identifier};
pub use record::{reconcile, Record, RecordHandle};

/// In-memory cache of JSON records backed by one file per identifier.
#[derive(Debug)]
pub struct RecordStore {
    main_dir: PathBuf,
    base: Record,
    debug: bool,
    updates: Mutex<HashMap<i64, RecordHandle>>,
    // Serializes write passes so two flushes never interleave on one file.
    writing: Mutex<()>,
}

impl RecordStore {
    /// Create a store over `dir` (`None` for the current directory).
    ///
    /// `base` must be a JSON object; it becomes the default schema of every
    /// record reconciled by [`RecordStore::check`].
    pub fn new(dir: Option<&Path>, base: Value, debug: bool) -> Result<Self> {
        let main_dir = resolve_dir(dir)?;
        let base = base_from_value(base)?;
        Ok(Self::with_parts(main_dir, base, debug))
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let main_dir = resolve_dir(config.dir.as_deref())?;
        Ok(Self::with_parts(main_dir, config.base.clone(), config.debug))
    }

    fn with_parts(main_dir: PathBuf, base: Record, debug: bool) -> Self {
        if debug {
            tracing::debug!(
                "Record store opened at {} with {} base keys",
                main_dir.display(),
                base.len()
            );
        }
        Self {
            main_dir,
            base,
            debug,
            updates: Mutex::new(HashMap::new()),
            writing: Mutex::new(()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<i64, RecordHandle>> {
        self.updates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn main_dir(&self) -> &Path {
        &self.main_dir
    }

    /// Copy of the base schema.
    pub fn base(&self) -> Record {
        self.base.clone()
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Path of the file backing `id`.
    pub fn path_for(&self, id: i64) -> PathBuf {
        self.main_dir.join(file_name(id))
    }

    pub fn len(&self) -> usize {
        self.cache().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache().is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.cache().contains_key(&id)
    }

    /// Cached identifiers in ascending order.
    pub fn identifiers(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.cache().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Copy of every cached record, keyed by identifier.
    pub fn snapshot(&self) -> BTreeMap<i64, Record> {
        self.handles()
            .into_iter()
            .map(|(id, handle)| (id, handle.snapshot()))
            .collect()
    }

    fn handles(&self) -> Vec<(i64, RecordHandle)> {
        let mut handles: Vec<(i64, RecordHandle)> = self
            .cache()
            .iter()
            .map(|(id, handle)| (*id, handle.clone()))
            .collect();
        handles.sort_unstable_by_key(|(id, _)| *id);
        handles
    }

    /// Get the record for `id`, from memory or from its file.
    ///
    /// Fails with [`Error::NotFound`] when neither exists; use
    /// [`RecordStore::check`] first when existence is uncertain.
    pub fn get(&self, id: i64) -> Result<RecordHandle> {
        if let Some(handle) = self.cache().get(&id) {
            if self.debug {
                tracing::debug!("Got {} from updates", id);
            }
            return Ok(handle.clone());
        }

        let path = self.path_for(id);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound { id, path });
            }
            Err(e) => return Err(e.into()),
        };
        let record: Record = serde_json::from_str(&content)?;

        // Another caller may have loaded the same id meanwhile; keep theirs.
        let handle = self
            .cache()
            .entry(id)
            .or_insert_with(|| RecordHandle::new(record))
            .clone();

        if self.debug {
            tracing::debug!("Got {} from file {}", id, path.display());
        }
        Ok(handle)
    }

    /// Get-or-create `id` with exactly the base schema's keys.
    ///
    /// An existing record (cached or on disk) keeps its values for base keys
    /// and takes base defaults for the rest. An unknown id starts as a copy
    /// of the base. The reconciled record replaces the cached one in place, so
    /// handles obtained earlier observe it too.
    pub fn check(&self, id: i64) -> Result<RecordHandle> {
        if !self.contains(id) && self.path_for(id).is_file() {
            self.get(id)?;
        }

        // Insert under the same lock that tests for presence, so concurrent
        // checks of a new id share one handle.
        let handle = self
            .cache()
            .entry(id)
            .or_insert_with(|| RecordHandle::new(self.base()))
            .clone();
        handle.update(|record| *record = reconcile(&self.base, record));

        if self.debug {
            tracing::debug!("Checked {} against base schema", id);
        }
        Ok(handle)
    }

    /// Load every `<integer>.json` file of the directory into the cache.
    ///
    /// Other entries are skipped with a warning. Returns a copy of the whole
    /// cache, including records loaded before this call.
    pub fn merge_all(&self) -> Result<BTreeMap<i64, Record>> {
        for entry in std::fs::read_dir(&self.main_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_str();
            // `007.json` matches the pattern but is not the file of id 7.
            match name.and_then(parse_file_name) {
                Some(id) if name == Some(file_name(id).as_str()) => {
                    self.get(id)?;
                }
                _ => {
                    tracing::warn!(
                        "Unexpected file {} in merge_all(), it was skipped",
                        entry.path().display()
                    );
                }
            }
        }
        Ok(self.snapshot())
    }

    /// Write one cached record to its file. Returns false if `id` is not cached.
    pub fn flush_one(&self, id: i64) -> Result<bool> {
        let _writing = self.writing.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = match self.cache().get(&id) {
            Some(handle) => handle.clone(),
            None => return Ok(false),
        };
        self.write_record(id, &handle)?;
        Ok(true)
    }

    /// Write every cached record to its file, returning how many were written.
    ///
    /// The first failure aborts the pass.
    pub fn flush(&self) -> Result<usize> {
        let _writing = self.writing.lock().unwrap_or_else(PoisonError::into_inner);
        let mut written = 0;
        for (id, handle) in self.handles() {
            self.write_record(id, &handle)?;
            written += 1;
        }
        Ok(written)
    }

    fn write_record(&self, id: i64, handle: &RecordHandle) -> Result<()> {
        let content = handle.to_pretty_json()?;
        if self.debug {
            tracing::debug!("Pushing {} {}", id, content);
        }
        std::fs::write(self.path_for(id), content)?;
        Ok(())
    }
}
