// src/store.rs
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::decision::{Datafile, FlagConfig};

pub type StoreResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Holds the most recently fetched datafile.
///
/// Reads are synchronous so decisions never wait on the network.
pub trait DatafileStore {
    fn get(&self, flag_key: &str) -> StoreResult<Option<FlagConfig>>;
    fn refresh(&self, datafile: Datafile) -> StoreResult<()>;
    fn is_loaded(&self) -> bool;
    fn revision(&self) -> Option<String>;
    fn fetched_at(&self) -> Option<DateTime<Utc>>;
}

#[derive(Debug)]
struct Snapshot {
    flags: HashMap<String, FlagConfig>,
    revision: Option<String>,
    fetched_at: DateTime<Utc>,
}

pub struct MemoryStore {
    snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(None),
        }
    }

    fn current(&self) -> Option<Arc<Snapshot>> {
        // A poisoned lock reads as "nothing loaded", which fails closed.
        self.snapshot.read().ok()?.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DatafileStore for MemoryStore {
    fn get(&self, flag_key: &str) -> StoreResult<Option<FlagConfig>> {
        let snapshot = self.current();
        Ok(snapshot.and_then(|s| s.flags.get(flag_key).cloned()))
    }

    fn refresh(&self, datafile: Datafile) -> StoreResult<()> {
        let flags = datafile
            .feature_flags
            .into_iter()
            .map(|flag| (flag.key.clone(), flag))
            .collect();
        let snapshot = Arc::new(Snapshot {
            flags,
            revision: datafile.revision,
            fetched_at: Utc::now(),
        });

        let mut slot = self
            .snapshot
            .write()
            .map_err(|e| format!("datafile store lock poisoned: {}", e))?;
        *slot = Some(snapshot);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.current().is_some()
    }

    fn revision(&self) -> Option<String> {
        self.current().and_then(|s| s.revision.clone())
    }

    fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.current().map(|s| s.fetched_at)
    }
}
