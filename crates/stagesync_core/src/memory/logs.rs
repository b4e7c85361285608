//! Recording cache, event and replication logs.

use crate::error::StagingResult;
use crate::host::{CacheInvalidator, EventLog, ReplicationLog, ReplicationRecord};
use parking_lot::RwLock;

/// Cache invalidator that records what it was asked to drop.
#[derive(Debug, Default)]
pub struct MemoryCache {
    touched: RwLock<Vec<String>>,
    search: RwLock<Vec<(i64, Option<String>)>>,
}

impl MemoryCache {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every touched key, in order.
    pub fn touched(&self) -> Vec<String> {
        self.touched.read().clone()
    }

    /// Search invalidations as `(node, culture)`.
    pub fn search_invalidations(&self) -> Vec<(i64, Option<String>)> {
        self.search.read().clone()
    }
}

impl CacheInvalidator for MemoryCache {
    fn touch(&self, keys: &[String]) {
        self.touched.write().extend(keys.iter().cloned());
    }

    fn invalidate_search(&self, node_id: i64, culture: Option<&str>) {
        self.search
            .write()
            .push((node_id, culture.map(str::to_string)));
    }
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEntry {
    /// Component that logged the event.
    pub source: String,
    /// Event code.
    pub event_code: String,
    /// Message.
    pub message: String,
}

/// Event log held in memory.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    entries: RwLock<Vec<EventEntry>>,
}

impl MemoryEventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Logged entries.
    pub fn entries(&self) -> Vec<EventEntry> {
        self.entries.read().clone()
    }
}

impl EventLog for MemoryEventLog {
    fn log_error(&self, source: &str, event_code: &str, message: &str) {
        self.entries.write().push(EventEntry {
            source: source.to_string(),
            event_code: event_code.to_string(),
            message: message.to_string(),
        });
    }
}

/// Replication log held in memory.
#[derive(Debug, Default)]
pub struct MemoryReplicationLog {
    records: RwLock<Vec<ReplicationRecord>>,
}

impl MemoryReplicationLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appended records, oldest first.
    pub fn records(&self) -> Vec<ReplicationRecord> {
        self.records.read().clone()
    }
}

impl ReplicationLog for MemoryReplicationLog {
    fn append(&self, record: ReplicationRecord) -> StagingResult<()> {
        self.records.write().push(record);
        Ok(())
    }
}
