//! In-memory object store.

use crate::error::{StagingError, StagingResult};
use crate::host::ObjectStore;
use crate::object::ObjectTypeDescriptor;
use parking_lot::RwLock;
use stagesync_codec::Row;
use std::collections::BTreeMap;

type Table = BTreeMap<i64, Row>;

/// Object rows held in memory, one table per object type.
///
/// Identifiers are allocated as `max + 1` per table.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    tables: RwLock<BTreeMap<String, Table>>,
}

impl MemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows of a type, ordered by identifier.
    pub fn rows(&self, object_type: &str) -> Vec<Row> {
        self.tables
            .read()
            .get(object_type)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of rows of a type.
    pub fn count(&self, object_type: &str) -> usize {
        self.tables.read().get(object_type).map_or(0, BTreeMap::len)
    }
}

fn matches(row: &Row, criteria: &Row) -> bool {
    criteria.iter().all(|(column, value)| row.get(column) == value)
}

impl ObjectStore for MemoryObjectStore {
    fn get(&self, descriptor: &ObjectTypeDescriptor, id: i64) -> StagingResult<Option<Row>> {
        Ok(self
            .tables
            .read()
            .get(&descriptor.object_type)
            .and_then(|t| t.get(&id))
            .cloned())
    }

    fn find(&self, descriptor: &ObjectTypeDescriptor, criteria: &Row) -> StagingResult<Vec<Row>> {
        Ok(self
            .tables
            .read()
            .get(&descriptor.object_type)
            .map(|t| t.values().filter(|r| matches(r, criteria)).cloned().collect())
            .unwrap_or_default())
    }

    fn insert(
        &self,
        descriptor: &ObjectTypeDescriptor,
        row: &Row,
        preferred_id: Option<i64>,
    ) -> StagingResult<i64> {
        let mut tables = self.tables.write();
        let table = tables.entry(descriptor.object_type.clone()).or_default();
        let id = match preferred_id {
            Some(id) if table.contains_key(&id) => {
                return Err(StagingError::host(format!(
                    "{} {id} already exists",
                    descriptor.object_type
                )));
            }
            Some(id) => id,
            None => table.keys().next_back().map_or(1, |max| max + 1),
        };
        let mut stored = row.clone();
        stored.set(descriptor.id_column.clone(), id);
        table.insert(id, stored);
        Ok(id)
    }

    fn update(&self, descriptor: &ObjectTypeDescriptor, row: &Row) -> StagingResult<()> {
        let id = row.id(&descriptor.id_column).ok_or_else(|| {
            StagingError::host(format!("{} update without identifier", descriptor.object_type))
        })?;
        let mut tables = self.tables.write();
        let slot = tables
            .get_mut(&descriptor.object_type)
            .and_then(|t| t.get_mut(&id))
            .ok_or_else(|| {
                StagingError::host(format!("{} {id} does not exist", descriptor.object_type))
            })?;
        *slot = row.clone();
        Ok(())
    }

    fn delete(&self, descriptor: &ObjectTypeDescriptor, id: i64) -> StagingResult<bool> {
        Ok(self
            .tables
            .write()
            .get_mut(&descriptor.object_type)
            .is_some_and(|t| t.remove(&id).is_some()))
    }
}
