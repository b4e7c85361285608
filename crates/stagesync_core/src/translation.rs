//! Session-scoped identifier translation.

use crate::error::StagingResult;
use stagesync_codec::TranslationSeed;
use std::collections::{HashMap, HashSet};

type Key = (String, i64);

/// Finds the target object a seed row describes.
///
/// The resolver receives the table so that seeds can refer to other seeds
/// (e.g. an object seeded by code name within a seeded group).
pub trait SeedResolver {
    /// Returns the target identifier of the object `seed` describes.
    fn resolve(
        &self,
        table: &mut TranslationTable,
        seed: &TranslationSeed,
    ) -> StagingResult<Option<i64>>;
}

impl<F> SeedResolver for F
where
    F: Fn(&mut TranslationTable, &TranslationSeed) -> StagingResult<Option<i64>>,
{
    fn resolve(
        &self,
        table: &mut TranslationTable,
        seed: &TranslationSeed,
    ) -> StagingResult<Option<i64>> {
        self(table, seed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    target_id: i64,
    group_id: Option<i64>,
}

/// Maps `(object type, source id)` to target identifiers for one task.
///
/// Entries are write-once: the first translation recorded for a key stays
/// in effect until the table is dropped at task end.
#[derive(Debug, Default)]
pub struct TranslationTable {
    entries: HashMap<Key, Entry>,
    seeds: HashMap<Key, TranslationSeed>,
    defaults: HashMap<String, Vec<i64>>,
    resolving: HashSet<Key>,
}

impl TranslationTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table seeded from a change-set's translation rows.
    pub fn seeded<'a>(seeds: impl IntoIterator<Item = &'a TranslationSeed>) -> Self {
        let mut table = Self::new();
        for seed in seeds {
            table
                .seeds
                .entry((seed.object_type.clone(), seed.source_id))
                .or_insert_with(|| seed.clone());
        }
        table
    }

    /// Records a translation. Returns false (and keeps the old value) if the
    /// key was already translated.
    pub fn add_translation(
        &mut self,
        object_type: &str,
        source_id: i64,
        target_id: i64,
        group_id: Option<i64>,
    ) -> bool {
        let key = (object_type.to_string(), source_id);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, Entry { target_id, group_id });
        true
    }

    /// The recorded translation, without consulting seeds or defaults.
    pub fn recorded(&self, object_type: &str, source_id: i64) -> Option<i64> {
        self.entries
            .get(&(object_type.to_string(), source_id))
            .map(|e| e.target_id)
    }

    /// Group recorded with a translation.
    pub fn group_of(&self, object_type: &str, source_id: i64) -> Option<i64> {
        self.entries
            .get(&(object_type.to_string(), source_id))
            .and_then(|e| e.group_id)
    }

    /// Translates a source identifier.
    ///
    /// Lookup order: recorded translations, then the seed for the key
    /// (resolved on the target through `resolver`; a hit is recorded), then
    /// the active default for the type.
    ///
    /// # Errors
    ///
    /// Propagates resolver errors.
    pub fn get_target_id(
        &mut self,
        object_type: &str,
        source_id: i64,
        resolver: &dyn SeedResolver,
    ) -> StagingResult<Option<i64>> {
        match self.resolve(object_type, source_id, resolver)? {
            Some(id) => Ok(Some(id)),
            None => Ok(self.active_default(object_type)),
        }
    }

    /// Like [`get_target_id`](Self::get_target_id), without the default.
    pub fn resolve(
        &mut self,
        object_type: &str,
        source_id: i64,
        resolver: &dyn SeedResolver,
    ) -> StagingResult<Option<i64>> {
        if let Some(id) = self.recorded(object_type, source_id) {
            return Ok(Some(id));
        }
        let key = (object_type.to_string(), source_id);
        if let Some(seed) = self.seeds.get(&key).cloned() {
            // A seed chain that loops back to itself stays unresolved.
            if self.resolving.insert(key.clone()) {
                let resolved = resolver.resolve(self, &seed);
                self.resolving.remove(&key);
                if let Some(id) = resolved? {
                    self.add_translation(object_type, source_id, id, seed.group_id);
                    return Ok(Some(id));
                }
            }
        }
        Ok(None)
    }

    /// Code name the source used for an object.
    pub fn code_name(&self, object_type: &str, source_id: i64) -> Option<&str> {
        self.seed(object_type, source_id)?.code_name.as_deref()
    }

    /// Seed row for an object.
    pub fn seed(&self, object_type: &str, source_id: i64) -> Option<&TranslationSeed> {
        self.seeds.get(&(object_type.to_string(), source_id))
    }

    /// Pushes a default substitution for a type.
    pub fn set_default(&mut self, object_type: &str, target_id: i64) {
        self.defaults
            .entry(object_type.to_string())
            .or_default()
            .push(target_id);
    }

    /// Pops the most recent default for a type.
    pub fn clear_default(&mut self, object_type: &str) -> Option<i64> {
        let stack = self.defaults.get_mut(object_type)?;
        let value = stack.pop();
        if stack.is_empty() {
            self.defaults.remove(object_type);
        }
        value
    }

    /// The active default for a type.
    pub fn active_default(&self, object_type: &str) -> Option<i64> {
        self.defaults.get(object_type).and_then(|s| s.last().copied())
    }

    /// Number of recorded translations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
