// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pattern store abstraction and its in-memory implementation.

use super::{Pattern, ScrapedItem};
use crate::error::{HarvestError, Result};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Persistence for committed patterns and their latest scrape.
pub trait PatternStore: Send + Sync {
    /// Commit a new pattern. Fails with `PatternExists` when the name is taken.
    fn insert(&self, pattern: &Pattern) -> Result<()>;
    fn get(&self, name: &str) -> Result<Option<Pattern>>;
    /// All patterns, ordered by name.
    fn list(&self) -> Result<Vec<Pattern>>;
    /// Remove a pattern and its items. Returns whether it existed.
    fn delete(&self, name: &str) -> Result<bool>;
    /// Replace the stored items of a pattern.
    fn save_items(&self, name: &str, items: &[ScrapedItem]) -> Result<()>;
    fn items(&self, name: &str) -> Result<Vec<ScrapedItem>>;
}

/// Process-local store, used by tests and one-shot CLI runs.
#[derive(Debug, Default)]
pub struct MemoryPatternStore {
    inner: Mutex<BTreeMap<String, (Pattern, Vec<ScrapedItem>)>>,
}

impl MemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, (Pattern, Vec<ScrapedItem>)>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PatternStore for MemoryPatternStore {
    fn insert(&self, pattern: &Pattern) -> Result<()> {
        let mut map = self.lock();
        if map.contains_key(&pattern.name) {
            return Err(HarvestError::PatternExists(pattern.name.clone()));
        }
        map.insert(pattern.name.clone(), (pattern.clone(), Vec::new()));
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Pattern>> {
        Ok(self.lock().get(name).map(|(p, _)| p.clone()))
    }

    fn list(&self) -> Result<Vec<Pattern>> {
        Ok(self.lock().values().map(|(p, _)| p.clone()).collect())
    }

    fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.lock().remove(name).is_some())
    }

    fn save_items(&self, name: &str, items: &[ScrapedItem]) -> Result<()> {
        match self.lock().get_mut(name) {
            Some((_, stored)) => {
                *stored = items.to_vec();
                Ok(())
            }
            None => Err(HarvestError::PatternNotFound(name.to_string())),
        }
    }

    fn items(&self, name: &str) -> Result<Vec<ScrapedItem>> {
        match self.lock().get(name) {
            Some((_, items)) => Ok(items.clone()),
            None => Err(HarvestError::PatternNotFound(name.to_string())),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;

    pub(crate) fn pattern(name: &str) -> Pattern {
        Pattern {
            name: name.into(),
            fingerprint: Fingerprint {
                tag: "div".into(),
                classes: vec!["row".into()],
                child_schema: vec!["span".into()],
                attributes: Vec::new(),
            },
            fields: Vec::new(),
            organ_id: "whatsapp".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    /// Behaviour every store must share.
    pub(crate) fn exercise_store(store: &dyn PatternStore) {
        store.insert(&pattern("b")).unwrap();
        store.insert(&pattern("a")).unwrap();

        let err = store.insert(&pattern("a")).unwrap_err();
        assert!(matches!(err, HarvestError::PatternExists(_)));

        let names: Vec<String> = store.list().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(store.get("a").unwrap(), Some(pattern("a")));
        assert_eq!(store.get("zzz").unwrap(), None);

        let items = vec![ScrapedItem {
            text: "hello".into(),
            fields: [("title".to_string(), "hello".to_string())].into_iter().collect(),
        }];
        store.save_items("a", &items).unwrap();
        assert_eq!(store.items("a").unwrap(), items);
        assert!(store.items("b").unwrap().is_empty());
        assert!(store.save_items("zzz", &items).is_err());

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert!(store.items("a").is_err());

        // Delete-and-recreate is the only way to change a pattern.
        store.insert(&pattern("a")).unwrap();
        assert!(store.items("a").unwrap().is_empty());
    }

    #[test]
    fn test_memory_store() {
        exercise_store(&MemoryPatternStore::new());
    }
}
