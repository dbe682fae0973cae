//! Local group-name table

use crate::pivot::GroupMetadata;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Group id to display name
#[derive(Default)]
pub struct GroupNameTable {
    names: RwLock<HashMap<String, String>>,
}

impl GroupNameTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_names(&self) -> RwLockReadGuard<'_, HashMap<String, String>> {
        self.names.read().unwrap_or_else(|poisoned| {
            tracing::warn!("group name table lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_names(&self) -> RwLockWriteGuard<'_, HashMap<String, String>> {
        self.names.write().unwrap_or_else(|poisoned| {
            tracing::warn!("group name table lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn get(&self, group_id: &str) -> Option<String> {
        self.read_names().get(group_id).cloned()
    }

    /// Record a name; blank names are ignored
    pub fn remember(&self, group_id: &str, name: &str) {
        let name = name.trim();
        if group_id.is_empty() || name.is_empty() {
            return;
        }
        self.write_names()
            .insert(group_id.to_string(), name.to_string());
    }

    /// Seed from assignment metadata
    pub fn remember_all(&self, metadata: &[GroupMetadata]) {
        let mut names = self.write_names();
        for entry in metadata {
            let name = entry.name.trim();
            if !entry.id.is_empty() && !name.is_empty() {
                names.insert(entry.id.clone(), name.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.read_names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_names().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remember_and_get() {
        let table = GroupNameTable::new();
        assert!(table.get("g1").is_none());

        table.remember("g1", "Finance");
        assert_eq!(table.get("g1").as_deref(), Some("Finance"));

        table.remember("g1", "Finance EMEA");
        assert_eq!(table.get("g1").as_deref(), Some("Finance EMEA"));
    }

    #[test]
    fn test_blank_names_ignored() {
        let table = GroupNameTable::new();
        table.remember("g1", "   ");
        table.remember("", "Nameless");
        assert!(table.is_empty());
    }

    #[test]
    fn test_remember_all_from_metadata() {
        let table = GroupNameTable::new();
        table.remember_all(&[
            GroupMetadata {
                id: "g1".into(),
                name: "Finance".into(),
            },
            GroupMetadata {
                id: "g2".into(),
                name: "".into(),
            },
        ]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("g1").as_deref(), Some("Finance"));
    }
}
