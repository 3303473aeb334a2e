//! Directory of the groups a node serves

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::RwLock;
use tracing::info;

use crate::error::{Error, Result};
use crate::group::{Group, GroupBuilder};
use crate::peers::Loader;

/// Groups by name.
///
/// Passed explicitly to whatever serves peer requests, so independent
/// registries can coexist in one process.
#[derive(Default)]
pub struct Registry {
    groups: RwLock<HashMap<String, Arc<Group>, RandomState>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register a group with default options
    pub fn new_group(
        &self,
        name: impl Into<String>,
        cache_bytes: i64,
        loader: impl Loader + 'static,
    ) -> Result<Arc<Group>> {
        self.insert(GroupBuilder::new(name).cache_bytes(cache_bytes).loader(loader).build())
    }

    /// Register an already built group
    pub fn insert(&self, group: Group) -> Result<Arc<Group>> {
        let mut groups = self.groups.write();
        match groups.entry(group.name().to_string()) {
            Entry::Occupied(entry) => Err(Error::GroupExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                info!(group = %group.name(), "registered group");
                Ok(Arc::clone(entry.insert(Arc::new(group))))
            }
        }
    }

    /// Group registered under `name`
    pub fn get(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).cloned()
    }

    /// Like [`get`](Self::get), but a missing group is an error
    pub fn lookup(&self, name: &str) -> Result<Arc<Group>> {
        self.get(name)
            .ok_or_else(|| Error::GroupNotFound(name.to_string()))
    }

    /// Registered group names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(key: &str) -> anyhow::Result<Vec<u8>> {
        Ok(key.as_bytes().to_vec())
    }

    #[test]
    fn test_create_and_get() {
        let registry = Registry::new();
        let created = registry.new_group("scores", 1024, echo).unwrap();
        let found = registry.get("scores").unwrap();

        assert!(Arc::ptr_eq(&created, &found));
        assert!(registry.get("missing").is_none());
        assert!(matches!(
            registry.lookup("missing"),
            Err(Error::GroupNotFound(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = Registry::new();
        registry.new_group("scores", 0, echo).unwrap();

        let err = registry.new_group("scores", 0, echo).unwrap_err();
        assert!(matches!(err, Error::GroupExists(name) if name == "scores"));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = Registry::new();
        let b = Registry::new();
        a.new_group("scores", 0, echo).unwrap();
        b.new_group("users", 0, echo).unwrap();

        assert_eq!(a.names(), ["scores"]);
        assert_eq!(b.names(), ["users"]);
    }
}
