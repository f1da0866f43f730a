//! Module arena with a dependents index.
//!
//! Entries are keyed by module identifier and hold the compiled unit plus
//! the fingerprint of the source it was compiled from. The dependents index
//! answers "who requires this module" for invalidation.

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One compiled module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    /// Identifier: path relative to the source root, `/`-separated.
    pub id: String,
    /// SHA-256 of the source the entry was compiled from.
    pub fingerprint: String,
    /// Original source, kept for source-map contents.
    pub source: Vec<u8>,
    /// Output of the script compiler.
    pub compiled: Vec<u8>,
    /// Import specifier → resolved module identifier.
    pub requires: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: BTreeMap<String, ModuleEntry>,
    /// Module → modules that require it.
    dependents: HashMap<String, BTreeSet<String>>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&ModuleEntry> {
        self.modules.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    /// Whether some cached entry requires `id`, cached or not.
    pub fn is_required(&self, id: &str) -> bool {
        self.dependents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Entries in identifier order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleEntry> {
        self.modules.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(|k| k.as_str())
    }

    /// Direct dependents of `id`.
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.dependents
            .get(id)
            .map(|set| set.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// Insert or replace an entry, keeping the dependents index in step.
    pub fn insert(&mut self, entry: ModuleEntry) {
        self.unlink(&entry.id);
        for target in entry.requires.values() {
            self.dependents
                .entry(target.clone())
                .or_default()
                .insert(entry.id.clone());
        }
        self.modules.insert(entry.id.clone(), entry);
    }

    /// Remove an entry and its outgoing edges. Edges pointing at it stay
    /// until their owners are replaced or removed.
    pub fn remove(&mut self, id: &str) -> Option<ModuleEntry> {
        self.unlink(id);
        self.modules.remove(id)
    }

    fn unlink(&mut self, id: &str) {
        if let Some(old) = self.modules.get(id) {
            for target in old.requires.values() {
                if let Some(set) = self.dependents.get_mut(target) {
                    set.remove(id);
                    if set.is_empty() {
                        self.dependents.remove(target);
                    }
                }
            }
        }
    }

    /// `id` plus every module that transitively requires it.
    ///
    /// Dependencies of `id` are never included.
    pub fn affected_by(&self, id: &str) -> BTreeSet<String> {
        let mut affected = BTreeSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if !affected.insert(current.clone()) {
                continue;
            }
            if let Some(parents) = self.dependents.get(&current) {
                stack.extend(parents.iter().filter(|p| !affected.contains(*p)).cloned());
            }
        }
        affected
    }

    /// Drop the cached entries of `id` and its transitive dependents.
    /// Returns the invalidated identifiers.
    pub fn invalidate(&mut self, id: &str) -> BTreeSet<String> {
        let affected = self.affected_by(id);
        for module in &affected {
            self.remove(module);
        }
        affected
    }

    /// Remove every entry not reachable from `entry`. Returns what was pruned.
    pub fn retain_reachable(&mut self, entry: &str) -> Vec<String> {
        let mut reachable = BTreeSet::new();
        let mut stack = vec![entry.to_string()];
        while let Some(current) = stack.pop() {
            if !reachable.insert(current.clone()) {
                continue;
            }
            if let Some(module) = self.modules.get(&current) {
                stack.extend(module.requires.values().cloned());
            }
        }

        let pruned: Vec<String> = self
            .modules
            .keys()
            .filter(|id| !reachable.contains(*id))
            .cloned()
            .collect();
        for id in &pruned {
            self.remove(id);
        }
        pruned
    }
}
