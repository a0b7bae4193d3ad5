use crate::resolution::report::ResolutionIssue;
use crate::resolution::tree::TreeNode;
use crate::resolution::url::CanonicalLocation;
use log::trace;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub canonical: CanonicalLocation,
    pub local_path: Option<PathBuf>,
}

/// The flat name to location mapping of one loaded scene. Names are unique, the first occurrence in pre-order wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionIndex {
    entries: BTreeMap<String, IndexEntry>,
}

impl SessionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flattens a settled tree. Failed nodes contribute nothing themselves; only a root that could not be scanned still
    /// has children (the legacy ones). The root itself is only indexed with `include_root`, as a scene is not a
    /// prototype.
    pub fn build(tree: &TreeNode, include_root: bool) -> (Self, Vec<ResolutionIssue>) {
        let mut index = Self::new();
        let conflicts = index.merge_tree(tree, include_root);
        (index, conflicts)
    }

    /// Adds the nodes of `tree` to the index, following the same rules as [`Self::build`]. Entries that are already
    /// present are never replaced.
    pub fn merge_tree(&mut self, tree: &TreeNode, include_root: bool) -> Vec<ResolutionIssue> {
        let mut conflicts = vec![];
        tree.visit_pre_order(&mut |node| {
            if node.has_failed() || (node.is_root() && !include_root) {
                return;
            }

            let entry = IndexEntry {
                canonical: node.canonical().clone(),
                local_path: node.local_path(),
            };

            if let Err(conflict) = self.insert(node.name(), entry) {
                conflicts.push(conflict);
            }
        });
        conflicts
    }

    /// Same name with the same canonical location is deduplicated, a different location is a
    /// [`ResolutionIssue::NameConflict`] and leaves the index untouched.
    pub fn insert(&mut self, name: &str, entry: IndexEntry) -> Result<(), ResolutionIssue> {
        match self.entries.entry(name.to_string()) {
            Entry::Vacant(vacant) => {
                trace!("Indexing {} at {}", name, entry.canonical);
                vacant.insert(entry);
                Ok(())
            }
            Entry::Occupied(occupied) if occupied.get().canonical == entry.canonical => Ok(()),
            Entry::Occupied(occupied) => Err(ResolutionIssue::NameConflict {
                name: name.to_string(),
                existing: occupied.get().canonical.to_locator(),
                attempted: entry.canonical.to_locator(),
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&IndexEntry> {
        self.entries.get(name)
    }

    pub fn path(&self, name: &str) -> Option<&Path> {
        self.entries.get(name)?.local_path.as_deref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
