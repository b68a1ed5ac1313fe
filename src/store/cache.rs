use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

/// In-memory map from `(project root, feature id)` to the feature's directory.
///
/// Entries are only removed by explicit invalidation; callers verify a hit still
/// exists on disk before trusting it.
#[derive(Clone, Debug, Default)]
pub struct PathCache {
    entries: Arc<DashMap<(PathBuf, String), PathBuf>>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, root: &Path, id: &str) -> Option<PathBuf> {
        self.entries
            .get(&(root.to_path_buf(), id.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn insert(&self, root: &Path, id: &str, dir: PathBuf) {
        self.entries
            .insert((root.to_path_buf(), id.to_string()), dir);
    }

    pub fn invalidate(&self, root: &Path, id: &str) {
        self.entries.remove(&(root.to_path_buf(), id.to_string()));
    }

    /// Drop every entry belonging to `root`.
    pub fn invalidate_project(&self, root: &Path) {
        self.entries.retain(|(project, _), _| project != root);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_scoped_per_project() {
        let cache = PathCache::new();
        cache.insert(Path::new("/a"), "f1", PathBuf::from("/a/x/f1"));
        cache.insert(Path::new("/b"), "f1", PathBuf::from("/b/y/f1"));

        assert_eq!(
            cache.get(Path::new("/a"), "f1"),
            Some(PathBuf::from("/a/x/f1"))
        );
        assert_eq!(
            cache.get(Path::new("/b"), "f1"),
            Some(PathBuf::from("/b/y/f1"))
        );
        assert_eq!(cache.get(Path::new("/c"), "f1"), None);
    }

    #[test]
    fn invalidation_removes_entries() {
        let cache = PathCache::new();
        cache.insert(Path::new("/a"), "f1", PathBuf::from("/a/x/f1"));
        cache.insert(Path::new("/a"), "f2", PathBuf::from("/a/x/f2"));
        cache.insert(Path::new("/b"), "f3", PathBuf::from("/b/x/f3"));

        cache.invalidate(Path::new("/a"), "f1");
        assert_eq!(cache.get(Path::new("/a"), "f1"), None);
        assert_eq!(cache.len(), 2);

        cache.invalidate_project(Path::new("/a"));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(Path::new("/b"), "f3").is_some());
    }

    #[test]
    fn clones_share_state() {
        let cache = PathCache::new();
        let other = cache.clone();
        other.insert(Path::new("/a"), "f1", PathBuf::from("/a/x/f1"));
        assert!(!cache.is_empty());
    }
}
