//! Enumeration of feature directories across the three layouts, and single-feature
//! path resolution backed by the [`PathCache`](super::PathCache).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures::future::join_all;

use super::layout::{self, EntryKind};
use super::FeatureStore;
use crate::error::Result;
use crate::fs::{self, SecureFs};
use crate::models::StatusFilter;

/// A feature directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLocation {
    /// Identifier taken from the directory name.
    pub id: String,
    pub dir: PathBuf,
    /// Status implied by the parent directory; `None` for legacy entries.
    pub status: Option<String>,
}

impl FeatureStore {
    /// Enumerate every feature directory under `root`, deduplicated by identifier.
    ///
    /// Status and month directories are read concurrently. When an identifier shows up
    /// twice, a copy holding a record beats one without, then a copy in a status
    /// partition beats a legacy copy. A losing legacy directory is removed in the
    /// background only when the winner is a partitioned copy with a record; every other
    /// conflict keeps both directories.
    pub async fn feature_locations(
        &self,
        root: &Path,
        filter: &StatusFilter,
    ) -> Result<Vec<FeatureLocation>> {
        let features = layout::features_dir(root);
        let top = self.fs.read_dir_or_empty(&features).await?;

        let groups = join_all(
            top.into_iter()
                .filter(|entry| entry.is_dir)
                .map(|entry| self.expand_top_level(&features, entry.name, filter)),
        )
        .await;

        let mut found: Vec<FeatureLocation> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for location in groups.into_iter().flatten() {
            let Some(&existing) = index.get(&location.id) else {
                index.insert(location.id.clone(), found.len());
                found.push(location);
                continue;
            };

            let kept_record = self.holds_record(&found[existing].dir).await;
            let new_record = self.holds_record(&location.dir).await;
            let kept_rank = (record_rank(kept_record), found[existing].status.is_some());
            let new_rank = (record_rank(new_record), location.status.is_some());

            let (winner_record, loser) = if new_rank > kept_rank {
                (new_record, std::mem::replace(&mut found[existing], location))
            } else {
                (kept_record, location)
            };

            let winner = &found[existing];
            if winner_record == Some(true) && winner.status.is_some() && loser.status.is_none() {
                self.remove_stale_copy(loser.dir);
            } else {
                tracing::warn!(
                    "Feature {} kept at {}, duplicate left at {}",
                    winner.id,
                    winner.dir.display(),
                    loser.dir.display()
                );
            }
        }

        for location in &found {
            self.paths.insert(root, &location.id, location.dir.clone());
        }
        Ok(found)
    }

    async fn expand_top_level(
        &self,
        features: &Path,
        name: String,
        filter: &StatusFilter,
    ) -> Vec<FeatureLocation> {
        let dir = features.join(&name);
        match self.layout.classify(&name) {
            EntryKind::Status => {
                if !filter.allows(&name) {
                    return Vec::new();
                }
                self.child_features(&dir, Some(&name)).await
            }
            EntryKind::Month => self.child_features(&dir, None).await,
            EntryKind::Flat => {
                match fs::has_record_artifacts(&self.fs, &layout::feature_file(&dir)).await {
                    Ok(true) => vec![FeatureLocation {
                        id: name,
                        dir,
                        status: None,
                    }],
                    Ok(false) if filter.allows(&name) => self
                        .child_features(&dir, Some(&name))
                        .await
                        .into_iter()
                        .filter(|child| !layout::FEATURE_SUBDIRS.contains(&child.id.as_str()))
                        .collect(),
                    Ok(false) => Vec::new(),
                    Err(e) => {
                        tracing::warn!("Failed to inspect {}: {}", dir.display(), e);
                        Vec::new()
                    }
                }
            }
        }
    }

    pub(crate) async fn child_features(
        &self,
        dir: &Path,
        status: Option<&str>,
    ) -> Vec<FeatureLocation> {
        match self.fs.read_dir(dir).await {
            Ok(entries) => entries
                .into_iter()
                .filter(|e| e.is_dir)
                .map(|e| FeatureLocation {
                    dir: dir.join(&e.name),
                    id: e.name,
                    status: status.map(str::to_string),
                })
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", dir.display(), e);
                Vec::new()
            }
        }
    }

    /// Whether `dir` holds a record or recovery artifacts; `None` if that is unknown.
    async fn holds_record(&self, dir: &Path) -> Option<bool> {
        match fs::has_record_artifacts(&self.fs, &layout::feature_file(dir)).await {
            Ok(found) => Some(found),
            Err(e) => {
                tracing::warn!("Failed to inspect {}: {}", dir.display(), e);
                None
            }
        }
    }

    /// Delete a duplicate directory without blocking or failing the caller.
    fn remove_stale_copy(&self, dir: PathBuf) {
        tracing::info!("Removing stale duplicate feature directory {}", dir.display());
        let sandbox: SecureFs = self.fs.clone();
        tokio::spawn(async move {
            if let Err(e) = sandbox.remove_dir_all(&dir).await {
                tracing::warn!("Failed to remove stale directory {}: {}", dir.display(), e);
            }
        });
    }

    /// Find the directory currently holding `id`.
    ///
    /// Tries, in order: a cached path that still exists, status partitions, other
    /// unrecognised top-level directories, then the legacy month and flat locations.
    /// A candidate holding a record wins over an earlier empty directory.
    pub(crate) async fn resolve_feature_dir(
        &self,
        root: &Path,
        id: &str,
    ) -> Result<Option<PathBuf>> {
        if !layout::is_valid_segment(id) {
            tracing::debug!("Ignoring lookup of invalid feature id {:?}", id);
            return Ok(None);
        }

        if let Some(cached) = self.paths.get(root, id) {
            if self.fs.is_dir(&cached).await? {
                return Ok(Some(cached));
            }
            self.paths.invalidate(root, id);
        }

        let features = layout::features_dir(root);
        let top = self.fs.read_dir_or_empty(&features).await?;
        let (status_dirs, other_dirs): (Vec<_>, Vec<_>) = top
            .into_iter()
            .filter(|e| e.is_dir && self.layout.classify(&e.name) != EntryKind::Month)
            .partition(|e| self.layout.classify(&e.name) == EntryKind::Status);

        let mut candidates: Vec<PathBuf> = status_dirs
            .iter()
            .chain(other_dirs.iter())
            .map(|entry| features.join(&entry.name).join(id))
            .collect();
        candidates.extend(layout::legacy_dirs(root, id));

        let mut first_existing = None;
        for candidate in candidates {
            if !self.fs.is_dir(&candidate).await? {
                continue;
            }
            if self.holds_record(&candidate).await != Some(false) {
                self.paths.insert(root, id, candidate.clone());
                return Ok(Some(candidate));
            }
            first_existing.get_or_insert(candidate);
        }

        if let Some(dir) = &first_existing {
            self.paths.insert(root, id, dir.clone());
        }
        Ok(first_existing)
    }
}

/// Orders record states for duplicate resolution: present, unknown, absent.
fn record_rank(record: Option<bool>) -> u8 {
    match record {
        Some(true) => 2,
        None => 1,
        Some(false) => 0,
    }
}
