//! One-shot conversion of legacy month and flat layouts into status partitions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::OnceCell;

use super::layout::{self, EntryKind};
use super::{FeatureLocation, FeatureStore};
use crate::error::Result;
use crate::fs;
use crate::models::DEFAULT_STATUS;

/// What a migration run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// Features moved into a status partition.
    pub migrated: Vec<String>,
    /// Legacy entries already at their target path.
    pub skipped: usize,
    /// Features whose move failed; they stay where they were.
    pub failed: Vec<String>,
    /// Empty month directories removed afterwards.
    pub removed_month_dirs: Vec<String>,
}

impl FeatureStore {
    /// Migrate `project` to the status-partitioned layout.
    ///
    /// Runs at most once per project for the lifetime of this store; later calls (and
    /// concurrent ones) wait for and return the first run's report.
    pub async fn migrate(&self, project: &Path) -> Result<MigrationReport> {
        let root = self.project_root(project)?;
        Ok(self.ensure_migrated(&root).await)
    }

    pub(crate) async fn ensure_migrated(&self, root: &Path) -> MigrationReport {
        let cell: Arc<OnceCell<MigrationReport>> = self
            .migrations
            .entry(root.to_path_buf())
            .or_default()
            .clone();
        cell.get_or_init(|| self.run_migration(root)).await.clone()
    }

    async fn run_migration(&self, root: &Path) -> MigrationReport {
        let mut report = MigrationReport::default();
        let features = layout::features_dir(root);

        match self.fs.is_dir(&features).await {
            Ok(true) => {}
            Ok(false) => return report,
            Err(e) => {
                tracing::warn!("Skipping migration of {}: {}", root.display(), e);
                return report;
            }
        }

        let (legacy, month_dirs) = match self.legacy_entries(&features).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Skipping migration of {}: {}", root.display(), e);
                return report;
            }
        };
        if legacy.is_empty() {
            return report;
        }

        tracing::info!(
            "Migrating {} legacy feature(s) in {}",
            legacy.len(),
            root.display()
        );

        for entry in legacy {
            let status = self.stored_status(&entry.dir).await;
            let target = layout::feature_dir(root, &status, &entry.id);
            if target == entry.dir {
                report.skipped += 1;
                continue;
            }

            match self.relocate(&entry.dir, &target).await {
                Ok(()) => {
                    self.paths.insert(root, &entry.id, target);
                    report.migrated.push(entry.id);
                }
                Err(e) => {
                    tracing::warn!("Failed to migrate feature {}: {}", entry.id, e);
                    report.failed.push(entry.id);
                }
            }
        }

        for month_dir in month_dirs {
            let empty = matches!(self.fs.read_dir(&month_dir).await, Ok(entries) if entries.is_empty());
            if empty && self.fs.remove_dir(&month_dir).await.is_ok() {
                if let Some(name) = month_dir.file_name() {
                    report
                        .removed_month_dirs
                        .push(name.to_string_lossy().into_owned());
                }
            }
        }

        tracing::info!(
            "Migration of {} finished: {} moved, {} failed",
            root.display(),
            report.migrated.len(),
            report.failed.len()
        );
        report
    }

    /// Legacy feature directories plus the month directories they were found in.
    ///
    /// Flat entries only count when they hold a record or its backups, so unrelated
    /// top-level directories are never swept into a partition.
    async fn legacy_entries(
        &self,
        features: &Path,
    ) -> Result<(Vec<FeatureLocation>, Vec<PathBuf>)> {
        let top = self.fs.read_dir(features).await?;

        let mut month_dirs = Vec::new();
        let mut flat = Vec::new();
        for entry in top.into_iter().filter(|e| e.is_dir) {
            match self.layout.classify(&entry.name) {
                EntryKind::Status => {}
                EntryKind::Month => month_dirs.push(features.join(&entry.name)),
                EntryKind::Flat => flat.push(FeatureLocation {
                    dir: features.join(&entry.name),
                    id: entry.name,
                    status: None,
                }),
            }
        }

        let month_children = join_all(
            month_dirs
                .iter()
                .map(|dir| self.child_features(dir, None)),
        )
        .await;

        let flat_files: Vec<PathBuf> = flat
            .iter()
            .map(|location| layout::feature_file(&location.dir))
            .collect();
        let flat_checks = join_all(
            flat_files
                .iter()
                .map(|file| fs::has_record_artifacts(&self.fs, file)),
        )
        .await;

        let mut legacy: Vec<FeatureLocation> = month_children.into_iter().flatten().collect();
        for (location, has_record) in flat.into_iter().zip(flat_checks) {
            match has_record {
                Ok(true) => legacy.push(location),
                Ok(false) => tracing::debug!(
                    "Leaving non-feature directory {} in place",
                    location.dir.display()
                ),
                Err(e) => tracing::warn!("Failed to inspect {}: {}", location.dir.display(), e),
            }
        }

        Ok((legacy, month_dirs))
    }

    /// Status stored in a legacy record, or the default when it cannot be read.
    async fn stored_status(&self, dir: &Path) -> String {
        let read = fs::read_json_with_recovery(&self.fs, &layout::feature_file(dir)).await;
        read.value
            .as_ref()
            .and_then(|v| v.get("status"))
            .and_then(|s| s.as_str())
            .filter(|s| layout::is_valid_segment(s))
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_STATUS.to_string())
    }
}
