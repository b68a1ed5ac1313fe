//! The feature store: discovery, migration, persistence and artifacts for feature records.
//!
//! A single [`FeatureStore`] is meant to be constructed once per process and shared
//! (it is cheap to clone). It owns the path cache and the per-project migration markers.

mod artifacts;
mod cache;
pub mod identifier;
pub mod layout;
mod migration;
mod query;
mod resolver;
mod transition;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use dashmap::DashMap;
use serde_json::Map;
use tokio::sync::OnceCell;

pub use cache::PathCache;
pub use migration::MigrationReport;
pub use resolver::FeatureLocation;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::fs::{self, SecureFs};
use crate::models::*;
use layout::Layout;

/// Attempts at finding a free identifier before giving up on the slug.
const MAX_ID_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct FeatureStore {
    fs: SecureFs,
    layout: Layout,
    backup_count: usize,
    paths: PathCache,
    migrations: Arc<DashMap<PathBuf, Arc<OnceCell<MigrationReport>>>>,
}

impl FeatureStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            fs: SecureFs::new(config.allowed_roots),
            layout: Layout::new(config.extra_status_dirs),
            backup_count: config.backup_count,
            paths: PathCache::new(),
            migrations: Arc::new(DashMap::new()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(StoreConfig::from_env())
    }

    pub fn path_cache(&self) -> &PathCache {
        &self.paths
    }

    /// Absolute, normalized project root, checked against the sandbox.
    fn project_root(&self, project: &Path) -> Result<PathBuf> {
        let absolute = if project.is_absolute() {
            project.to_path_buf()
        } else {
            std::path::absolute(project).map_err(|e| StoreError::io(project, e))?
        };
        self.fs.check(&absolute)
    }

    /// Directory currently holding `id`, if it exists.
    pub async fn feature_dir(&self, project: &Path, id: &str) -> Result<Option<PathBuf>> {
        let root = self.project_root(project)?;
        self.resolve_feature_dir(&root, id).await
    }

    // ============================================================
    // Feature operations
    // ============================================================

    /// Load a feature, falling back to backups if its record is damaged.
    pub async fn get(&self, project: &Path, id: &str) -> Result<Option<Feature>> {
        let root = self.project_root(project)?;
        let Some(dir) = self.resolve_feature_dir(&root, id).await? else {
            return Ok(None);
        };
        let location = FeatureLocation {
            id: id.to_string(),
            status: self.layout.status_of_dir(&root, &dir),
            dir,
        };
        Ok(self.load_location(&location).await)
    }

    /// Create a feature in the partition of its initial status.
    pub async fn create(&self, project: &Path, input: CreateFeatureInput) -> Result<Feature> {
        let root = self.project_root(project)?;

        let status = input
            .status
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_STATUS)
            .to_string();
        validate_segment("status", &status)?;

        let id = match input.id.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(id) => {
                validate_segment("feature id", id)?;
                if self.resolve_feature_dir(&root, id).await?.is_some() {
                    return Err(StoreError::AlreadyExists(id.to_string()));
                }
                id.to_string()
            }
            None => self.unused_feature_id(&root, &input.description).await?,
        };

        let dir = layout::feature_dir(&root, &status, &id);
        let written = self
            .populate_feature_dir(&root, &dir, id.clone(), status, input)
            .await;
        let feature = self.discard_on_error(&dir, written).await?;
        self.paths.insert(&root, &id, dir);

        tracing::info!("Created feature {} ({})", id, feature.status);
        Ok(feature)
    }

    /// Merge `input` into an existing feature.
    ///
    /// The record is written in place first; if the status partition changes the
    /// directory is moved afterwards. A failed move is logged, not returned.
    pub async fn update(
        &self,
        project: &Path,
        id: &str,
        input: UpdateFeatureInput,
    ) -> Result<Feature> {
        let root = self.project_root(project)?;
        let dir = self
            .resolve_feature_dir(&root, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let location = FeatureLocation {
            id: id.to_string(),
            status: self.layout.status_of_dir(&root, &dir),
            dir: dir.clone(),
        };
        let mut feature = self
            .load_location(&location)
            .await
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Some(status) = &input.status {
            validate_segment("status", status)?;
        }

        if let Some(images) = input.image_paths {
            let imported = self.import_images(&root, &dir, images).await?;
            self.delete_orphaned_images(&dir, &feature.image_paths, &imported)
                .await;
            feature.image_paths = imported;
        }

        if let Some(description) = input.description {
            if description != feature.description {
                feature.description_history.push(DescriptionHistoryEntry {
                    description: description.clone(),
                    timestamp: now_iso(),
                    source: input.description_history_source.unwrap_or_default(),
                    enhancement_mode: input.enhancement_mode,
                });
                feature.description = description;
            }
        }

        if let Some(title) = input.title {
            feature.title = title;
        }
        if let Some(category) = input.category {
            feature.category = category;
        }
        if let Some(status) = input.status {
            feature.status = status;
        }
        if input.priority.is_some() {
            feature.priority = input.priority;
        }
        if let Some(is_favorite) = input.is_favorite {
            feature.is_favorite = is_favorite;
        }
        if input.model.is_some() {
            feature.model = input.model;
        }
        if input.thinking_level.is_some() {
            feature.thinking_level = input.thinking_level;
        }
        if input.branch_name.is_some() {
            feature.branch_name = input.branch_name;
        }
        if input.error.is_some() {
            feature.error = input.error;
        }
        if input.started_at.is_some() {
            feature.started_at = input.started_at;
        }

        fs::write_json_atomic(
            &self.fs,
            &layout::feature_file(&dir),
            &feature,
            self.backup_count,
        )
        .await?;

        let moved_to = self.move_to_status(&root, id, &dir, &feature.status).await;
        if moved_to != dir && rebase_images(&mut feature.image_paths, &dir, &moved_to) {
            fs::write_json_atomic(
                &self.fs,
                &layout::feature_file(&moved_to),
                &feature,
                self.backup_count,
            )
            .await?;
        }
        Ok(feature)
    }

    /// Remove a feature directory and everything in it.
    ///
    /// Returns `false` if the feature does not exist or could not be removed.
    pub async fn delete(&self, project: &Path, id: &str) -> bool {
        let root = match self.project_root(project) {
            Ok(root) => root,
            Err(e) => {
                tracing::warn!("Refusing to delete {}: {}", id, e);
                return false;
            }
        };
        let dir = match self.resolve_feature_dir(&root, id).await {
            Ok(Some(dir)) => dir,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!("Failed to resolve feature {} for deletion: {}", id, e);
                return false;
            }
        };

        match self.fs.remove_dir_all(&dir).await {
            Ok(()) => {
                self.paths.invalidate(&root, id);
                tracing::info!("Deleted feature {}", id);
                true
            }
            Err(e) => {
                tracing::error!("Failed to delete feature {}: {}", id, e);
                false
            }
        }
    }

    /// Lay out a new feature directory and write its first record.
    async fn populate_feature_dir(
        &self,
        root: &Path,
        dir: &Path,
        id: String,
        status: String,
        input: CreateFeatureInput,
    ) -> Result<Feature> {
        self.fs.create_dir_all(dir).await?;
        for sub in layout::FEATURE_SUBDIRS {
            self.fs.create_dir_all(&dir.join(sub)).await?;
        }

        let image_paths = self.import_images(root, dir, input.image_paths).await?;

        let feature = Feature {
            id,
            title: input.title,
            description: input.description,
            category: input.category,
            status,
            priority: input.priority,
            is_favorite: input.is_favorite,
            model: input.model,
            thinking_level: input.thinking_level,
            branch_name: input.branch_name,
            error: None,
            started_at: None,
            image_paths,
            description_history: input.description_history,
            extra: Map::new(),
        };

        fs::write_json_atomic(
            &self.fs,
            &layout::feature_file(dir),
            &feature,
            self.backup_count,
        )
        .await?;
        Ok(feature)
    }

    /// Remove a half-created feature directory when `result` is an error.
    async fn discard_on_error<T>(&self, dir: &Path, result: Result<T>) -> Result<T> {
        if result.is_err() {
            if let Err(cleanup) = self.fs.remove_dir_all(dir).await {
                tracing::warn!("Failed to clean up {}: {}", dir.display(), cleanup);
            }
        }
        result
    }

    /// Generate an identifier from `description` that is not yet used in the project.
    async fn unused_feature_id(&self, root: &Path, description: &str) -> Result<String> {
        let base = identifier::generate_feature_id(description);
        if self.resolve_feature_dir(root, &base).await?.is_none() {
            return Ok(base);
        }
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = format!("{}_{}", base, identifier::random_suffix(4));
            if self.resolve_feature_dir(root, &candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Ok(format!("{}_{}", base, identifier::random_suffix(12)))
    }
}

fn validate_segment(what: &str, value: &str) -> Result<()> {
    if layout::is_valid_segment(value) {
        Ok(())
    } else {
        Err(StoreError::InvalidInput(format!(
            "invalid {}: {:?}",
            what, value
        )))
    }
}

/// Point managed image references at the feature's new directory.
///
/// Returns whether anything changed.
fn rebase_images(images: &mut [FeatureImage], from: &Path, to: &Path) -> bool {
    let mut changed = false;
    for image in images.iter_mut() {
        if let Ok(rest) = Path::new(image.path()).strip_prefix(from) {
            *image = image.with_path(to.join(rest).to_string_lossy().into_owned());
            changed = true;
        }
    }
    changed
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
