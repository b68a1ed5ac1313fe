//! Listing, counting and title lookup across all features of a project.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use futures::future::join_all;

use super::{identifier, layout, FeatureLocation, FeatureStore};
use crate::error::Result;
use crate::fs;
use crate::models::*;

impl FeatureStore {
    /// Every readable feature in the project, oldest first.
    pub async fn get_all(&self, project: &Path) -> Result<Vec<Feature>> {
        self.get_all_filtered(project, &StatusFilter::default())
            .await
    }

    /// Like [`get_all`](Self::get_all), restricted to matching status partitions.
    ///
    /// Unreadable features are logged and left out; the call only fails when the
    /// project path itself is rejected.
    pub async fn get_all_filtered(
        &self,
        project: &Path,
        filter: &StatusFilter,
    ) -> Result<Vec<Feature>> {
        let root = self.project_root(project)?;
        self.ensure_migrated(&root).await;

        let locations = match self.feature_locations(&root, filter).await {
            Ok(locations) => locations,
            Err(e) => {
                tracing::warn!("Failed to enumerate features in {}: {}", root.display(), e);
                return Ok(Vec::new());
            }
        };

        let mut features: Vec<Feature> = join_all(locations.iter().map(|l| self.load_location(l)))
            .await
            .into_iter()
            .flatten()
            .collect();
        identifier::sort_features(&mut features);
        Ok(features)
    }

    pub async fn get_all_summaries(&self, project: &Path) -> Result<Vec<FeatureSummary>> {
        Ok(self
            .get_all(project)
            .await?
            .into_iter()
            .map(FeatureSummary::from)
            .collect())
    }

    /// Number of features per status.
    pub async fn status_counts(&self, project: &Path) -> Result<BTreeMap<String, usize>> {
        let mut counts = BTreeMap::new();
        for feature in self.get_all(project).await? {
            *counts.entry(feature.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Feature whose title matches `title`, ignoring case and surrounding whitespace.
    pub async fn find_by_title(&self, project: &Path, title: &str) -> Result<Option<Feature>> {
        self.find_duplicate_title(project, title, None).await
    }

    /// Another feature already using `title`, ignoring `exclude_id` (the feature being edited).
    pub async fn find_duplicate_title(
        &self,
        project: &Path,
        title: &str,
        exclude_id: Option<&str>,
    ) -> Result<Option<Feature>> {
        let needle = normalize_title(title);
        if needle.is_empty() {
            return Ok(None);
        }
        let features = self
            .get_all(project)
            .await?
            .into_iter()
            .filter(|f| Some(f.id.as_str()) != exclude_id);
        let mut index = title_index(features);
        Ok(index.remove(&needle))
    }

    /// Read one feature directory the way listings do.
    ///
    /// Returns `None` (silently) for orphaned directories and (with a warning) for
    /// records that cannot be recovered or carry no identifier.
    pub(crate) async fn load_location(&self, location: &FeatureLocation) -> Option<Feature> {
        let file = layout::feature_file(&location.dir);

        match fs::has_record_artifacts(&self.fs, &file).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Skipping orphaned directory {}", location.dir.display());
                return None;
            }
            Err(e) => {
                tracing::warn!("Failed to inspect {}: {}", location.dir.display(), e);
                return None;
            }
        }

        let read = fs::read_json_with_recovery(&self.fs, &file).await;
        let Some(value) = read.value else {
            tracing::warn!(
                "Unreadable feature record {}: {}",
                file.display(),
                read.error.as_deref().unwrap_or("no usable copy")
            );
            return None;
        };

        let has_id = value
            .get("id")
            .and_then(|id| id.as_str())
            .is_some_and(|id| !id.trim().is_empty());
        if !has_id {
            tracing::warn!("Feature record {} has no id, skipping", file.display());
            return None;
        }

        let mut feature: Feature = match serde_json::from_value(value) {
            Ok(feature) => feature,
            Err(e) => {
                tracing::warn!("Malformed feature record {}: {}", file.display(), e);
                return None;
            }
        };
        if let Some(status) = &location.status {
            feature.status = status.clone();
        }
        Some(feature)
    }
}

fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Normalized title to feature, built in one pass; the first feature seen wins.
pub fn title_index(features: impl IntoIterator<Item = Feature>) -> HashMap<String, Feature> {
    let mut index = HashMap::new();
    for feature in features {
        let key = normalize_title(&feature.title);
        if !key.is_empty() {
            index.entry(key).or_insert(feature);
        }
    }
    index
}
