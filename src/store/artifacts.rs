//! Files that live next to a feature record: images, agent logs and summaries.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};

use super::layout::{self, IMAGES_DIR, LOGS_DIR, SUMMARIES_DIR};
use super::{validate_segment, FeatureStore};
use crate::error::{Result, StoreError};
use crate::models::{FeatureImage, SummaryFile};

const SUMMARY_EXT: &str = "md";
const MODEL_HEADER_PREFIX: &str = "<!-- model: ";
const MODEL_HEADER_SUFFIX: &str = " -->";

impl FeatureStore {
    // ============================================================
    // Images
    // ============================================================

    /// Copy every image not already in the feature's `images/` directory into it.
    ///
    /// References are rewritten to the managed copy and the originals removed on a
    /// best-effort basis. Any copy failure aborts the whole import.
    pub(crate) async fn import_images(
        &self,
        root: &Path,
        feature_dir: &Path,
        images: Vec<FeatureImage>,
    ) -> Result<Vec<FeatureImage>> {
        if images.is_empty() {
            return Ok(images);
        }

        let images_dir = feature_dir.join(IMAGES_DIR);
        self.fs.create_dir_all(&images_dir).await?;

        let mut imported = Vec::with_capacity(images.len());
        for image in images {
            let source = absolute_from(root, image.path());
            if source.starts_with(&images_dir) {
                imported.push(image);
                continue;
            }

            let file_name = source.file_name().ok_or_else(|| {
                StoreError::InvalidInput(format!("image path has no file name: {}", image.path()))
            })?;
            let target = images_dir.join(file_name);

            if let Err(e) = self.fs.copy(&source, &target).await {
                tracing::error!("Failed to copy image {}: {}", source.display(), e);
                return Err(e);
            }
            if let Err(e) = self.fs.remove_file(&source).await {
                tracing::debug!("Could not remove original image {}: {}", source.display(), e);
            }

            imported.push(image.with_path(target.to_string_lossy().into_owned()));
        }
        Ok(imported)
    }

    /// Delete managed images referenced by `old` but no longer by `new`.
    pub(crate) async fn delete_orphaned_images(
        &self,
        feature_dir: &Path,
        old: &[FeatureImage],
        new: &[FeatureImage],
    ) {
        let images_dir = feature_dir.join(IMAGES_DIR);
        let keep: HashSet<&str> = new.iter().map(FeatureImage::path).collect();

        for image in old.iter().filter(|i| !keep.contains(i.path())) {
            let path = PathBuf::from(image.path());
            if !path.starts_with(&images_dir) {
                continue;
            }
            match self.fs.remove_file(&path).await {
                Ok(()) => tracing::debug!("Deleted orphaned image {}", path.display()),
                Err(e) => tracing::warn!("Failed to delete image {}: {}", path.display(), e),
            }
        }
    }

    // ============================================================
    // Agent logs
    // ============================================================

    async fn logs_file(&self, project: &Path, id: &str, name: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .feature_dir(project, id)
            .await?
            .map(|dir| dir.join(LOGS_DIR).join(name)))
    }

    async fn require_logs_file(&self, project: &Path, id: &str, name: &str) -> Result<PathBuf> {
        let path = self
            .logs_file(project, id, name)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if let Some(parent) = path.parent() {
            self.fs.create_dir_all(parent).await?;
        }
        Ok(path)
    }

    pub async fn get_agent_output(&self, project: &Path, id: &str) -> Result<Option<String>> {
        match self.logs_file(project, id, layout::AGENT_OUTPUT_FILE).await? {
            Some(path) => self.fs.read_optional(&path).await,
            None => Ok(None),
        }
    }

    pub async fn save_agent_output(&self, project: &Path, id: &str, content: &str) -> Result<()> {
        let path = self
            .require_logs_file(project, id, layout::AGENT_OUTPUT_FILE)
            .await?;
        self.fs.write(&path, content.as_bytes()).await
    }

    /// Returns `false` when there was nothing to delete.
    pub async fn delete_agent_output(&self, project: &Path, id: &str) -> Result<bool> {
        self.delete_log(project, id, layout::AGENT_OUTPUT_FILE).await
    }

    pub async fn get_raw_output(&self, project: &Path, id: &str) -> Result<Option<String>> {
        match self.logs_file(project, id, layout::RAW_OUTPUT_FILE).await? {
            Some(path) => self.fs.read_optional(&path).await,
            None => Ok(None),
        }
    }

    /// Append one JSON line to the raw output stream.
    pub async fn append_raw_output(&self, project: &Path, id: &str, line: &str) -> Result<()> {
        let path = self
            .require_logs_file(project, id, layout::RAW_OUTPUT_FILE)
            .await?;
        let mut entry = line.trim_end_matches('\n').to_string();
        entry.push('\n');
        self.fs.append(&path, entry.as_bytes()).await
    }

    pub async fn delete_raw_output(&self, project: &Path, id: &str) -> Result<bool> {
        self.delete_log(project, id, layout::RAW_OUTPUT_FILE).await
    }

    async fn delete_log(&self, project: &Path, id: &str, name: &str) -> Result<bool> {
        let Some(path) = self.logs_file(project, id, name).await? else {
            return Ok(false);
        };
        match self.fs.remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    // ============================================================
    // Summaries
    // ============================================================

    /// Store a summary stamped with the current time. Returns the file's timestamp key.
    pub async fn save_summary(
        &self,
        project: &Path,
        id: &str,
        summary: &str,
        model: Option<&str>,
    ) -> Result<String> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.save_summary_at(project, id, &timestamp, summary, model)
            .await
    }

    /// Store a summary under an explicit timestamp, replacing any summary with the same key.
    pub async fn save_summary_at(
        &self,
        project: &Path,
        id: &str,
        timestamp: &str,
        summary: &str,
        model: Option<&str>,
    ) -> Result<String> {
        let key = summary_key(timestamp);
        validate_segment("summary timestamp", &key)?;

        let dir = self
            .feature_dir(project, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?
            .join(SUMMARIES_DIR);
        self.fs.create_dir_all(&dir).await?;

        let content = match model.map(str::trim).filter(|m| !m.is_empty()) {
            Some(model) => format!(
                "{MODEL_HEADER_PREFIX}{}{MODEL_HEADER_SUFFIX}\n\n{summary}",
                model.replace('\n', " ")
            ),
            None => summary.to_string(),
        };
        self.fs
            .write(&dir.join(format!("{key}.{SUMMARY_EXT}")), content.as_bytes())
            .await?;
        Ok(key)
    }

    /// All summaries for a feature, newest first.
    pub async fn list_summaries(&self, project: &Path, id: &str) -> Result<Vec<SummaryFile>> {
        let Some(dir) = self.feature_dir(project, id).await? else {
            return Ok(Vec::new());
        };
        let dir = dir.join(SUMMARIES_DIR);

        let mut keys: Vec<String> = self
            .fs
            .read_dir_or_empty(&dir)
            .await?
            .into_iter()
            .filter(|e| !e.is_dir)
            .filter_map(|e| {
                e.name
                    .strip_suffix(&format!(".{SUMMARY_EXT}"))
                    .map(str::to_string)
            })
            .collect();
        keys.sort_by(|a, b| b.cmp(a));

        let mut summaries = Vec::with_capacity(keys.len());
        for key in keys {
            let path = dir.join(format!("{key}.{SUMMARY_EXT}"));
            match self.fs.read_to_string(&path).await {
                Ok(raw) => summaries.push(parse_summary(key, &raw)),
                Err(e) => tracing::warn!("Failed to read summary {}: {}", path.display(), e),
            }
        }
        Ok(summaries)
    }

    /// Summary stored under `timestamp` (raw or already sanitized).
    pub async fn get_summary(
        &self,
        project: &Path,
        id: &str,
        timestamp: &str,
    ) -> Result<Option<SummaryFile>> {
        let key = summary_key(timestamp);
        if !layout::is_valid_segment(&key) {
            return Ok(None);
        }
        let Some(dir) = self.feature_dir(project, id).await? else {
            return Ok(None);
        };
        let path = dir.join(SUMMARIES_DIR).join(format!("{key}.{SUMMARY_EXT}"));
        Ok(self
            .fs
            .read_optional(&path)
            .await?
            .map(|raw| parse_summary(key, &raw)))
    }

    pub async fn latest_summary(&self, project: &Path, id: &str) -> Result<Option<SummaryFile>> {
        Ok(self.list_summaries(project, id).await?.into_iter().next())
    }
}

/// Filename stem for a summary timestamp.
pub fn summary_key(timestamp: &str) -> String {
    timestamp.trim().replace(':', "-")
}

fn parse_summary(timestamp: String, raw: &str) -> SummaryFile {
    let (first, rest) = raw.split_once('\n').unwrap_or((raw, ""));
    let model = first
        .strip_prefix(MODEL_HEADER_PREFIX)
        .and_then(|s| s.strip_suffix(MODEL_HEADER_SUFFIX))
        .map(|m| m.trim().to_string());

    match model {
        Some(model) => SummaryFile {
            timestamp,
            model: Some(model),
            content: rest.strip_prefix('\n').unwrap_or(rest).to_string(),
        },
        None => SummaryFile {
            timestamp,
            model: None,
            content: raw.to_string(),
        },
    }
}

fn absolute_from(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
