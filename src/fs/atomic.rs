//! Crash-safe JSON persistence with rotated backups.
//!
//! Layout next to a primary file `feature.json`:
//! - `feature.json.bak1` .. `feature.json.bakN`: previous versions, 1 is newest
//! - `feature.json.tmp.{nonce}`: staging file, only left behind by an interrupted write

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::SecureFs;
use crate::error::{Result, StoreError};

const BACKUP_MARKER: &str = ".bak";
const TEMP_MARKER: &str = ".tmp.";

/// Outcome of a recovery-aware read.
#[derive(Debug, Clone, Default)]
pub struct RecoveredJson {
    /// First candidate that parsed as a JSON object.
    pub value: Option<Value>,
    /// True when the value came from a backup or staging file instead of the primary.
    pub recovered: bool,
    /// File the value was read from.
    pub source: Option<PathBuf>,
    /// Last parse or I/O failure seen, if any candidate existed but was unusable.
    pub error: Option<String>,
}

pub fn backup_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!("{BACKUP_MARKER}{index}"));
    PathBuf::from(name)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!("{TEMP_MARKER}{}", Uuid::new_v4().simple()));
    PathBuf::from(name)
}

/// Serialize `value` and atomically replace `path`, rotating up to `backup_count` backups.
///
/// The new content is staged in a sibling file, fsynced, and renamed over the primary,
/// so readers see either the old or the new record, never a partial one.
pub async fn write_json_atomic<T: Serialize>(
    fs: &SecureFs,
    path: &Path,
    value: &T,
    backup_count: usize,
) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;

    if backup_count > 0 {
        if let Err(e) = rotate_backups(fs, path, backup_count).await {
            tracing::warn!("Backup rotation failed for {}: {}", path.display(), e);
        }
    }

    let staging = temp_path(path);
    fs.write_synced(&staging, json.as_bytes()).await?;
    if let Err(e) = fs.rename(&staging, path).await {
        let _ = fs.remove_file(&staging).await;
        return Err(e);
    }
    Ok(())
}

async fn rotate_backups(fs: &SecureFs, path: &Path, backup_count: usize) -> Result<()> {
    if !fs.exists(path).await? {
        return Ok(());
    }
    for index in (1..backup_count).rev() {
        let older = backup_path(path, index);
        if fs.exists(&older).await? {
            fs.rename(&older, &backup_path(path, index + 1)).await?;
        }
    }
    fs.copy(path, &backup_path(path, 1)).await
}

/// Recovery candidates for `path` in the order they should be tried.
///
/// Primary first, then backups newest to oldest, then staging leftovers newest first.
async fn recovery_candidates(fs: &SecureFs, path: &Path) -> Result<Vec<PathBuf>> {
    let mut candidates = vec![path.to_path_buf()];
    let (Some(parent), Some(file_name)) = (path.parent(), path.file_name()) else {
        return Ok(candidates);
    };
    let file_name = file_name.to_string_lossy();
    let entries = fs.read_dir_or_empty(parent).await?;

    let mut backups: Vec<(usize, PathBuf)> = entries
        .iter()
        .filter(|e| !e.is_dir)
        .filter_map(|e| {
            let rest = e.name.strip_prefix(file_name.as_ref())?;
            let index = rest.strip_prefix(BACKUP_MARKER)?.parse::<usize>().ok()?;
            Some((index, parent.join(&e.name)))
        })
        .collect();
    backups.sort_by_key(|(index, _)| *index);
    candidates.extend(backups.into_iter().map(|(_, p)| p));

    let mut staged = Vec::new();
    for entry in entries.iter().filter(|e| !e.is_dir) {
        let is_staging = entry
            .name
            .strip_prefix(file_name.as_ref())
            .is_some_and(|rest| rest.starts_with(TEMP_MARKER));
        if is_staging {
            let p = parent.join(&entry.name);
            let modified = fs.modified_millis(&p).await.unwrap_or(0);
            staged.push((modified, p));
        }
    }
    staged.sort_by(|a, b| b.0.cmp(&a.0));
    candidates.extend(staged.into_iter().map(|(_, p)| p));

    Ok(candidates)
}

/// True if the primary file or any backup/staging artifact for it exists.
pub async fn has_record_artifacts(fs: &SecureFs, path: &Path) -> Result<bool> {
    Ok(recovery_candidates(fs, path).await?.len() > 1 || fs.exists(path).await?)
}

/// Read `path` as a JSON object, falling back to backups when it is missing or corrupt.
pub async fn read_json_with_recovery(fs: &SecureFs, path: &Path) -> RecoveredJson {
    let candidates = match recovery_candidates(fs, path).await {
        Ok(c) => c,
        Err(e) => {
            return RecoveredJson {
                error: Some(e.to_string()),
                ..RecoveredJson::default()
            }
        }
    };

    let mut last_error = None;
    for (position, candidate) in candidates.iter().enumerate() {
        let content = match fs.read_to_string(candidate).await {
            Ok(c) => c,
            Err(e) if e.is_not_found() => continue,
            Err(e) => {
                last_error = Some(e.to_string());
                continue;
            }
        };
        match parse_object(&content) {
            Ok(value) => {
                let recovered = position > 0;
                if recovered {
                    tracing::warn!(
                        "Recovered {} from {}",
                        path.display(),
                        candidate.display()
                    );
                }
                return RecoveredJson {
                    value: Some(value),
                    recovered,
                    source: Some(candidate.clone()),
                    error: last_error,
                };
            }
            Err(e) => {
                tracing::debug!("Unusable record candidate {}: {}", candidate.display(), e);
                last_error = Some(format!("{}: {}", candidate.display(), e));
            }
        }
    }

    RecoveredJson {
        error: last_error,
        ..RecoveredJson::default()
    }
}

fn parse_object(content: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(content)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(StoreError::InvalidInput(
            "record is not a JSON object".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture() -> (tempfile::TempDir, SecureFs, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("feature.json");
        (tmp, SecureFs::unrestricted(), path)
    }

    #[tokio::test]
    async fn write_keeps_bounded_backups() {
        let (_tmp, fs, path) = fixture();
        for version in 0..5 {
            write_json_atomic(&fs, &path, &json!({ "id": "f", "v": version }), 2)
                .await
                .unwrap();
        }

        assert!(fs.exists(&backup_path(&path, 1)).await.unwrap());
        assert!(fs.exists(&backup_path(&path, 2)).await.unwrap());
        assert!(!fs.exists(&backup_path(&path, 3)).await.unwrap());

        let bak1: Value =
            serde_json::from_str(&fs.read_to_string(&backup_path(&path, 1)).await.unwrap())
                .unwrap();
        assert_eq!(bak1["v"], 3);
    }

    #[tokio::test]
    async fn write_leaves_no_staging_files() {
        let (tmp, fs, path) = fixture();
        write_json_atomic(&fs, &path, &json!({ "id": "f" }), 0)
            .await
            .unwrap();
        let names: Vec<String> = fs
            .read_dir(tmp.path())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["feature.json".to_string()]);
    }

    #[tokio::test]
    async fn corrupt_primary_recovers_newest_backup() {
        let (_tmp, fs, path) = fixture();
        write_json_atomic(&fs, &path, &json!({ "id": "f", "v": 1 }), 3)
            .await
            .unwrap();
        write_json_atomic(&fs, &path, &json!({ "id": "f", "v": 2 }), 3)
            .await
            .unwrap();
        fs.write(&path, b"{ not json").await.unwrap();

        let read = read_json_with_recovery(&fs, &path).await;
        assert!(read.recovered);
        assert_eq!(read.value.unwrap()["v"], 1);
        assert_eq!(read.source, Some(backup_path(&path, 1)));
    }

    #[tokio::test]
    async fn missing_everything_reports_nothing() {
        let (_tmp, fs, path) = fixture();
        let read = read_json_with_recovery(&fs, &path).await;
        assert!(read.value.is_none());
        assert!(read.error.is_none());
        assert!(!has_record_artifacts(&fs, &path).await.unwrap());
    }

    #[tokio::test]
    async fn unparseable_without_backups_reports_error() {
        let (_tmp, fs, path) = fixture();
        fs.write(&path, b"[1, 2").await.unwrap();
        let read = read_json_with_recovery(&fs, &path).await;
        assert!(read.value.is_none());
        assert!(read.error.is_some());
    }

    #[tokio::test]
    async fn staging_leftover_is_last_resort() {
        let (tmp, fs, path) = fixture();
        let staged = tmp.path().join("feature.json.tmp.abc");
        fs.write(&staged, br#"{ "id": "f", "v": 9 }"#).await.unwrap();

        assert!(has_record_artifacts(&fs, &path).await.unwrap());
        let read = read_json_with_recovery(&fs, &path).await;
        assert!(read.recovered);
        assert_eq!(read.value.unwrap()["v"], 9);
    }
}
