//! Sandboxed async filesystem access.
//!
//! Every path handed to [`SecureFs`] is lexically normalized and checked against the
//! configured roots before any I/O happens. Errors carry the offending path.

mod atomic;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;

use crate::error::{Result, StoreError};

pub use atomic::*;

/// A directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Filesystem access restricted to a set of allowed roots.
///
/// An empty root set allows any absolute path. Relative paths are always refused.
#[derive(Clone, Debug, Default)]
pub struct SecureFs {
    allowed_roots: Arc<Vec<PathBuf>>,
}

impl SecureFs {
    pub fn new(allowed_roots: Vec<PathBuf>) -> Self {
        let roots = allowed_roots.iter().map(|r| normalize(r)).collect();
        Self {
            allowed_roots: Arc::new(roots),
        }
    }

    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Validate a path and return its normalized form.
    pub fn check(&self, path: &Path) -> Result<PathBuf> {
        if !path.is_absolute() {
            return Err(StoreError::PathOutsideRoot(path.to_path_buf()));
        }
        let normalized = normalize(path);
        if self.allowed_roots.is_empty()
            || self
                .allowed_roots
                .iter()
                .any(|root| normalized.starts_with(root))
        {
            Ok(normalized)
        } else {
            Err(StoreError::PathOutsideRoot(path.to_path_buf()))
        }
    }

    /// Returns `Ok(false)` for a missing path, errors only on other failures.
    pub async fn exists(&self, path: &Path) -> Result<bool> {
        let path = self.check(path)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    pub async fn is_dir(&self, path: &Path) -> Result<bool> {
        let path = self.check(path)?;
        match tokio::fs::metadata(&path).await {
            Ok(md) => Ok(md.is_dir()),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
                ) =>
            {
                Ok(false)
            }
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    pub async fn read_to_string(&self, path: &Path) -> Result<String> {
        let path = self.check(path)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    /// Read a text file, mapping a missing file to `None`.
    pub async fn read_optional(&self, path: &Path) -> Result<Option<String>> {
        match self.read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let path = self.check(path)?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    /// Write and fsync a new file.
    pub async fn write_synced(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let path = self.check(path)?;
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        file.write_all(contents)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        file.sync_all().await.map_err(|e| StoreError::io(&path, e))
    }

    pub async fn append(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let path = self.check(path)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        file.write_all(contents)
            .await
            .map_err(|e| StoreError::io(&path, e))
    }

    pub async fn create_dir_all(&self, path: &Path) -> Result<()> {
        let path = self.check(path)?;
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    pub async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let path = self.check(path)?;
        let mut reader = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&path, e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                tracing::debug!("Skipping non UTF-8 entry in {}", path.display());
                continue;
            };
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(DirEntry { name, is_dir });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Same as [`read_dir`](Self::read_dir) but a missing directory lists as empty.
    pub async fn read_dir_or_empty(&self, path: &Path) -> Result<Vec<DirEntry>> {
        match self.read_dir(path).await {
            Ok(entries) => Ok(entries),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from = self.check(from)?;
        let to = self.check(to)?;
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| StoreError::io(from, e))
    }

    pub async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let from = self.check(from)?;
        let to = self.check(to)?;
        tokio::fs::copy(&from, &to)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::io(from, e))
    }

    pub async fn remove_file(&self, path: &Path) -> Result<()> {
        let path = self.check(path)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    /// Remove an empty directory.
    pub async fn remove_dir(&self, path: &Path) -> Result<()> {
        let path = self.check(path)?;
        tokio::fs::remove_dir(&path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    pub async fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let path = self.check(path)?;
        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    pub async fn modified_millis(&self, path: &Path) -> Result<i64> {
        let path = self.check(path)?;
        let md = tokio::fs::metadata(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        let modified = md.modified().map_err(|e| StoreError::io(&path, e))?;
        Ok(modified
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0))
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_are_refused() {
        let fs = SecureFs::unrestricted();
        assert!(matches!(
            fs.check(Path::new("features/a")),
            Err(StoreError::PathOutsideRoot(_))
        ));
    }

    #[test]
    fn traversal_out_of_root_is_refused() {
        let fs = SecureFs::new(vec![PathBuf::from("/srv/project")]);
        assert!(fs.check(Path::new("/srv/project/.automaker/x")).is_ok());
        assert!(fs
            .check(Path::new("/srv/project/.automaker/../../etc/passwd"))
            .is_err());
        assert!(fs.check(Path::new("/srv/project-other/a")).is_err());
    }

    #[test]
    fn normalize_drops_dot_segments() {
        assert_eq!(
            normalize(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
    }

    #[tokio::test]
    async fn read_dir_reports_kinds_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("b_dir")).unwrap();
        std::fs::write(tmp.path().join("a_file"), "x").unwrap();

        let fs = SecureFs::unrestricted();
        let entries = fs.read_dir(tmp.path()).await.unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntry {
                    name: "a_file".to_string(),
                    is_dir: false
                },
                DirEntry {
                    name: "b_dir".to_string(),
                    is_dir: true
                },
            ]
        );
        assert!(fs
            .read_dir_or_empty(&tmp.path().join("missing"))
            .await
            .unwrap()
            .is_empty());
    }
}
