//! Directory moves that follow a feature's status.

use std::path::{Path, PathBuf};

use super::layout;
use super::FeatureStore;
use crate::error::Result;

impl FeatureStore {
    /// Move the feature directory into the partition for `status`.
    ///
    /// Called after the record has been written, so a failed rename only leaves the
    /// feature in the wrong partition until the next full scan; the error is logged
    /// and the old directory returned.
    pub(crate) async fn move_to_status(
        &self,
        root: &Path,
        id: &str,
        current: &Path,
        status: &str,
    ) -> PathBuf {
        let target = layout::feature_dir(root, status, id);
        if target == current {
            return target;
        }

        match self.relocate(current, &target).await {
            Ok(()) => {
                tracing::info!(
                    "Moved feature {} to {}",
                    id,
                    target.display()
                );
                self.paths.insert(root, id, target.clone());
                target
            }
            Err(e) => {
                tracing::error!(
                    "Failed to move feature {} to {}: {}",
                    id,
                    target.display(),
                    e
                );
                current.to_path_buf()
            }
        }
    }

    /// Rename a feature directory, creating the destination partition if needed.
    pub(crate) async fn relocate(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            self.fs.create_dir_all(parent).await?;
        }
        self.fs.rename(from, to).await
    }
}
