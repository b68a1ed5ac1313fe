//! Store configuration loaded from environment variables.

use std::path::PathBuf;

/// Rotated backups kept next to each `feature.json` unless overridden.
pub const DEFAULT_BACKUP_COUNT: usize = 3;

/// Configuration for a [`crate::FeatureStore`].
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Number of rotated backups per record (from AUTOMAKER_BACKUP_COUNT). Zero disables rotation.
    pub backup_count: usize,
    /// Directories the sandboxed filesystem may touch (from AUTOMAKER_ALLOWED_ROOTS).
    /// Empty means unrestricted.
    pub allowed_roots: Vec<PathBuf>,
    /// Extra status directory names beyond the built-ins (from AUTOMAKER_STATUS_DIRS, comma-separated).
    pub extra_status_dirs: Vec<String>,
}

impl StoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let backup_count = std::env::var("AUTOMAKER_BACKUP_COUNT")
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_BACKUP_COUNT);

        let allowed_roots = std::env::var_os("AUTOMAKER_ALLOWED_ROOTS")
            .map(|v| {
                std::env::split_paths(&v)
                    .filter(|p| !p.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let extra_status_dirs = std::env::var("AUTOMAKER_STATUS_DIRS")
            .ok()
            .map(|s| parse_status_list(&s))
            .unwrap_or_default();

        Self {
            backup_count,
            allowed_roots,
            extra_status_dirs,
        }
    }

    /// Override the number of rotated backups.
    pub fn with_backup_count(mut self, count: usize) -> Self {
        self.backup_count = count;
        self
    }

    /// Restrict filesystem access to the given roots.
    pub fn with_allowed_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.allowed_roots = roots;
        self
    }

    /// Recognise additional status directory names.
    pub fn with_extra_status_dirs(mut self, statuses: Vec<String>) -> Self {
        self.extra_status_dirs = statuses;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backup_count: DEFAULT_BACKUP_COUNT,
            allowed_roots: Vec::new(),
            extra_status_dirs: Vec::new(),
        }
    }
}

fn parse_status_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
