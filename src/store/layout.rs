//! On-disk layout of the feature tree.
//!
//! ```text
//! {project}/.automaker/features/
//! ├── backlog/                      status partition (current layout)
//! │   └── 17-02-2026-add_dark_mode/
//! │       ├── feature.json
//! │       ├── feature.json.bak1
//! │       ├── images/ summaries/ logs/ backups/
//! ├── 2024-march/                   legacy month directory
//! │   └── project-031014302024-x1y2/
//! └── feature-1709876543210-abc/    legacy flat entry
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Datelike};
use regex::Regex;

use super::identifier;

pub const AUTOMAKER_DIR: &str = ".automaker";
pub const FEATURES_DIR: &str = "features";
pub const FEATURE_FILE: &str = "feature.json";

pub const IMAGES_DIR: &str = "images";
pub const SUMMARIES_DIR: &str = "summaries";
pub const LOGS_DIR: &str = "logs";
pub const BACKUPS_DIR: &str = "backups";

/// Fixed subdirectories created inside every feature directory.
pub const FEATURE_SUBDIRS: [&str; 4] = [IMAGES_DIR, SUMMARIES_DIR, LOGS_DIR, BACKUPS_DIR];

pub const AGENT_OUTPUT_FILE: &str = "agent-output.md";
pub const RAW_OUTPUT_FILE: &str = "raw-output.jsonl";

/// Status partitions recognised without configuration.
pub const BUILTIN_STATUSES: &[&str] = &[
    "backlog",
    "pending",
    "ready",
    "in_progress",
    "waiting_approval",
    "verified",
    "completed",
    "failed",
];

/// Dynamically named pipeline stages are status partitions too.
const PIPELINE_PREFIX: &str = "pipeline_";

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

static MONTH_DIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\d{4}-(january|february|march|april|may|june|july|august|september|october|november|december)$",
    )
    .expect("valid month directory regex")
});

/// How a top-level child of the features root is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Status partition: children are features with a known status.
    Status,
    /// Legacy `YYYY-monthname` grouping: children are features, status unknown.
    Month,
    /// Anything else: a feature directory in the legacy flat layout if it holds a
    /// record, otherwise a dynamically named status partition.
    Flat,
}

/// Path conventions plus the set of recognised status partitions.
#[derive(Clone, Debug, Default)]
pub struct Layout {
    extra_statuses: Arc<Vec<String>>,
}

impl Layout {
    pub fn new(extra_statuses: Vec<String>) -> Self {
        Self {
            extra_statuses: Arc::new(extra_statuses),
        }
    }

    pub fn is_status_dir(&self, name: &str) -> bool {
        BUILTIN_STATUSES.contains(&name)
            || name.starts_with(PIPELINE_PREFIX)
            || self.extra_statuses.iter().any(|s| s == name)
    }

    pub fn classify(&self, name: &str) -> EntryKind {
        if self.is_status_dir(name) {
            EntryKind::Status
        } else if is_month_dir(name) {
            EntryKind::Month
        } else {
            EntryKind::Flat
        }
    }

    /// Status implied by a feature directory's location.
    ///
    /// Any non-month directory directly under the features root that holds feature
    /// directories is a partition, including dynamically named ones.
    pub fn status_of_dir(&self, root: &Path, dir: &Path) -> Option<String> {
        let parent = dir.parent()?;
        if parent.parent()? != features_dir(root).as_path() {
            return None;
        }
        let name = parent.file_name()?.to_str()?;
        (!is_month_dir(name)).then(|| name.to_string())
    }
}

pub fn features_dir(root: &Path) -> PathBuf {
    root.join(AUTOMAKER_DIR).join(FEATURES_DIR)
}

pub fn status_dir(root: &Path, status: &str) -> PathBuf {
    features_dir(root).join(status)
}

/// Directory a feature with `status` belongs in under the current layout.
pub fn feature_dir(root: &Path, status: &str, id: &str) -> PathBuf {
    status_dir(root, status).join(id)
}

pub fn feature_file(dir: &Path) -> PathBuf {
    dir.join(FEATURE_FILE)
}

pub fn is_month_dir(name: &str) -> bool {
    MONTH_DIR_RE.is_match(name)
}

/// `YYYY-monthname` for a unix timestamp in milliseconds.
pub fn month_dir_name(millis: i64) -> Option<String> {
    let dt = DateTime::from_timestamp_millis(millis)?;
    let month = MONTH_NAMES.get(dt.month0() as usize)?;
    Some(format!("{}-{}", dt.year(), month))
}

/// Candidate legacy locations for `id`: month directory derived from the id, then flat.
pub fn legacy_dirs(root: &Path, id: &str) -> Vec<PathBuf> {
    let features = features_dir(root);
    let mut dirs = Vec::with_capacity(2);
    if let Some(month) = identifier::created_at_millis(id).and_then(month_dir_name) {
        dirs.push(features.join(month).join(id));
    }
    dirs.push(features.join(id));
    dirs
}

/// True if `name` is safe to use as a single path component.
pub fn is_valid_segment(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
        && name.trim() == name
}
