use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::history::{DescriptionHistoryEntry, DescriptionSource};
use super::lenient;

/// Status assigned to features that do not carry one.
pub const DEFAULT_STATUS: &str = "backlog";

/// A unit of planned or completed work.
///
/// Persisted as `feature.json` with camelCase keys. Records written by older or newer
/// versions of the tool may be missing fields, carry mistyped ones, or carry extra ones:
/// missing or mistyped fields deserialize to defaults, and unknown keys are kept in
/// `extra` so a read/modify/write cycle never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub category: String,
    /// Open-ended workflow stage, also the name of the directory holding the feature.
    #[serde(default = "default_status", deserialize_with = "lenient::status")]
    pub status: String,
    #[serde(
        default,
        deserialize_with = "lenient::or_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<i64>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub is_favorite: bool,
    #[serde(
        default,
        deserialize_with = "lenient::or_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub model: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::or_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub thinking_level: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::or_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub branch_name: Option<String>,
    /// Last error reported while working on the feature.
    #[serde(
        default,
        deserialize_with = "lenient::or_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::or_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub started_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub image_paths: Vec<FeatureImage>,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub description_history: Vec<DescriptionHistoryEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A reference to an image attached to a feature.
///
/// Older clients stored bare path strings; newer ones store an object with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureImage {
    Path(String),
    Detailed(ImageRef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl FeatureImage {
    pub fn path(&self) -> &str {
        match self {
            Self::Path(p) => p,
            Self::Detailed(r) => &r.path,
        }
    }

    /// Same reference pointing at a different file, metadata preserved.
    pub fn with_path(&self, path: String) -> Self {
        match self {
            Self::Path(_) => Self::Path(path),
            Self::Detailed(r) => Self::Detailed(ImageRef {
                path,
                ..r.clone()
            }),
        }
    }
}

/// Input for creating a new feature.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFeatureInput {
    /// Explicit identifier. Generated from the description when absent.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    /// Initial status. Defaults to `backlog`.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub thinking_level: Option<String>,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub image_paths: Vec<FeatureImage>,
    #[serde(default)]
    pub description_history: Vec<DescriptionHistoryEntry>,
}

/// Input for updating an existing feature. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFeatureInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    /// A new status moves the feature directory to the matching partition.
    pub status: Option<String>,
    pub priority: Option<i64>,
    pub is_favorite: Option<bool>,
    pub model: Option<String>,
    pub thinking_level: Option<String>,
    pub branch_name: Option<String>,
    pub error: Option<String>,
    pub started_at: Option<String>,
    /// Replaces the image list. Images dropped from the list are deleted from storage.
    pub image_paths: Option<Vec<FeatureImage>>,
    /// Source recorded in the description history when `description` changes.
    pub description_history_source: Option<DescriptionSource>,
    pub enhancement_mode: Option<String>,
}

impl UpdateFeatureInput {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }
}

fn default_status() -> String {
    DEFAULT_STATUS.to_string()
}
