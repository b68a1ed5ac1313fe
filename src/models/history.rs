use serde::{Deserialize, Serialize};

use super::lenient;

/// One entry in a feature's description history.
///
/// Entries are appended whenever the description changes; the list is never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionHistoryEntry {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub description: String,
    /// ISO-8601 timestamp of the change.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub source: DescriptionSource,
    /// Enhancement mode used when `source` is `Enhance` (e.g. "improve", "simplify").
    #[serde(
        default,
        deserialize_with = "lenient::or_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub enhancement_mode: Option<String>,
}

/// Where a description revision came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionSource {
    Initial,
    Enhance,
    #[default]
    Edit,
    /// Any source written by a newer version of the tool.
    #[serde(other)]
    Unknown,
}
