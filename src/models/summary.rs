use serde::{Deserialize, Serialize};

use super::Feature;

/// Minimal feature info returned by summary listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSummary {
    pub id: String,
    pub title: String,
    pub status: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    pub is_favorite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Feature> for FeatureSummary {
    fn from(f: Feature) -> Self {
        Self {
            id: f.id,
            title: f.title,
            status: f.status,
            category: f.category,
            priority: f.priority,
            is_favorite: f.is_favorite,
            branch_name: f.branch_name,
            error: f.error,
        }
    }
}

/// A summary stored under `summaries/{timestamp}.md`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryFile {
    /// File stem, i.e. the original timestamp with colons replaced by dashes.
    pub timestamp: String,
    /// Model named in the optional attribution header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub content: String,
}

/// Include/exclude filter applied to status directories during enumeration.
///
/// Legacy entries (status unknown until read) always pass the filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusFilter {
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

impl StatusFilter {
    pub fn only(statuses: &[&str]) -> Self {
        Self {
            include: Some(statuses.iter().map(|s| s.to_string()).collect()),
            exclude: None,
        }
    }

    pub fn except(statuses: &[&str]) -> Self {
        Self {
            include: None,
            exclude: Some(statuses.iter().map(|s| s.to_string()).collect()),
        }
    }

    pub fn allows(&self, status: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.iter().any(|s| s == status) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.iter().any(|s| s == status) {
                return false;
            }
        }
        true
    }
}
