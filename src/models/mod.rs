//! Domain models for the feature store.
//!
//! # Core Concepts
//!
//! - [`Feature`]: One unit of work, persisted as `feature.json` inside its own directory.
//!   The `status` field doubles as the on-disk partition key.
//! - [`DescriptionHistoryEntry`]: Append-only record of description changes, kept inside
//!   the feature record.
//! - [`SummaryFile`]: File-backed summary history, one markdown file per summary under
//!   the feature's `summaries/` directory.
//! - [`FeatureSummary`]: Lightweight projection returned by summary listings.

mod feature;
mod history;
mod lenient;
mod summary;

pub use feature::*;
pub use history::*;
pub use summary::*;
