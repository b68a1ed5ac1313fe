//! File-backed feature store for Automaker projects.
//!
//! Feature records live under `{project}/.automaker/features`, partitioned by status.
//! [`store::FeatureStore`] owns discovery, migration from the legacy month and flat
//! layouts, crash-safe persistence and per-feature artifacts.

pub mod config;
pub mod error;
pub mod fs;
pub mod models;
pub mod store;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use store::FeatureStore;
