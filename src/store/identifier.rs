//! Feature identifiers.
//!
//! New identifiers look like `17-02-2026-add_dark_mode_toggle`. Two older encodings are
//! still found on disk and must sort correctly:
//! - `feature-{unixMillis}-{random}`
//! - `project-{MM}{HH}{dd}{mm}{YYYY}-{random}`

use std::sync::LazyLock;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use uuid::Uuid;

use crate::models::Feature;

/// Words of the description used for the slug.
const SLUG_WORDS: usize = 4;
/// Length of the random suffix used when the description yields no slug.
const RANDOM_SUFFIX_LEN: usize = 9;

static CURRENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2})-(\d{2})-(\d{4})-.+$").expect("valid id regex"));
static LEGACY_FLAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^feature-(\d+)-.+$").expect("valid id regex"));
static LEGACY_PROJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^project-(\d{2})(\d{2})(\d{2})(\d{2})(\d{4})-.+$").expect("valid id regex")
});

/// Generate an identifier for a new feature dated today (local calendar).
pub fn generate_feature_id(description: &str) -> String {
    generate_feature_id_on(description, Local::now().date_naive())
}

/// Generate an identifier for a feature created on `date`.
pub fn generate_feature_id_on(description: &str, date: NaiveDate) -> String {
    let suffix = slugify(description).unwrap_or_else(|| random_suffix(RANDOM_SUFFIX_LEN));
    format!("{}-{}", date.format("%d-%m-%Y"), suffix)
}

/// First words of `description`, lowercased, stripped to ASCII alphanumerics, joined by `_`.
///
/// Words that strip to nothing still count towards the limit.
fn slugify(description: &str) -> Option<String> {
    let words: Vec<String> = description
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .take(SLUG_WORDS)
        .filter(|word| !word.is_empty())
        .collect();

    (!words.is_empty()).then(|| words.join("_"))
}

/// Lowercase alphanumeric string of `len` characters.
pub fn random_suffix(len: usize) -> String {
    let mut out = String::with_capacity(len);
    while out.len() < len {
        out.push_str(&Uuid::new_v4().simple().to_string());
    }
    out.truncate(len);
    out
}

/// Creation time encoded in an identifier, as unix milliseconds (UTC).
pub fn created_at_millis(id: &str) -> Option<i64> {
    if let Some(caps) = CURRENT_RE.captures(id) {
        let day = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let year = caps[3].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        return Some(date.and_time(NaiveTime::MIN).and_utc().timestamp_millis());
    }

    if let Some(caps) = LEGACY_FLAT_RE.captures(id) {
        return caps[1].parse().ok();
    }

    if let Some(caps) = LEGACY_PROJECT_RE.captures(id) {
        let month = caps[1].parse().ok()?;
        let hour = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        let minute = caps[4].parse().ok()?;
        let year = caps[5].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
        return Some(NaiveDateTime::new(date, time).and_utc().timestamp_millis());
    }

    None
}

/// Sort key for an identifier; unrecognised identifiers sort first.
pub fn sort_key(id: &str) -> i64 {
    created_at_millis(id).unwrap_or(i64::MIN)
}

/// Sort features oldest first by the creation time encoded in their identifiers.
///
/// Ties (same calendar day for current identifiers) fall back to the identifier itself.
pub fn sort_features(features: &mut [Feature]) {
    features.sort_by(|a, b| {
        sort_key(&a.id)
            .cmp(&sort_key(&b.id))
            .then_with(|| a.id.cmp(&b.id))
    });
}
