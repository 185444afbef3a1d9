//! Migration unit titles.
//!
//! A title is `YYYYMMDD_HHMMSSmmm_<suffix>` where the suffix is six random
//! lowercase alphanumerics. Titles sort lexically in creation order, and a
//! generator never hands out the same millisecond twice.

use std::sync::{Mutex, OnceLock};

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;

use crate::core::statement::{pattern, PatternCell};
use crate::error::{MigrateError, Result};

/// File suffix of forward unit text.
pub const UP_SUFFIX: &str = ".up.sql";

/// File suffix of reverse unit text.
pub const DOWN_SUFFIX: &str = ".down.sql";

const SUFFIX_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 6;

/// Hands out strictly increasing titles.
#[derive(Debug, Default)]
pub struct TitleGenerator {
    last_millis: Mutex<i64>,
}

impl TitleGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next title stem, without the `.up.sql` suffix.
    pub fn next(&self) -> String {
        self.next_at(Utc::now())
    }

    fn next_at(&self, now: DateTime<Utc>) -> String {
        let millis = {
            let mut last = self
                .last_millis
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let millis = now.timestamp_millis().max(*last + 1);
            *last = millis;
            millis
        };
        let at = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or(now);
        format!("{}_{}", at.format("%Y%m%d_%H%M%S%3f"), random_suffix())
    }
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARS[rng.gen_range(0..SUFFIX_CHARS.len())] as char)
        .collect()
}

fn stem_pattern() -> Result<&'static Regex> {
    static CELL: PatternCell = OnceLock::new();
    pattern(&CELL, r"^\d{8}_\d{9}_[a-z0-9]{6}$")
}

/// True for a well-formed title stem.
pub fn is_stem(stem: &str) -> bool {
    stem_pattern().map_or(false, |p| p.is_match(stem))
}

/// Stem of a title given with or without its file suffix.
pub fn stem_of(title: &str) -> &str {
    title
        .strip_suffix(UP_SUFFIX)
        .or_else(|| title.strip_suffix(DOWN_SUFFIX))
        .unwrap_or(title)
}

/// Forward title (`<stem>.up.sql`) for user input in either form.
pub fn normalize(title: &str) -> Result<String> {
    let stem = stem_of(title.trim());
    if !is_stem(stem) {
        return Err(MigrateError::Config(format!(
            "'{}' is not a migration title (expected YYYYMMDD_HHMMSSmmm_xxxxxx)",
            title
        )));
    }
    Ok(up_title(stem))
}

pub fn up_title(stem: &str) -> String {
    format!("{}{}", stem, UP_SUFFIX)
}

pub fn down_title(stem: &str) -> String {
    format!("{}{}", stem, DOWN_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_title_shape() {
        let title = TitleGenerator::new().next();
        assert!(is_stem(&title), "bad title {}", title);
        assert_eq!(title.len(), 8 + 1 + 9 + 1 + 6);
    }

    #[test]
    fn test_same_millisecond_is_bumped() {
        let generator = TitleGenerator::new();
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 5).unwrap();
        let a = generator.next_at(now);
        let b = generator.next_at(now);
        let c = generator.next_at(now);
        assert!(a.starts_with("20240309_123005000_"));
        assert!(b.starts_with("20240309_123005001_"));
        assert!(c.starts_with("20240309_123005002_"));
    }

    #[test]
    fn test_titles_are_strictly_increasing() {
        let generator = TitleGenerator::new();
        let titles: Vec<String> = (0..50).map(|_| generator.next()).collect();
        for pair in titles.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_clock_going_backwards_still_increases() {
        let generator = TitleGenerator::new();
        let later = Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 5).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let a = generator.next_at(later);
        let b = generator.next_at(earlier);
        assert!(a < b);
    }

    #[test]
    fn test_normalize() {
        let stem = "20240309_123005000_ab12cd";
        assert_eq!(normalize(stem).unwrap(), format!("{}.up.sql", stem));
        assert_eq!(
            normalize(&format!("{}.down.sql", stem)).unwrap(),
            format!("{}.up.sql", stem)
        );
        assert!(normalize("../etc/passwd").is_err());
        assert!(normalize("20240309_123005000_AB12CD").is_err());
    }
}
