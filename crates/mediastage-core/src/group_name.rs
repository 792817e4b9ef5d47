//! Group folder naming: `YYYY-MM-DD@HHMMSS<sep><label>`.

use std::fmt;
use std::path::Path;

use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

use crate::date::{self, TIMESTAMP_LEN};

/// Index of the `@` between date and time.
const SEPARATOR_AT: usize = 10;

/// Shortest valid name: timestamp, separator, two label characters.
const MIN_LEN: usize = 19;

/// Prefix of folders created by automatic clustering.
pub const CLUSTER_PREFIX: &str = "TODO_";

static DATE_LIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(18|19|20)\d{2}[-_.]?(0[1-9]|1[0-2])").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupNameError {
    TooShort(usize),
    StrayAt(usize),
    BadTimestamp(String),
}

impl fmt::Display for GroupNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupNameError::TooShort(len) => {
                write!(f, "{} characters, need at least {}", len, MIN_LEN)
            }
            GroupNameError::StrayAt(pos) => write!(f, "'@' at position {} is reserved", pos),
            GroupNameError::BadTimestamp(prefix) => {
                write!(f, "'{}' is not a YYYY-MM-DD@HHMMSS timestamp", prefix)
            }
        }
    }
}

impl std::error::Error for GroupNameError {}

/// Names are compared in NFC so that decomposed labels (macOS) count the same.
pub fn normalize(name: &str) -> String {
    name.nfc().collect()
}

/// Validate a group folder name.
///
/// The contract is positional: length over 18 characters, no `@` from index 11
/// on, and characters `[0, 17)` forming the timestamp.
pub fn check_group_name(name: &str) -> Result<NaiveDateTime, GroupNameError> {
    let name = normalize(name);
    let chars: Vec<char> = name.chars().collect();

    if chars.len() < MIN_LEN {
        return Err(GroupNameError::TooShort(chars.len()));
    }
    if let Some(pos) = chars
        .iter()
        .enumerate()
        .skip(SEPARATOR_AT + 1)
        .find(|(_, c)| **c == '@')
        .map(|(i, _)| i)
    {
        return Err(GroupNameError::StrayAt(pos));
    }
    let prefix: String = chars[..TIMESTAMP_LEN].iter().collect();
    date::parse_timestamp(&prefix).ok_or(GroupNameError::BadTimestamp(prefix))
}

pub fn is_correct_group_name(name: &str) -> bool {
    check_group_name(name).is_ok()
}

/// Free-text label after the timestamp and separator.
pub fn label(name: &str) -> String {
    normalize(name).chars().skip(TIMESTAMP_LEN + 1).collect()
}

/// `TODO_<timestamp>` name for an automatically formed cluster.
pub fn cluster_name(anchor: &NaiveDateTime) -> String {
    format!("{}{}", CLUSTER_PREFIX, date::format_timestamp(anchor))
}

/// Anchor timestamp of a `TODO_<timestamp>` folder.
pub fn parse_cluster_name(name: &str) -> Option<NaiveDateTime> {
    name.strip_prefix(CLUSTER_PREFIX).and_then(date::parse_timestamp)
}

/// Whether a folder name already starts like a date.
pub fn looks_date_like(name: &str) -> bool {
    DATE_LIKE_RE.is_match(name)
}

pub fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| normalize(&n.to_string_lossy()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grammar() {
        assert!(is_correct_group_name("2022-12-12@121212_TEST"));
        assert!(is_correct_group_name("2022-12-12@121212 ab"));
        assert!(!is_correct_group_name("2022-12-12@121212_x@y"));
        assert!(!is_correct_group_name("2022-12-12_121212_TEST"));
        assert!(!is_correct_group_name("2022-02-30@121212_TEST"));
        assert!(!is_correct_group_name("My Vacation Photos 2022"));
    }

    #[test]
    fn length_boundary() {
        // 18 characters is one too few
        assert_eq!(
            check_group_name("2022-12-12@121212_"),
            Err(GroupNameError::TooShort(18))
        );
        assert!(check_group_name("2022-12-12@121212_x").is_ok());
    }

    #[test]
    fn stray_at_position_is_reported() {
        assert_eq!(
            check_group_name("2022-12-12@121212_a@b"),
            Err(GroupNameError::StrayAt(19))
        );
    }

    #[test]
    fn non_ascii_labels_count_characters() {
        assert!(is_correct_group_name("2022-12-12@121212_Köln"));
        assert!(is_correct_group_name("2022-12-12@121212_日本"));
        assert_eq!(label("2022-12-12@121212_Köln"), "Köln");
    }

    #[test]
    fn cluster_names_round_trip() {
        let ts = date::parse_timestamp("2023-04-05@060708").unwrap();
        let name = cluster_name(&ts);
        assert_eq!(name, "TODO_2023-04-05@060708");
        assert_eq!(parse_cluster_name(&name), Some(ts));
        assert!(parse_cluster_name("TODO_later").is_none());
        assert!(!is_correct_group_name(&name));
    }

    #[test]
    fn date_like_names() {
        assert!(looks_date_like("2019-07 Holiday"));
        assert!(looks_date_like("201907_Holiday"));
        assert!(!looks_date_like("Holiday"));
    }
}
