use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::LazyLock;

/// Camera and phone naming schemes: (pattern, chrono format, digits to keep).
static NAME_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    const MONTH: &str = "(0[1-9]|1[0-2])";
    [
        // Screenshot_20190919-053857
        (format!(r"(?P<d>(19|20)\d{{2}}{MONTH}[0-3]\d-\d{{6}})"), "%Y%m%d-%H%M%S"),
        // IMG_20190509_154733, VID_20200101_000001
        (format!(r"(?P<d>(19|20)\d{{2}}{MONTH}[0-3]\d_\d{{6}})"), "%Y%m%d_%H%M%S"),
        // 2020-10-26-16-38-32
        (format!(r"(?P<d>(19|20)\d{{2}}-{MONTH}-[0-3]\d-\d{{2}}-\d{{2}}-\d{{2}})"), "%Y-%m-%d-%H-%M-%S"),
        // signal-2020-10-26-163832
        (format!(r"(?P<d>(19|20)\d{{2}}-{MONTH}-[0-3]\d-\d{{6}})"), "%Y-%m-%d-%H%M%S"),
        // 2020-10-26 16.38.32 (desktop exports)
        (format!(r"(?P<d>(19|20)\d{{2}}-{MONTH}-[0-3]\d \d{{2}}\.\d{{2}}\.\d{{2}})"), "%Y-%m-%d %H.%M.%S"),
        // 2016_01_30_11_49_15
        (format!(r"(?P<d>(19|20)\d{{2}}_{MONTH}_[0-3]\d_\d{{2}}_\d{{2}}_\d{{2}})"), "%Y_%m_%d_%H_%M_%S"),
        // 20190509154733123 (trailing milliseconds dropped)
        (format!(r"(?P<d>(19|20)\d{{2}}{MONTH}[0-3]\d{{7}})"), "%Y%m%d%H%M%S"),
    ]
    .into_iter()
    .filter_map(|(re, fmt)| match Regex::new(&re) {
        Ok(re) => Some((re, fmt)),
        Err(e) => {
            tracing::error!("bad filename date pattern {}: {}", re, e);
            None
        }
    })
    .collect()
});

/// Guess a capture time from a file name without extension.
pub fn guess_date_from_filename(stem: &str) -> Option<NaiveDateTime> {
    for (re, fmt) in NAME_PATTERNS.iter() {
        let Some(found) = re.captures(stem).and_then(|c| c.name("d")) else {
            continue;
        };
        let text = found.as_str();
        // The compact pattern may swallow extra digits.
        let text = if *fmt == "%Y%m%d%H%M%S" { &text[..14] } else { text };
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_schemes() {
        assert!(guess_date_from_filename("Screenshot_20190919-053857").is_some());
        assert!(guess_date_from_filename("IMG_20190509_154733").is_some());
        assert!(guess_date_from_filename("signal-2020-10-26-163832").is_some());
        assert!(guess_date_from_filename("2016_01_30_11_49_15").is_some());
        assert!(guess_date_from_filename("2020-10-26 16.38.32").is_some());
        assert_eq!(
            guess_date_from_filename("PXL_20230102030405123").map(|d| d.to_string()),
            Some("2023-01-02 03:04:05".to_string())
        );
        assert!(guess_date_from_filename("random_photo").is_none());
    }
}
