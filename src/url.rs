//! Source URL validation and collection detection.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)https?://[a-z0-9]([a-z0-9.-]*[a-z0-9])?(:\d+)?(/\S*)?$").expect("valid regex")
});

static COLLECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]list=[^&#\s]+|/playlist(?:[/?#]|$)").expect("valid regex"));

/// Checks that `input` is an absolute http(s) URL and returns it trimmed.
///
/// Only the shape is checked; whether the extractor supports the site is
/// left to the extractor.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] for anything else.
pub fn validate_url(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if URL_RE.is_match(trimmed) {
        Ok(trimmed.to_string())
    } else {
        Err(Error::InvalidUrl(input.to_string()))
    }
}

/// Returns true if `url` points at a collection rather than a single item.
///
/// A `list=` query parameter or a `/playlist` path both count.
#[must_use]
pub fn is_collection_url(url: &str) -> bool {
    COLLECTION_RE.is_match(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_watch_url() {
        assert_eq!(
            validate_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap(),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
    }

    #[test]
    fn accepts_short_and_http_urls() {
        assert!(validate_url("https://youtu.be/dQw4w9WgXcQ").is_ok());
        assert!(validate_url("http://example.com").is_ok());
        assert!(validate_url("HTTPS://Example.COM:8080/path").is_ok());
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(
            validate_url("  https://youtu.be/x\n").unwrap(),
            "https://youtu.be/x"
        );
    }

    #[test]
    fn rejects_non_urls() {
        for input in [
            "",
            "dQw4w9WgXcQ",
            "ftp://example.com/file",
            "https://",
            "https:// example.com",
            "youtube.com/watch?v=x",
            "--exec=rm",
        ] {
            assert!(
                matches!(validate_url(input), Err(Error::InvalidUrl(_))),
                "accepted {input:?}"
            );
        }
    }

    #[test]
    fn detects_collections() {
        assert!(is_collection_url(
            "https://www.youtube.com/playlist?list=PLrAXtmErZgOeiKm4sgNOknGvNjby9efdf"
        ));
        assert!(is_collection_url(
            "https://www.youtube.com/watch?v=abc&list=PL123"
        ));
        assert!(is_collection_url("https://music.example.com/playlist"));
    }

    #[test]
    fn single_items_are_not_collections() {
        assert!(!is_collection_url("https://www.youtube.com/watch?v=abc"));
        assert!(!is_collection_url("https://youtu.be/abc"));
        assert!(!is_collection_url("https://example.com/playlists-are-fun"));
        assert!(!is_collection_url("https://example.com/watch?v=a&list="));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn validate_never_panics(s in "\\PC*") {
                let _ = validate_url(&s);
            }

            #[test]
            fn valid_urls_contain_no_whitespace(s in "\\PC*") {
                if let Ok(url) = validate_url(&s) {
                    prop_assert!(!url.chars().any(char::is_whitespace));
                }
            }
        }
    }
}
