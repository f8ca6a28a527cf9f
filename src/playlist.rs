//! Collection listings and item selection.
//!
//! A [`Playlist`] is built once from the extractor's flat listing (one JSON
//! record per line) and is read-only afterwards. [`Selection`] picks the
//! entries to download while preserving the listing order.

use serde_json::Value;

use crate::error::{Error, Result};

/// One item in a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub id: String,
    pub title: String,
    pub url: String,
    /// Duration in seconds, when the listing reports it.
    pub duration: Option<u64>,
}

/// A collection and its entries in natural order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Playlist {
    pub title: String,
    /// Owner or author label.
    pub owner: Option<String>,
    pub entries: Vec<PlaylistEntry>,
}

fn str_field<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| record.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn duration_field(record: &Value) -> Option<u64> {
    record
        .get("duration")
        .and_then(Value::as_f64)
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(|d| d.round() as u64)
}

fn entry_from_record(record: &Value) -> Option<PlaylistEntry> {
    let id = str_field(record, &["id"])?.to_string();
    let url = str_field(record, &["webpage_url", "url"])
        .map_or_else(|| format!("https://www.youtube.com/watch?v={id}"), str::to_string);
    let title = str_field(record, &["title"]).unwrap_or(&id).to_string();
    Some(PlaylistEntry {
        duration: duration_field(record),
        id,
        title,
        url,
    })
}

impl Playlist {
    /// Parses a flat listing.
    ///
    /// Records of `_type: "playlist"` supply the title and owner (and their
    /// `entries`, if embedded); every other record with an `id` becomes an
    /// entry. Entries also carry `playlist_title`/`playlist_uploader`, used
    /// when no collection-level record is present. Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Metadata`] if a non-blank line is not a JSON object.
    pub fn from_flat_listing(text: &str) -> Result<Self> {
        let mut playlist = Self::default();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: Value = serde_json::from_str(line).map_err(|e| {
                Error::Metadata(format!("line {}: {e}", lineno + 1))
            })?;
            if !record.is_object() {
                return Err(Error::Metadata(format!(
                    "line {}: expected a JSON object",
                    lineno + 1
                )));
            }
            playlist.fold(&record);
        }
        if playlist.title.is_empty() {
            playlist.title = "playlist".to_string();
        }
        Ok(playlist)
    }

    fn fold(&mut self, record: &Value) {
        let is_collection = record.get("_type").and_then(Value::as_str) == Some("playlist");
        if is_collection {
            if let Some(title) = str_field(record, &["title"]) {
                self.title = title.to_string();
            }
            if let Some(owner) = str_field(record, &["uploader", "channel"]) {
                self.owner = Some(owner.to_string());
            }
            if let Some(entries) = record.get("entries").and_then(Value::as_array) {
                self.entries.extend(entries.iter().filter_map(entry_from_record));
            }
            return;
        }

        if self.title.is_empty()
            && let Some(title) = str_field(record, &["playlist_title", "playlist"])
        {
            self.title = title.to_string();
        }
        if self.owner.is_none() {
            self.owner = str_field(record, &["playlist_uploader", "playlist_channel"])
                .map(str::to_string);
        }
        if let Some(entry) = entry_from_record(record) {
            self.entries.push(entry);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the selected entries in listing order.
    #[must_use]
    pub fn select(&self, selection: &Selection) -> Vec<&PlaylistEntry> {
        selection
            .resolve(self.entries.len())
            .into_iter()
            .filter_map(|i| self.entries.get(i))
            .collect()
    }
}

/// Which entries of a playlist to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every entry.
    All,
    /// Zero-based indices picked in a multi-select. Returned in listing
    /// order with duplicates removed.
    Picked(Vec<usize>),
    /// `A-B` range or comma-separated 1-based positions.
    Range(String),
}

impl Selection {
    /// Resolves to zero-based indices into a sequence of length `len`.
    #[must_use]
    pub fn resolve(&self, len: usize) -> Vec<usize> {
        match self {
            Self::All => (0..len).collect(),
            Self::Picked(indices) => {
                let mut picked: Vec<_> = indices.iter().copied().filter(|&i| i < len).collect();
                picked.sort_unstable();
                picked.dedup();
                picked
            }
            Self::Range(spec) => parse_range(spec, len),
        }
    }
}

/// Parses a range expression into zero-based indices.
///
/// * `A-B`: positions `A` through `B` inclusive, 1-based. `B` is clamped to
///   `len`; `A < 1`, `A > len` or `B < A` gives nothing.
/// * `a,b,c`: each 1-based position on its own; positions outside
///   `1..=len` and tokens that are not numbers are dropped.
#[must_use]
pub fn parse_range(spec: &str, len: usize) -> Vec<usize> {
    let spec = spec.trim();
    if let Some((start, end)) = spec.split_once('-') {
        let (Ok(start), Ok(end)) = (start.trim().parse::<usize>(), end.trim().parse::<usize>())
        else {
            return Vec::new();
        };
        if start < 1 || start > len {
            return Vec::new();
        }
        let end = end.min(len);
        return (start - 1..end).collect();
    }

    spec.split(',')
        .filter_map(|token| token.trim().parse::<usize>().ok())
        .filter(|&pos| (1..=len).contains(&pos))
        .map(|pos| pos - 1)
        .collect()
}

/// Metadata for a single item.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub id: String,
    pub title: String,
    pub uploader: Option<String>,
    pub duration: Option<u64>,
}

impl MediaInfo {
    /// Parses the first record of a single-item metadata dump.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the first line is not JSON and
    /// [`Error::Metadata`] if there is no record with an `id`.
    pub fn from_dump(text: &str) -> Result<Self> {
        let line = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| Error::Metadata("extractor printed no metadata".to_string()))?;
        let record: Value = serde_json::from_str(line)?;
        let id = str_field(&record, &["id"])
            .ok_or_else(|| Error::Metadata("metadata record has no id".to_string()))?
            .to_string();
        Ok(Self {
            title: str_field(&record, &["title"]).unwrap_or(&id).to_string(),
            uploader: str_field(&record, &["uploader", "channel"]).map(str::to_string),
            duration: duration_field(&record),
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
{"_type": "url", "id": "aaa", "title": "First", "url": "https://www.youtube.com/watch?v=aaa", "duration": 61.4, "playlist_title": "Mix", "playlist_uploader": "Someone"}
{"_type": "url", "id": "bbb", "title": "Second", "duration": null}

{"_type": "url", "title": "no id, skipped"}
{"_type": "url", "id": "ccc"}
"#;

    fn numbered(n: usize) -> Playlist {
        Playlist {
            title: "p".into(),
            owner: None,
            entries: (1..=n)
                .map(|i| PlaylistEntry {
                    id: i.to_string(),
                    title: format!("Track {i}"),
                    url: format!("https://example.com/{i}"),
                    duration: None,
                })
                .collect(),
        }
    }

    fn ids(entries: &[&PlaylistEntry]) -> Vec<String> {
        entries.iter().map(|e| e.id.clone()).collect()
    }

    #[test]
    fn parses_flat_listing_in_order() {
        let playlist = Playlist::from_flat_listing(LISTING).unwrap();
        assert_eq!(playlist.title, "Mix");
        assert_eq!(playlist.owner.as_deref(), Some("Someone"));
        assert_eq!(playlist.len(), 3);
        assert_eq!(playlist.entries[0].duration, Some(61));
        assert_eq!(playlist.entries[1].url, "https://www.youtube.com/watch?v=bbb");
        assert_eq!(playlist.entries[1].duration, None);
        assert_eq!(playlist.entries[2].title, "ccc");
    }

    #[test]
    fn collection_record_supplies_metadata_and_entries() {
        let text = r#"{"_type": "playlist", "title": "Album", "uploader": "Band", "entries": [{"id": "x1", "title": "One"}, {"id": "x2"}]}"#;
        let playlist = Playlist::from_flat_listing(text).unwrap();
        assert_eq!(playlist.title, "Album");
        assert_eq!(playlist.owner.as_deref(), Some("Band"));
        assert_eq!(playlist.entries.len(), 2);
    }

    #[test]
    fn invalid_json_is_metadata_error() {
        let err = Playlist::from_flat_listing("{\"id\": \"a\"}\nnot json\n").unwrap_err();
        assert!(matches!(err, Error::Metadata(msg) if msg.starts_with("line 2")));
    }

    #[test]
    fn empty_listing_is_empty_playlist() {
        let playlist = Playlist::from_flat_listing("\n\n").unwrap();
        assert!(playlist.is_empty());
        assert_eq!(playlist.title, "playlist");
    }

    #[test]
    fn range_selects_inclusive_slice() {
        let playlist = numbered(10);
        let picked = playlist.select(&Selection::Range("2-4".into()));
        assert_eq!(ids(&picked), vec!["2", "3", "4"]);
    }

    #[test]
    fn position_list_drops_out_of_range() {
        let playlist = numbered(10);
        let picked = playlist.select(&Selection::Range("1,3,50".into()));
        assert_eq!(ids(&picked), vec!["1", "3"]);
    }

    #[test]
    fn range_end_is_clamped() {
        assert_eq!(parse_range("8-20", 10), vec![7, 8, 9]);
    }

    #[test]
    fn range_with_bad_start_is_empty() {
        assert!(parse_range("0-3", 10).is_empty());
        assert!(parse_range("11-12", 10).is_empty());
        assert!(parse_range("5-2", 10).is_empty());
        assert!(parse_range("a-3", 10).is_empty());
    }

    #[test]
    fn single_position_and_whitespace() {
        assert_eq!(parse_range(" 3 ", 5), vec![2]);
        assert_eq!(parse_range("1, 2 ,x, 5", 5), vec![0, 1, 4]);
        assert!(parse_range("", 5).is_empty());
    }

    #[test]
    fn all_and_picked_preserve_listing_order() {
        let playlist = numbered(5);
        assert_eq!(playlist.select(&Selection::All).len(), 5);
        let picked = playlist.select(&Selection::Picked(vec![4, 0, 4, 9]));
        assert_eq!(ids(&picked), vec!["1", "5"]);
    }

    #[test]
    fn media_info_from_dump() {
        let info = MediaInfo::from_dump(
            "{\"id\": \"dQw\", \"title\": \"Song\", \"uploader\": \"Artist\", \"duration\": 212}\n",
        )
        .unwrap();
        assert_eq!(info.id, "dQw");
        assert_eq!(info.title, "Song");
        assert_eq!(info.uploader.as_deref(), Some("Artist"));
        assert_eq!(info.duration, Some(212));
    }

    #[test]
    fn media_info_requires_output() {
        assert!(matches!(MediaInfo::from_dump(""), Err(Error::Metadata(_))));
        assert!(matches!(MediaInfo::from_dump("{}"), Err(Error::Metadata(_))));
        assert!(matches!(MediaInfo::from_dump("not json"), Err(Error::Json(_))));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_range_stays_in_bounds(spec in "[0-9,\\- ]{0,20}", len in 0usize..50) {
                for i in parse_range(&spec, len) {
                    prop_assert!(i < len);
                }
            }

            #[test]
            fn valid_range_has_expected_length(start in 1usize..20, span in 0usize..20, len in 1usize..40) {
                let end = start + span;
                let got = parse_range(&format!("{start}-{end}"), len);
                let expected = if start > len { 0 } else { end.min(len) - start + 1 };
                prop_assert_eq!(got.len(), expected);
            }
        }
    }
}
