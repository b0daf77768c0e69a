use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;

use crate::channels::ChannelRecord;

/// Keywords that mark a group as regional (Turkish) content.
pub const REGIONAL_KEYWORDS: &[&str] = &[
    "TR", "TURK", "TÜRK", "TURKIYE", "TÜRKİYE", "YERLI", "ULUSAL", "ISTANBUL",
];

/// Characters allowed right before a keyword, besides a word boundary.
pub const LEADING_DELIMITERS: &[char] = &['_', '[', '(', '|'];

/// Characters allowed right after a keyword, besides a word boundary.
pub const TRAILING_DELIMITERS: &[char] = &['_', ']', ')', '|', ':'];

lazy_static! {
    static ref DEFAULT_FILTER: RegionFilter = RegionFilter::new(REGIONAL_KEYWORDS).unwrap();
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_restrict_by_default")]
    pub restrict_by_default: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            restrict_by_default: default_restrict_by_default(),
        }
    }
}

fn default_keywords() -> Vec<String> {
    REGIONAL_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

fn default_restrict_by_default() -> bool {
    true
}

/// Matches a channel group against a keyword list, requiring each keyword
/// to stand as a whole token (`TR|HD`, `[TR]`, `TURK_GENEL`, `ULUSAL:HABER`)
/// rather than a fragment of a longer word (`EXTRA`, `ASTRAL`).
#[derive(Debug, Clone)]
pub struct RegionFilter {
    pattern: Regex,
}

impl RegionFilter {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Result<Self> {
        if keywords.is_empty() {
            return Err(anyhow!("region filter needs at least one keyword"));
        }
        let pattern = Regex::new(&build_pattern(keywords))?;
        Ok(Self { pattern })
    }

    pub fn is_regional(&self, group: &str) -> bool {
        self.pattern.is_match(group)
    }

    pub fn matches(&self, record: &ChannelRecord) -> bool {
        self.is_regional(&record.group)
    }

    /// Returns the records to keep, in their original order. Without
    /// `restrict` every record is kept.
    pub fn apply(&self, records: &[ChannelRecord], restrict: bool) -> Vec<ChannelRecord> {
        if !restrict {
            return records.to_vec();
        }
        records
            .iter()
            .filter(|record| self.matches(record))
            .cloned()
            .collect()
    }
}

impl Default for RegionFilter {
    fn default() -> Self {
        DEFAULT_FILTER.clone()
    }
}

fn delimiter_alternatives(delimiters: &[char]) -> String {
    let mut out = String::from(r"\b");
    for c in delimiters {
        out.push('|');
        out.push_str(&regex::escape(&c.to_string()));
    }
    out
}

/// Turkish `I` forms. Unicode simple case folding leaves `İ` and `ı` alone,
/// so `(?i)` alone would not match `İstanbul` against `ISTANBUL`.
const TURKISH_I: &[char] = &['I', 'İ', 'ı', 'i'];

fn keyword_pattern(keyword: &str) -> String {
    let mut out = String::new();
    for c in keyword.chars() {
        if TURKISH_I.contains(&c) {
            out.push_str("[Iİıi]");
        } else {
            out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4])));
        }
    }
    out
}

fn build_pattern<S: AsRef<str>>(keywords: &[S]) -> String {
    let keywords = keywords
        .iter()
        .map(|k| keyword_pattern(k.as_ref()))
        .collect::<Vec<_>>()
        .join("|");
    format!(
        "(?i)(?:{})(?:{})(?:{})",
        delimiter_alternatives(LEADING_DELIMITERS),
        keywords,
        delimiter_alternatives(TRAILING_DELIMITERS),
    )
}

/// Filters with the built-in keyword table.
pub fn filter_channels(records: &[ChannelRecord], restrict: bool) -> Vec<ChannelRecord> {
    DEFAULT_FILTER.apply(records, restrict)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(group: &str) -> ChannelRecord {
        ChannelRecord::new(group, "Kanal", "http://x/1")
    }

    #[test]
    fn test_token_bounded_matches() {
        let filter = RegionFilter::default();
        for group in [
            "TR|HD",
            "[TR] Ulusal",
            "TURK_GENEL",
            "ULUSAL:HABER",
            "GENEL_TR",
            "(TÜRKİYE)",
            "türk|hd",
            "TÜRKİYE",
            "tr",
            "Istanbul Yerel",
            "4K TR",
        ] {
            assert!(filter.is_regional(group), "expected match for {group}");
        }
    }

    #[test]
    fn test_turkish_dotted_and_dotless_i() {
        let filter = RegionFilter::default();
        for group in [
            "Türkiye",
            "TÜRKIYE",
            "İstanbul",
            "YERLİ",
            "türkiye|HD",
            "yerlı",
        ] {
            assert!(filter.is_regional(group), "expected match for {group}");
        }
        assert!(!filter.is_regional("İSTANBULLU"));
    }

    #[test]
    fn test_embedded_keywords_do_not_match() {
        let filter = RegionFilter::default();
        for group in ["EXTRA", "ASTRAL", "TRT 1", "Haber", "Genel", "TURKEY", ""] {
            assert!(!filter.is_regional(group), "unexpected match for {group}");
        }
    }

    #[test]
    fn test_only_group_is_examined() {
        let mut channel = ChannelRecord::new("Sports", "TR Spor", "http://tr/istanbul");
        assert!(filter_channels(&[channel.clone()], true).is_empty());
        channel.group = "TR|Spor".to_string();
        assert_eq!(filter_channels(&[channel], true).len(), 1);
    }

    #[test]
    fn test_unrestricted_is_identity() {
        let records = vec![record("EXTRA"), record("TR"), record("Genel")];
        assert_eq!(filter_channels(&records, false), records);
    }

    #[test]
    fn test_restricted_preserves_order() {
        let records = vec![
            record("TR|B"),
            record("EXTRA"),
            record("[TR] A"),
            record("ASTRAL"),
            record("ULUSAL:C"),
        ];
        let groups: Vec<_> = filter_channels(&records, true)
            .into_iter()
            .map(|r| r.group)
            .collect();
        assert_eq!(groups, vec!["TR|B", "[TR] A", "ULUSAL:C"]);
    }

    #[test]
    fn test_custom_keywords() {
        let filter = RegionFilter::new(&["DE", "DEUTSCH"]).unwrap();
        assert!(filter.is_regional("DE|HD"));
        assert!(filter.is_regional("[deutsch]"));
        assert!(!filter.is_regional("TR|HD"));
        assert!(!filter.is_regional("INDEX"));
    }

    #[test]
    fn test_keywords_are_escaped() {
        let filter = RegionFilter::new(&["A+B"]).unwrap();
        assert!(filter.is_regional("[A+B]"));
        assert!(!filter.is_regional("AAB"));
    }

    #[test]
    fn test_empty_keyword_list_is_rejected() {
        let empty: [&str; 0] = [];
        assert!(RegionFilter::new(&empty).is_err());
    }
}
