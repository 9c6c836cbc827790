//! Public Land Survey System references: `T8N R70W Section 15`.
//!
//! The lookup service only returns a point when a section is present, and
//! models often report just township and range. [`normalize`] appends the
//! configured default section in that case; [`TownshipRange::parse`]
//! decides whether a string carries enough tokens to be worth a lookup.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_TOWNSHIP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bT\.?\s*(\d{1,3})\s*([NS])\b").unwrap());
static RE_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bR\.?\s*(\d{1,3})\s*([EW])\b").unwrap());
static RE_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bsec(?:tions?|s?\.)?\s*(\d{1,2})\b").unwrap());
static RE_SECTION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bsec(?:tion|\.|\s*\d)").unwrap());

/// Append `default_section` when `raw` has no section marker.
///
/// A string that already names a section is returned trimmed but otherwise
/// unchanged.
pub fn normalize(raw: &str, default_section: &str) -> String {
    let trimmed = raw.trim();
    if has_section_marker(trimmed) {
        trimmed.to_string()
    } else {
        format!("{} {}", trimmed, default_section.trim())
    }
}

/// True when the string names a section: "Section", "Sections", "Section4",
/// "Sec. 4", "Sec4". A bare "Sec" prefix such as "Secret" does not count.
pub fn has_section_marker(s: &str) -> bool {
    RE_SECTION_MARKER.is_match(s)
}

/// Structured form of a township-range string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TownshipRange {
    pub township: u16,
    /// `'N'` or `'S'`.
    pub township_dir: char,
    pub range: u16,
    /// `'E'` or `'W'`.
    pub range_dir: char,
    pub section: Option<u8>,
}

impl TownshipRange {
    /// Extract township, range and (optional) section tokens.
    ///
    /// Returns `None` unless both township and range tokens are present.
    pub fn parse(s: &str) -> Option<Self> {
        let t = RE_TOWNSHIP.captures(s)?;
        let r = RE_RANGE.captures(s)?;
        let section = RE_SECTION
            .captures(s)
            .and_then(|c| c[1].parse::<u8>().ok())
            .filter(|n| (1..=36).contains(n));

        Some(Self {
            township: t[1].parse().ok()?,
            township_dir: t[2].chars().next()?.to_ascii_uppercase(),
            range: r[1].parse().ok()?,
            range_dir: r[2].chars().next()?.to_ascii_uppercase(),
            section,
        })
    }

    /// Township, range and a valid section (1–36) are all present.
    pub fn is_resolvable(s: &str) -> bool {
        Self::parse(s).is_some_and(|tr| tr.section.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_default_section_when_missing() {
        assert_eq!(normalize("T8N R70W", "Section 15"), "T8N R70W Section 15");
        assert_eq!(normalize("  T8N R70W ", "Section 15"), "T8N R70W Section 15");
    }

    #[test]
    fn passes_through_strings_with_section() {
        assert_eq!(normalize("T1N R1E Section 1", "Section 15"), "T1N R1E Section 1");
        assert_eq!(normalize("T2S R3W Sec. 4", "Section 15"), "T2S R3W Sec. 4");
        assert_eq!(normalize("T2S R3W sec 4", "Section 15"), "T2S R3W sec 4");
        assert_eq!(normalize("T8N R70W Sections 3", "Section 15"), "T8N R70W Sections 3");
        assert_eq!(normalize("T8N R70W Sections 3-4", "Section 15"), "T8N R70W Sections 3-4");
        assert_eq!(normalize("T8N R70W Section4", "Section 15"), "T8N R70W Section4");
        assert_eq!(normalize("T8N R70W Sec4", "Section 15"), "T8N R70W Sec4");
    }

    #[test]
    fn sec_prefix_of_a_word_is_not_a_marker() {
        assert!(!has_section_marker("Secret Creek"));
        assert!(!has_section_marker("Second Lake"));
        assert_eq!(normalize("T8N R70W Secret Creek", "Section 15"), "T8N R70W Secret Creek Section 15");
    }

    #[test]
    fn named_section_is_kept_for_lookup() {
        for (s, section) in [
            ("T8N R70W Sections 3", 3),
            ("T8N R70W Sections 3-4", 3),
            ("T8N R70W Section4", 4),
            ("T8N R70W Sec4", 4),
        ] {
            let tr = TownshipRange::parse(&normalize(s, "Section 15")).unwrap();
            assert_eq!(tr.section, Some(section), "{s}");
        }
    }

    #[test]
    fn parses_tokens() {
        let tr = TownshipRange::parse("t8n r70w Section 15").unwrap();
        assert_eq!(
            tr,
            TownshipRange {
                township: 8,
                township_dir: 'N',
                range: 70,
                range_dir: 'W',
                section: Some(15),
            }
        );
        assert!(TownshipRange::parse("T8N").is_none());
        assert!(TownshipRange::parse("R70W Section 3").is_none());
    }

    #[test]
    fn resolvable_requires_all_three_tokens() {
        assert!(TownshipRange::is_resolvable("T8N R70W Section 15"));
        assert!(!TownshipRange::is_resolvable("T8N R70W"));
        assert!(!TownshipRange::is_resolvable("T8N R70W Section 40"));
        assert!(TownshipRange::is_resolvable(&normalize("T8N R70W", "Section 15")));
        assert!(!TownshipRange::is_resolvable(&normalize("Horsetooth", "Section 15")));
    }
}
