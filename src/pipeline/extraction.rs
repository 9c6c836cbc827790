//! The structured result the vision model is asked to return, and the
//! strict parser that turns its text reply into it.
//!
//! ## Cleanup
//!
//! Models occasionally wrap the JSON in a ` ```json ... ``` ` fence or
//! prepend a byte-order mark. Those are stripped first. Prose around the
//! object, missing keys or wrong types fail the invocation.

use crate::error::GeoRefError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parsed model output.
///
/// All four top-level keys are required; a reply missing one does not
/// conform to the prompt's contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelExtraction {
    pub map_description: String,
    pub township_range: Vec<String>,
    pub county: String,
    pub water_resources: Vec<WaterResource>,
}

/// A water feature reported by the model.
///
/// Individual fields may be omitted by the model; they default to empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaterResource {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub feature_type: String,
    #[serde(default)]
    pub township_range: String,
}

impl WaterResource {
    /// `"<name> (<type>)"`, the form used in metadata text.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name.trim(), self.feature_type.trim())
    }
}

/// Parse the model's text reply into a [`ModelExtraction`].
pub fn parse_extraction(raw: &str) -> Result<ModelExtraction, GeoRefError> {
    let cleaned = clean_response(raw);
    let extraction: ModelExtraction =
        serde_json::from_str(&cleaned).map_err(|e| GeoRefError::MalformedExtraction {
            detail: e.to_string(),
            preview: cleaned.chars().take(80).collect(),
        })?;
    debug!(
        "Parsed extraction: {} township ranges, {} water resources, county {:?}",
        extraction.township_range.len(),
        extraction.water_resources.len(),
        extraction.county
    );
    Ok(extraction)
}

/// Apply the cleanup rules in order: invisible characters, surrounding
/// whitespace, then an outer code fence.
fn clean_response(input: &str) -> String {
    let s = remove_invisible_chars(input);
    strip_code_fence(s.trim())
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*)\n```\s*$").unwrap());

fn strip_code_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input) {
        Some(caps) => caps[1].trim().to_string(),
        None => input.to_string(),
    }
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{200C}', '\u{200D}', '\u{2060}'], "")
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r#"{
      "map_description": "Irrigation map of the Cache la Poudre valley",
      "township_range": ["T8N R70W", "T7N R69W Section 3"],
      "county": "Larimer County (Colo.)",
      "water_resources": [
        {"name": "Horsetooth Reservoir", "description": "storage", "feature_type": "reservoir", "township_range": "T7N R70W"},
        {"name": "Dry Creek", "feature_type": "creek"}
      ]
    }"#;

    #[test]
    fn parses_plain_json() {
        let ex = parse_extraction(REPLY).unwrap();
        assert_eq!(ex.township_range, vec!["T8N R70W", "T7N R69W Section 3"]);
        assert_eq!(ex.water_resources.len(), 2);
        assert_eq!(ex.water_resources[1].township_range, "");
        assert_eq!(ex.water_resources[0].label(), "Horsetooth Reservoir (reservoir)");
    }

    #[test]
    fn strips_json_fence_and_bom() {
        let fenced = format!("\u{FEFF}```json\n{REPLY}\n```\n");
        assert_eq!(parse_extraction(&fenced).unwrap(), parse_extraction(REPLY).unwrap());
    }

    #[test]
    fn prose_is_a_hard_failure() {
        let err = parse_extraction(&format!("Here is the JSON you asked for:\n{REPLY}")).unwrap_err();
        match err {
            GeoRefError::MalformedExtraction { preview, .. } => {
                assert!(preview.starts_with("Here is"))
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_top_level_key_is_a_hard_failure() {
        let reply = r#"{"map_description": "x", "township_range": [], "county": "y"}"#;
        assert!(parse_extraction(reply).is_err());
    }

    #[test]
    fn wrong_type_is_a_hard_failure() {
        let reply = r#"{"map_description": "x", "township_range": "T8N R70W", "county": "y", "water_resources": []}"#;
        assert!(parse_extraction(reply).is_err());
    }
}
