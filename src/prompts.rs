//! Instruction prompt for the map-analysis model call.
//!
//! The JSON contract it describes mirrors
//! [`crate::pipeline::extraction::ModelExtraction`].
//!
//! Callers can override the default via [`crate::config::PipelineConfig::prompt`];
//! the constant is used only when no override is provided.

/// Default instruction sent alongside the compressed map image.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"Analyze the uploaded map image thoroughly to identify all relevant details. Then, return a strictly formatted JSON object with the **exact** structure and keys below (and nothing else):

{
  "map_description": "string",
  "township_range": [
    // An array of valid township-range strings. A township-range string is considered valid only if it contains:
    //   1. A Township value in the format "T<number>N" or "T<number>S"
    //   2. A Range value in the format "R<number>E" or "R<number>W"
    //   3. Ideally, a Section value formatted as "Section <number>"
    // For example: "T1N R1E Section 1" or "T2S R3W Section 15".
    // If you cannot find any complete township-range information, return an empty array.
  ],
  "county": "string",
    // If multiple counties apply, join them into one string separated by a semicolon and a space (e.g., "Teller County (Colo.); El Paso County (Colo.)").
  "water_resources": [
    // An array with as many water resources as you can identify from the map.
    // For each water resource, include the following keys:
    {
      "name": "string",
      "description": "string",
      "feature_type": "reservoir, dam, river, lake, creek, etc.",
      "township_range": "string"
        // If you can identify a valid township-range (i.e. including both T and R values, and a Section number), put it here.
        // Otherwise, leave this field as an empty string "".
    },
    ...
  ]
}

Instructions and notes:
1. **map_description**: Provide a comprehensive description of the map, including its features, landmarks, and any notable context.
2. **township_range**: Only include strings that contain both a valid Township and Range value (e.g., "T8N R70W") along with a Section number (e.g., "Section 15"). Do not include partial entries like "T8N" alone.
3. **county**: Clearly specify the county (or counties) where the map is located. If more than one county is relevant, separate them using a semicolon and a space.
4. **water_resources**:
   - Identify every water resource visible on the map.
   - For each, include "name", "description", and "feature_type".
   - If the water resource has a visible township-range that is complete (including T, R), include it in the "township_range" field; if not, use an empty string.
5. Return **only** valid JSON without any extra commentary, explanations, or text outside of the JSON object.
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_every_top_level_key() {
        for key in ["map_description", "township_range", "county", "water_resources"] {
            assert!(
                DEFAULT_EXTRACTION_PROMPT.contains(&format!("\"{key}\"")),
                "prompt is missing key {key}"
            );
        }
    }

    #[test]
    fn prompt_names_every_water_resource_key() {
        for key in ["name", "description", "feature_type"] {
            assert!(DEFAULT_EXTRACTION_PROMPT.contains(&format!("\"{key}\"")));
        }
    }
}
