//! Structured per-invocation results.

use crate::job::Stage;
use serde::{Deserialize, Serialize};

/// What happened to one object.
///
/// Failures are reported, never raised: the handler has already written the
/// error record by the time it returns [`InvocationStatus::Failed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationStatus {
    /// Not a target for this stage; no output and no error record.
    Skipped { key: String, reason: String },

    /// The Compressor wrote a PNG.
    Compressed {
        key: String,
        output_key: String,
        location: String,
        width: u32,
        height: u32,
        size_bytes: u64,
        within_target: bool,
    },

    /// The Extractor published a feature collection and appended a row.
    Published {
        key: String,
        document_url: String,
        table_location: String,
        point_features: usize,
        has_boundary: bool,
    },

    Failed {
        key: String,
        stage: Stage,
        error: String,
        /// Key of the error record, if it could be written.
        error_record: Option<String>,
    },
}

impl InvocationStatus {
    pub fn skipped(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Skipped {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Skipped { key, .. }
            | Self::Compressed { key, .. }
            | Self::Published { key, .. }
            | Self::Failed { key, .. } => key,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// HTTP-style code for hosts that report one: 500 for failures, 200
    /// otherwise.
    pub fn status_code(&self) -> u16 {
        if self.is_failure() {
            500
        } else {
            200
        }
    }

    /// JSON body for the host's response.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"status":"failed","error":"status serialisation: {e}"}}"#)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_embeds_message_and_code() {
        let status = InvocationStatus::Failed {
            key: "compressed/m.png".into(),
            stage: Stage::Extract,
            error: "Error processing image 'compressed/m.png': boom".into(),
            error_record: Some("error/m.txt".into()),
        };
        assert_eq!(status.status_code(), 500);
        let value: serde_json::Value = serde_json::from_str(&status.to_json()).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["stage"], "Extract");
        assert!(value["error"].as_str().unwrap().contains("boom"));
    }

    #[test]
    fn success_references_published_location() {
        let status = InvocationStatus::Published {
            key: "compressed/m.png".into(),
            document_url: "https://github.com/o/r/blob/main/m.geojson".into(),
            table_location: "analysis/rows/x.json".into(),
            point_features: 0,
            has_boundary: true,
        };
        assert_eq!(status.status_code(), 200);
        assert_eq!(status.key(), "compressed/m.png");
        assert!(status.to_json().contains("\"document_url\""));
        assert_eq!(InvocationStatus::skipped("a", "b").status_code(), 200);
    }
}
