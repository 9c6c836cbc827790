//! Trigger events, stage routing and the per-object job state machine.
//!
//! An uploaded object moves through
//!
//! ```text
//! Received ──▶ Converted ──▶ ModelInvoked ──▶ Parsed ──▶ Resolved ──▶ Published
//!     │            (compressor)                 (extractor)
//!     ├──▶ Skipped
//!     └──▶ (any non-terminal state) ──▶ Failed
//! ```
//!
//! The Extractor may start directly from `Received` when it is triggered by
//! a compressed object written by another process. Which stage an event
//! belongs to is decided by [`Stage::route`] from the configured
//! [`Namespaces`]; nothing else in the crate inspects key prefixes.

use crate::config::Namespaces;
use crate::error::GeoRefError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One created object, as delivered by the trigger mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEvent {
    /// Source bucket or container, when the trigger reports one.
    pub bucket: Option<String>,
    /// Object key, URL-decoded.
    pub key: String,
}

impl ObjectEvent {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            bucket: None,
            key: key.into(),
        }
    }

    /// Parse an S3-style notification document into one event per record.
    ///
    /// Keys in notifications are form-encoded (`+` for space, `%XX` escapes).
    pub fn from_notification(json: &str) -> Result<Vec<ObjectEvent>, GeoRefError> {
        let notification: Notification =
            serde_json::from_str(json).map_err(|e| GeoRefError::InvalidEvent {
                detail: e.to_string(),
            })?;

        notification
            .records
            .into_iter()
            .map(|record| {
                let raw_key = record.s3.object.key.replace('+', " ");
                let key = urlencoding::decode(&raw_key)
                    .map_err(|e| GeoRefError::InvalidEvent {
                        detail: format!("key '{}' is not valid UTF-8 once decoded: {e}", raw_key),
                    })?
                    .into_owned();
                Ok(ObjectEvent {
                    bucket: Some(record.s3.bucket.name),
                    key,
                })
            })
            .collect()
    }

    /// Last path segment of the key.
    pub fn file_name(&self) -> Result<&str, GeoRefError> {
        match self.key.rsplit('/').next() {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(GeoRefError::InvalidKey {
                key: self.key.clone(),
            }),
        }
    }

    /// File name with its extension removed (`raw/map 12.tif` → `map 12`).
    pub fn base_name(&self) -> Result<&str, GeoRefError> {
        Ok(Self::strip_extension(self.file_name()?))
    }

    /// `name` without its last extension; dot-files are returned unchanged.
    pub fn strip_extension(name: &str) -> &str {
        match name.rfind('.') {
            Some(0) | None => name,
            Some(dot) => &name[..dot],
        }
    }

    /// Lower-cased extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.key.rsplit('/').next()?;
        match name.rfind('.') {
            Some(dot) if dot > 0 => Some(name[dot + 1..].to_ascii_lowercase()),
            _ => None,
        }
    }

    /// True for `.tif` / `.tiff`, case-insensitively.
    pub fn is_tiff(&self) -> bool {
        matches!(self.extension().as_deref(), Some("tif" | "tiff"))
    }
}

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "Records", default)]
    records: Vec<NotificationRecord>,
}

#[derive(Debug, Deserialize)]
struct NotificationRecord {
    s3: NotificationEntity,
}

#[derive(Debug, Deserialize)]
struct NotificationEntity {
    bucket: NotificationBucket,
    object: NotificationObject,
}

#[derive(Debug, Deserialize)]
struct NotificationBucket {
    name: String,
}

#[derive(Debug, Deserialize)]
struct NotificationObject {
    key: String,
}

/// The two processing stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Compress,
    Extract,
}

impl Stage {
    /// Decide which stage handles an object, if any.
    ///
    /// Objects under the compressed namespace with a `.png` extension go to
    /// the Extractor; anything under the raw namespace goes to the
    /// Compressor (which then skips non-TIFF files itself).
    pub fn route(event: &ObjectEvent, namespaces: &Namespaces) -> Option<Stage> {
        let stage = if Namespaces::contains(&namespaces.compressed, &event.key) {
            (event.extension().as_deref() == Some("png")).then_some(Stage::Extract)
        } else if Namespaces::contains(&namespaces.raw, &event.key) {
            Some(Stage::Compress)
        } else {
            None
        };
        debug!("Routed '{}' → {:?}", event.key, stage);
        stage
    }
}

/// Where an object is in its life-cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Received,
    Skipped,
    Converted,
    ModelInvoked,
    Parsed,
    Resolved,
    Published,
    Failed,
}

impl JobState {
    /// No further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Skipped | JobState::Published | JobState::Failed)
    }

    /// The typed transition function.
    pub fn can_transition(self, to: JobState) -> bool {
        use JobState::*;
        match (self, to) {
            (from, Failed) => !from.is_terminal(),
            (Received, Skipped | Converted | ModelInvoked) => true,
            (Converted, ModelInvoked) => true,
            (ModelInvoked, Parsed) => true,
            (Parsed, Resolved) => true,
            (Resolved, Published) => true,
            _ => false,
        }
    }
}

/// A single object being processed, with its state history.
#[derive(Debug, Clone)]
pub struct Job {
    key: String,
    state: JobState,
    history: Vec<JobState>,
}

impl Job {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            state: JobState::Received,
            history: vec![JobState::Received],
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Every state visited so far, starting with `Received`.
    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    /// Move to `to`, rejecting transitions the state machine does not allow.
    pub fn advance(&mut self, to: JobState) -> Result<(), GeoRefError> {
        if !self.state.can_transition(to) {
            return Err(GeoRefError::IllegalTransition {
                key: self.key.clone(),
                from: self.state,
                to,
            });
        }
        debug!("{}: {:?} → {:?}", self.key, self.state, to);
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    /// Mark the job skipped. Only a freshly received job can be skipped; in
    /// any other state this is a no-op.
    pub fn skip(&mut self) {
        if self.state == JobState::Received {
            self.state = JobState::Skipped;
            self.history.push(JobState::Skipped);
        }
    }

    /// Mark the job failed. A no-op once the job is terminal.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = JobState::Failed;
            self.history.push(JobState::Failed);
        }
    }
}
