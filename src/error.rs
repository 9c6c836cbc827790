//! Error types for the georef-pipeline library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`GeoRefError`] — **Fatal** for one invocation: the object cannot be
//!   processed (undecodable image, model returned prose instead of JSON,
//!   lookup service down, publish rejected). The stage handlers catch it at
//!   the invocation boundary and turn it into exactly one error record.
//!
//! * [`ResolveError`] — **Non-fatal**: name-based geocoding of a single
//!   water resource failed. It is logged and treated as "no coordinate" so
//!   the remaining resources and the map boundary are still produced.

use thiserror::Error;

/// All invocation-level errors returned by the georef-pipeline library.
#[derive(Debug, Error)]
pub enum GeoRefError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The trigger payload could not be parsed.
    #[error("Invalid storage event: {detail}")]
    InvalidEvent { detail: String },

    /// The object key has no file name component.
    #[error("Object key '{key}' has no file name")]
    InvalidKey { key: String },

    // ── Image errors ──────────────────────────────────────────────────────
    /// The raw image could not be decoded.
    #[error("Failed to decode image '{name}': {detail}")]
    DecodeFailed { name: String, detail: String },

    /// PNG re-encoding failed.
    #[error("Failed to encode PNG: {detail}")]
    EncodeFailed { detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The vision model provider is not initialised (missing API key etc.).
    #[error("Model provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model API returned an error.
    #[error("Model invocation failed for '{model}': {message}")]
    ModelInvocation { model: String, message: String },

    /// The model answered, but not with the expected JSON object.
    #[error("Model response is not a valid extraction: {detail}\nResponse starts with: {preview:?}")]
    MalformedExtraction { detail: String, preview: String },

    // ── Resolution errors ─────────────────────────────────────────────────
    /// The township-range lookup service failed (transport or HTTP status).
    #[error("Township lookup failed for '{locality}': {detail}")]
    LookupFailed { locality: String, detail: String },

    // ── Storage and publication errors ───────────────────────────────────
    /// Object storage read/write failed.
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    /// The document store rejected the feature collection.
    #[error("Failed to publish '{name}': {detail}")]
    PublishFailed { name: String, detail: String },

    /// The cumulative metadata table could not be appended to or rendered.
    #[error("Metadata table error: {detail}")]
    TableFailed { detail: String },

    // ── Job errors ────────────────────────────────────────────────────────
    /// A stage attempted a state change the job state machine forbids.
    #[error("Illegal job transition {from:?} → {to:?} for '{key}'")]
    IllegalTransition {
        key: String,
        from: crate::job::JobState,
        to: crate::job::JobState,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single water resource.
///
/// Recorded in the logs; the resource keeps its place in the human-readable
/// feature list but contributes no geometry.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// There was neither a township-range string nor a name to query.
    #[error("No township-range or name to geocode")]
    EmptyQuery,

    /// The geocoding service call failed.
    #[error("Geocoding '{query}' failed: {detail}")]
    GeocodeFailed { query: String, detail: String },
}
