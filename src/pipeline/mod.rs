//! Processing steps shared by the two stages.
//!
//! Each submodule implements one step and is testable on its own; the
//! network-facing steps sit behind traits so the stage handlers can be
//! driven with fakes.
//!
//! ## Data Flow
//!
//! ```text
//! Compressor:  compress ──▶ encode (PNG, best compression)
//!
//! Extractor:   encode ──▶ llm ──▶ extraction ──▶ township ──▶ resolve ──▶ features ──▶ metadata
//!              (base64)   (VLM)   (strict JSON)  (normalise)  (lookup,    (GeoJSON)    (row)
//!                                                             geocode)
//! ```
//!
//! 1. [`compress`]   — binary search over the scale factor until the PNG fits
//!    the target size; runs in `spawn_blocking`
//! 2. [`encode`]     — PNG encoding and base64 wrapping for the model request
//! 3. [`llm`]        — the [`llm::VisionModel`] capability and its
//!    `edgequake-llm` implementation
//! 4. [`extraction`] — reply cleanup and strict parsing
//! 5. [`township`]   — PLSS string normalisation and token checks
//! 6. [`lookup`] / [`geocode`] — the two resolution tiers
//! 7. [`resolve`]    — tier ordering and provenance
//! 8. [`features`] / [`geometry`] — bounding box and feature collection
//! 9. [`metadata`]   — the fixed-schema table row

pub mod compress;
pub mod encode;
pub mod extraction;
pub mod features;
pub mod geocode;
pub mod geometry;
pub mod llm;
pub mod lookup;
pub mod metadata;
pub mod resolve;
pub mod township;
