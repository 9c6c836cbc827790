//! # georef-pipeline
//!
//! Turn scanned water-resource maps into geo-referenced metadata.
//!
//! ## Pipeline Overview
//!
//! ```text
//! raw/<map>.tif
//!  │
//!  ├─ Compressor   decode, binary-search the scale until the PNG fits the
//!  │               target size (spawn_blocking) ──▶ compressed/<map>.png
//!  │
//!  └─ Extractor    vision model reads the map ──▶ township ranges, county,
//!                  water resources ──▶ coordinates (township lookup, then
//!                  geocoding) ──▶ bounding box ──▶ <map>.geojson + one
//!                  Dublin Core metadata row
//! ```
//!
//! Failures never escape a handler: each one leaves a single
//! `error/<map>.txt` record and comes back as
//! [`InvocationStatus::Failed`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use georef_pipeline::{
//!     GeoLocateClient, LlmVisionModel, NominatimGeocoder, ObjectDocumentStore, ObjectEvent,
//!     ObjectStore, Pipeline, PipelineConfig, RowLogTable, Services, StoreConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let store = ObjectStore::new(StoreConfig::Fs { root: "./bucket".into() })?;
//!     let services = Services {
//!         store: store.clone(),
//!         model: Arc::new(LlmVisionModel::from_config(&config)?),
//!         lookup: Arc::new(GeoLocateClient::new(&config.lookup_country, &config.lookup_state)?),
//!         geocoder: Arc::new(NominatimGeocoder::new("georef-pipeline", 10)?),
//!         documents: Arc::new(ObjectDocumentStore::new(store.clone(), "geojson")),
//!         table: Arc::new(RowLogTable::new(store.clone(), &config.namespaces.analysis)),
//!     };
//!     let pipeline = Pipeline::new(config, services);
//!     for status in pipeline.handle(&ObjectEvent::new("raw/map_0042.tif")).await {
//!         println!("{}", status.to_json());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `georef` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `s3`    | off     | S3 object-store backend via `opendal` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod compressor;
pub mod config;
pub mod error;
pub mod extractor;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod runner;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use compressor::Compressor;
pub use config::{Namespaces, PipelineConfig, PipelineConfigBuilder};
pub use error::{GeoRefError, ResolveError};
pub use extractor::{Analysis, Extractor, Services};
pub use job::{Job, JobState, ObjectEvent, Stage};
pub use output::InvocationStatus;
pub use pipeline::extraction::{ModelExtraction, WaterResource};
pub use pipeline::features::FeatureCollection;
pub use pipeline::geocode::{Geocoder, NominatimGeocoder};
pub use pipeline::geometry::{BoundingBox, Coordinate, GeoReference};
pub use pipeline::llm::{LlmVisionModel, ModelRequest, VisionModel};
pub use pipeline::lookup::{GeoLocateClient, LookupHit, TownshipLookup};
pub use pipeline::metadata::MetadataRow;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use runner::Pipeline;
pub use store::documents::GitHubConfig;
pub use store::{
    DocumentStore, ErrorChannel, GitHubDocumentStore, MetadataTable, ObjectDocumentStore,
    ObjectStore, RowLogTable, StoreConfig, StoreError,
};
