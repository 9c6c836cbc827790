//! The Extractor stage: compressed map → GeoJSON document + metadata row.
//!
//! ## Steps
//!
//! ```text
//! compressed/<name>.png
//!  │
//!  ├─ 1. Model     image + instruction → text reply            (ModelInvoked)
//!  ├─ 2. Parse     strict JSON → ModelExtraction               (Parsed)
//!  ├─ 3. Resolve   township lookup, then geocoding fallback
//!  ├─ 4. Assemble  bounding box, FeatureCollection, MetadataRow (Resolved)
//!  └─ 5. Publish   upsert <name>.geojson, append the row       (Published)
//! ```
//!
//! Any error before step 5 completes publishes nothing and leaves one
//! record at `error/<name>.txt`.

use crate::config::PipelineConfig;
use crate::error::GeoRefError;
use crate::job::{Job, JobState, ObjectEvent, Stage};
use crate::output::InvocationStatus;
use crate::pipeline::extraction::{parse_extraction, ModelExtraction};
use crate::pipeline::features::{derive_extent, FeatureCollection, MapExtent};
use crate::pipeline::geocode::Geocoder;
use crate::pipeline::llm::{ModelRequest, VisionModel};
use crate::pipeline::lookup::TownshipLookup;
use crate::pipeline::metadata::MetadataRow;
use crate::pipeline::resolve::{Resolution, Resolver};
use crate::store::{DocumentStore, ErrorChannel, MetadataTable, ObjectStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// The external capabilities the Extractor calls.
#[derive(Clone)]
pub struct Services {
    pub store: ObjectStore,
    pub model: Arc<dyn VisionModel>,
    pub lookup: Arc<dyn TownshipLookup>,
    pub geocoder: Arc<dyn Geocoder>,
    pub documents: Arc<dyn DocumentStore>,
    pub table: Arc<dyn MetadataTable>,
}

/// Everything produced for one map.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub image_name: String,
    pub extraction: ModelExtraction,
    pub resolution: Resolution,
    pub extent: MapExtent,
    pub features: FeatureCollection,
    pub row: MetadataRow,
    pub document_url: String,
    pub table_location: String,
}

/// Handles compressed-namespace objects.
#[derive(Clone)]
pub struct Extractor {
    config: PipelineConfig,
    services: Services,
    errors: ErrorChannel,
}

impl Extractor {
    pub fn new(config: PipelineConfig, services: Services) -> Self {
        let errors = ErrorChannel::new(services.store.clone(), config.namespaces.error.clone());
        Self {
            config,
            services,
            errors,
        }
    }

    /// Handle one compressed object. Never returns an error: failures are
    /// recorded in the error namespace and reported in the status.
    pub async fn handle(&self, event: &ObjectEvent) -> InvocationStatus {
        let mut job = Job::new(event.key.clone());
        match self.analyze(event, &mut job).await {
            Ok(analysis) => InvocationStatus::Published {
                key: event.key.clone(),
                document_url: analysis.document_url,
                table_location: analysis.table_location,
                point_features: analysis.features.point_count(),
                has_boundary: analysis.extent.bbox.is_some(),
            },
            Err(e) => {
                job.fail();
                let message = format!("Error processing image '{}': {}", event.key, e);
                error!("{}", message);
                let error_record = self
                    .errors
                    .record(&crate::compressor::record_name(event), &message)
                    .await;
                InvocationStatus::Failed {
                    key: event.key.clone(),
                    stage: Stage::Extract,
                    error: message,
                    error_record,
                }
            }
        }
    }

    /// Run every step for `event`, advancing `job` as each one completes.
    pub async fn analyze(&self, event: &ObjectEvent, job: &mut Job) -> Result<Analysis, GeoRefError> {
        let start = Instant::now();
        let image_name = event.file_name()?.to_string();
        let base = event.base_name()?.to_string();
        let png = self.services.store.get(&event.key).await?;
        info!("Analysing {} ({} bytes)", event.key, png.len());

        // ── Step 1: Model ────────────────────────────────────────────────
        let request = ModelRequest::for_png(&png, &self.config);
        let reply = self.services.model.invoke(&request).await?;
        job.advance(JobState::ModelInvoked)?;
        info!(
            "{} replied with {} chars in {:?}",
            self.services.model.model_id(),
            reply.len(),
            start.elapsed()
        );

        // ── Step 2: Parse ────────────────────────────────────────────────
        let extraction = parse_extraction(&reply)?;
        job.advance(JobState::Parsed)?;
        info!(
            "{}: {} township ranges, {} water resources, county '{}'",
            image_name,
            extraction.township_range.len(),
            extraction.water_resources.len(),
            extraction.county
        );

        // ── Step 3: Resolve ──────────────────────────────────────────────
        let resolver = Resolver::new(
            self.services.lookup.as_ref(),
            self.services.geocoder.as_ref(),
            &self.config,
        );
        let resolution = resolver.resolve(&extraction).await?;

        // ── Step 4: Assemble ─────────────────────────────────────────────
        let extent = derive_extent(&resolution.map_references, &resolution.resource_references());
        let features = FeatureCollection::assemble(&resolution, &extent);
        let labels: Vec<String> = extraction.water_resources.iter().map(|r| r.label()).collect();
        let mut row = MetadataRow::build(&image_name, &extraction, &labels, &extent, "");
        let document = features.to_pretty_json()?;
        job.advance(JobState::Resolved)?;
        info!(
            "{}: boundary {} ({}), {} point features",
            image_name,
            if extent.bbox.is_some() { "present" } else { "absent" },
            extent.source.description(),
            features.point_count()
        );

        // ── Step 5: Publish ──────────────────────────────────────────────
        let document_name = format!("{base}.geojson");
        let document_url = self
            .services
            .documents
            .upsert(&document_name, &document, &format!("Add {document_name}"))
            .await?;
        row.external_reference = document_url.clone();
        let table_location = self.services.table.append(&row).await?;
        job.advance(JobState::Published)?;

        info!(
            "Published {} → {} (row {}) in {:?}",
            event.key,
            document_url,
            table_location,
            start.elapsed()
        );

        Ok(Analysis {
            image_name,
            extraction,
            resolution,
            extent,
            features,
            row,
            document_url,
            table_location,
        })
    }
}
