//! Whole-pipeline tests against an in-memory object store.
//!
//! The model, township lookup and geocoder are fakes; storage, documents
//! and the metadata table are the real implementations over `opendal`'s
//! memory backend.

use async_trait::async_trait;
use georef_pipeline::pipeline::features::{Geometry, Properties};
use georef_pipeline::{
    BatchProgressCallback, Coordinate, FeatureCollection, GeoRefError, Geocoder, InvocationStatus,
    LookupHit, MetadataTable, ModelRequest, ObjectDocumentStore, ObjectEvent, ObjectStore,
    Pipeline, PipelineConfig, ResolveError, RowLogTable, Services, TownshipLookup, VisionModel,
};
use image::{ImageBuffer, Rgb};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Fakes ────────────────────────────────────────────────────────────────────

struct CannedModel {
    reply: String,
    calls: AtomicUsize,
}

#[async_trait]
impl VisionModel for CannedModel {
    fn model_id(&self) -> &str {
        "canned"
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<String, GeoRefError> {
        assert_eq!(request.image.mime_type, "image/png");
        assert_eq!(request.temperature, 0.5);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

#[derive(Default)]
struct FakeLookup {
    hits: HashMap<String, Coordinate>,
    down: bool,
    queries: Mutex<Vec<String>>,
}

#[async_trait]
impl TownshipLookup for FakeLookup {
    async fn locate(&self, locality: &str) -> Result<Option<LookupHit>, GeoRefError> {
        self.queries.lock().unwrap().push(locality.to_string());
        if self.down {
            return Err(GeoRefError::LookupFailed {
                locality: locality.into(),
                detail: "HTTP 503 Service Unavailable".into(),
            });
        }
        Ok(self.hits.get(locality).map(|c| LookupHit {
            coordinate: *c,
            precision: Some("High".into()),
            score: Some(90),
            uncertainty_radius_m: Some(800.0),
        }))
    }
}

#[derive(Default)]
struct FakeGeocoder {
    hits: HashMap<String, Coordinate>,
    queries: Mutex<Vec<String>>,
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn geocode(&self, query: &str, _country_codes: &str) -> Result<Option<Coordinate>, ResolveError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.hits.get(query).copied())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

struct Harness {
    store: ObjectStore,
    model: Arc<CannedModel>,
    lookup: Arc<FakeLookup>,
    geocoder: Arc<FakeGeocoder>,
    pipeline: Pipeline,
}

fn harness(config: PipelineConfig, reply: &str, lookup: FakeLookup, geocoder: FakeGeocoder) -> Harness {
    let store = ObjectStore::memory().unwrap();
    let model = Arc::new(CannedModel {
        reply: reply.to_string(),
        calls: AtomicUsize::new(0),
    });
    let lookup = Arc::new(lookup);
    let geocoder = Arc::new(geocoder);
    let services = Services {
        store: store.clone(),
        model: model.clone(),
        lookup: lookup.clone(),
        geocoder: geocoder.clone(),
        documents: Arc::new(ObjectDocumentStore::new(store.clone(), &config.namespaces.documents)),
        table: Arc::new(RowLogTable::new(store.clone(), &config.namespaces.analysis)),
    };
    Harness {
        pipeline: Pipeline::new(config, services),
        store,
        model,
        lookup,
        geocoder,
    }
}

/// A TIFF that stays small when PNG-encoded.
fn smooth_tiff(w: u32, h: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(w, h, |x, _| Rgb([(x % 256) as u8, 120, 200]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Tiff).unwrap();
    out.into_inner()
}

/// A TIFF of pseudo-random noise, which PNG cannot compress well.
fn noisy_tiff(w: u32, h: u32) -> Vec<u8> {
    let mut state: u32 = 0x9E37_79B9;
    let img = ImageBuffer::from_fn(w, h, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xFF) as u8
        };
        Rgb([next(), next(), next()])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Tiff).unwrap();
    out.into_inner()
}

async fn feature_collection(store: &ObjectStore, key: &str) -> FeatureCollection {
    let body = store.get(key).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

const T8N_REPLY: &str = r#"{"township_range": ["T8N R70W"], "water_resources": [], "county": "Example County", "map_description": "x"}"#;

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn map_level_township_yields_boundary_only() {
    let lookup = FakeLookup {
        hits: HashMap::from([("T8N R70W Section 15".into(), Coordinate::new(40.66, -105.34))]),
        ..Default::default()
    };
    let h = harness(PipelineConfig::default(), T8N_REPLY, lookup, FakeGeocoder::default());
    h.store.put("raw/map_0042.tif", smooth_tiff(64, 48)).await.unwrap();

    let statuses = h.pipeline.handle(&ObjectEvent::new("raw/map_0042.tif")).await;

    assert_eq!(statuses.len(), 2, "compress then extract: {statuses:?}");
    assert!(matches!(&statuses[0], InvocationStatus::Compressed { output_key, .. } if output_key == "compressed/map_0042.png"));
    match &statuses[1] {
        InvocationStatus::Published {
            document_url,
            point_features,
            has_boundary,
            ..
        } => {
            assert_eq!(document_url, "memory:///geojson/map_0042.geojson");
            assert_eq!(*point_features, 0);
            assert!(has_boundary);
        }
        other => panic!("unexpected status {other:?}"),
    }

    assert_eq!(*h.lookup.queries.lock().unwrap(), vec!["T8N R70W Section 15"]);
    assert!(h.geocoder.queries.lock().unwrap().is_empty());

    let fc = feature_collection(&h.store, "geojson/map_0042.geojson").await;
    assert_eq!(fc.features.len(), 1);
    assert!(matches!(fc.features[0].geometry, Geometry::Polygon(_)));
    match &fc.features[0].properties {
        Properties::Boundary(b) => {
            assert_eq!(b.name, "Map Boundary");
            assert_eq!(b.source, "Derived from Map-Level Township Ranges");
            assert_eq!(b.map_township_ranges_used, vec!["T8N R70W Section 15"]);
        }
        other => panic!("unexpected properties {other:?}"),
    }

    let rows = RowLogTable::new(h.store.clone(), "analysis").rows().await.unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.spatial_coverage, "Example County");
    assert_eq!(row.title, "map_0042");
    assert_eq!(row.file_name, "map_0042.png");
    assert_eq!(row.latitude, Some(40.66));
    assert_eq!(row.longitude, Some(-105.34));
    assert_eq!(row.bounding_box, "ENVELOPE(-105.34,-105.34,40.66,40.66)");
    assert_eq!(row.external_reference, "memory:///geojson/map_0042.geojson");
    assert_eq!(row.description, "");
    assert!(h.store.list("error").await.unwrap().is_empty());
}

#[tokio::test]
async fn unresolvable_resource_is_described_but_not_placed() {
    let reply = r#"{
        "map_description": "Ditch map",
        "township_range": [],
        "county": "",
        "water_resources": [
            {"name": "Lost Ditch", "description": "", "feature_type": "ditch", "township_range": ""}
        ]
    }"#;
    let h = harness(PipelineConfig::default(), reply, FakeLookup::default(), FakeGeocoder::default());
    h.store.put("compressed/ditch.png", vec![0x89, b'P', b'N', b'G']).await.unwrap();

    let statuses = h.pipeline.handle(&ObjectEvent::new("compressed/ditch.png")).await;
    assert!(matches!(&statuses[..], [InvocationStatus::Published { point_features: 0, has_boundary: false, .. }]));

    assert_eq!(*h.geocoder.queries.lock().unwrap(), vec!["Lost Ditch, Colorado, USA"]);
    assert!(h.lookup.queries.lock().unwrap().is_empty());

    let fc = feature_collection(&h.store, "geojson/ditch.geojson").await;
    assert!(fc.features.is_empty());

    let rows = RowLogTable::new(h.store.clone(), "analysis").rows().await.unwrap();
    assert_eq!(rows[0].description, "This item includes: Lost Ditch (ditch).");
    assert_eq!(rows[0].spatial_coverage, "Lost Ditch (ditch)");
    assert_eq!(rows[0].latitude, None);
    assert_eq!(rows[0].bounding_box, "");
}

#[tokio::test]
async fn resource_fallback_builds_boundary_and_points_in_order() {
    let reply = r#"{
        "map_description": "Reservoirs",
        "township_range": ["T1N"],
        "county": "Larimer County",
        "water_resources": [
            {"name": "North Lake", "description": "", "feature_type": "lake", "township_range": "T9N R71W"},
            {"name": "Dry Gulch", "description": "", "feature_type": "creek", "township_range": ""},
            {"name": "South Lake", "description": "", "feature_type": "lake", "township_range": ""}
        ]
    }"#;
    let lookup = FakeLookup {
        hits: HashMap::from([("T9N R71W Section 15".into(), Coordinate::new(40.8, -105.5))]),
        ..Default::default()
    };
    let geocoder = FakeGeocoder {
        hits: HashMap::from([("South Lake, Colorado, USA".into(), Coordinate::new(40.2, -105.1))]),
        ..Default::default()
    };
    let h = harness(PipelineConfig::default(), reply, lookup, geocoder);
    h.store.put("compressed/lakes.png", b"png".to_vec()).await.unwrap();

    h.pipeline.handle(&ObjectEvent::new("compressed/lakes.png")).await;

    // "T1N" has no range token: never sent to the lookup service.
    assert_eq!(*h.lookup.queries.lock().unwrap(), vec!["T9N R71W Section 15"]);
    assert_eq!(
        *h.geocoder.queries.lock().unwrap(),
        vec!["Dry Gulch, Colorado, USA", "South Lake, Colorado, USA"]
    );

    let fc = feature_collection(&h.store, "geojson/lakes.geojson").await;
    assert_eq!(fc.features.len(), 3);
    match &fc.features[0].properties {
        Properties::Boundary(b) => {
            assert_eq!(b.source, "Fallback from Water Resource Coordinates");
            assert_eq!(b.map_township_ranges_used, vec!["T1N Section 15"]);
        }
        other => panic!("boundary must come first, got {other:?}"),
    }
    let points: Vec<(String, String)> = fc.features[1..]
        .iter()
        .map(|f| match &f.properties {
            Properties::Water(w) => (w.name.clone(), w.coordinate_source.clone()),
            Properties::Boundary(_) => panic!("second boundary"),
        })
        .collect();
    assert_eq!(
        points,
        vec![
            ("North Lake".to_string(), "Township-Range: T9N R71W Section 15".to_string()),
            ("South Lake".to_string(), "Geocoded from name: South Lake".to_string()),
        ]
    );

    let bbox = fc.boundary().unwrap();
    assert_eq!((bbox.west, bbox.east, bbox.south, bbox.north), (-105.5, -105.1, 40.2, 40.8));

    let rows = RowLogTable::new(h.store.clone(), "analysis").rows().await.unwrap();
    assert_eq!(
        rows[0].spatial_coverage,
        "Larimer County; North Lake (lake); Dry Gulch (creek); South Lake (lake)"
    );
}

#[tokio::test]
async fn malformed_reply_publishes_nothing_and_records_error() {
    let h = harness(
        PipelineConfig::default(),
        "Sorry, I can't read this map.",
        FakeLookup::default(),
        FakeGeocoder::default(),
    );
    h.store.put("compressed/blurry.png", b"png".to_vec()).await.unwrap();

    let statuses = h.pipeline.handle(&ObjectEvent::new("compressed/blurry.png")).await;
    h.pipeline.handle(&ObjectEvent::new("compressed/blurry.png")).await;

    match &statuses[0] {
        InvocationStatus::Failed { error, error_record, .. } => {
            assert!(error.starts_with("Error processing image 'compressed/blurry.png':"));
            assert_eq!(error_record.as_deref(), Some("error/blurry.txt"));
        }
        other => panic!("unexpected status {other:?}"),
    }
    assert_eq!(h.store.list("error").await.unwrap(), vec!["error/blurry.txt"]);
    assert!(h.store.list("geojson").await.unwrap().is_empty());
    assert!(RowLogTable::new(h.store.clone(), "analysis").rows().await.unwrap().is_empty());
}

#[tokio::test]
async fn lookup_outage_fails_the_invocation() {
    let lookup = FakeLookup {
        down: true,
        ..Default::default()
    };
    let h = harness(PipelineConfig::default(), T8N_REPLY, lookup, FakeGeocoder::default());
    h.store.put("compressed/m.png", b"png".to_vec()).await.unwrap();

    let statuses = h.pipeline.handle(&ObjectEvent::new("compressed/m.png")).await;
    assert!(statuses[0].is_failure());
    let record = String::from_utf8(h.store.get("error/m.txt").await.unwrap()).unwrap();
    assert!(record.contains("503"), "got: {record}");
    assert!(h.store.list("geojson").await.unwrap().is_empty());
}

#[tokio::test]
async fn oversized_scan_is_scaled_under_target() {
    // 0.05 MB target: the full-size noise PNG is several times larger.
    let config = PipelineConfig::builder().target_size_mb(0.05).build().unwrap();
    let h = harness(config.clone(), T8N_REPLY, FakeLookup::default(), FakeGeocoder::default());
    let pipeline = h.pipeline.clone().with_chaining(false);
    h.store.put("raw/big.tiff", noisy_tiff(240, 160)).await.unwrap();

    let statuses = pipeline.handle(&ObjectEvent::new("raw/big.tiff")).await;
    assert_eq!(statuses.len(), 1);
    match &statuses[0] {
        InvocationStatus::Compressed {
            width,
            height,
            size_bytes,
            within_target,
            ..
        } => {
            assert!(*within_target);
            assert!(*size_bytes <= config.target_bytes());
            assert!(*width < 240 && *height < 160);
            let ratio = *width as f64 / *height as f64;
            assert!((ratio - 1.5).abs() < 0.05, "aspect ratio drifted: {ratio}");
        }
        other => panic!("unexpected status {other:?}"),
    }
    let png = h.store.get("compressed/big.png").await.unwrap();
    assert!(png.len() as u64 <= config.target_bytes());
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn notification_keys_are_decoded_and_routed() {
    let h = harness(PipelineConfig::default(), T8N_REPLY, FakeLookup::default(), FakeGeocoder::default());
    h.store.put("raw/Map 12.tif", smooth_tiff(20, 20)).await.unwrap();
    let notification = r#"{"Records": [
        {"s3": {"bucket": {"name": "maps"}, "object": {"key": "raw/Map+12.tif"}}},
        {"s3": {"bucket": {"name": "maps"}, "object": {"key": "raw/readme.txt"}}},
        {"s3": {"bucket": {"name": "maps"}, "object": {"key": "elsewhere/x.tif"}}}
    ]}"#;

    let statuses = h.pipeline.handle_notification(notification).await.unwrap();

    assert!(matches!(&statuses[0], InvocationStatus::Compressed { output_key, .. } if output_key == "compressed/Map 12.png"));
    assert!(matches!(&statuses[1], InvocationStatus::Published { .. }));
    assert!(matches!(&statuses[2], InvocationStatus::Skipped { .. }));
    assert!(matches!(&statuses[3], InvocationStatus::Skipped { .. }));
    assert!(h.store.list("error").await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_notification_is_an_error() {
    let h = harness(PipelineConfig::default(), T8N_REPLY, FakeLookup::default(), FakeGeocoder::default());
    assert!(matches!(
        h.pipeline.handle_notification("not json").await,
        Err(GeoRefError::InvalidEvent { .. })
    ));
}

#[derive(Default)]
struct Counting {
    started: AtomicUsize,
    completed: AtomicUsize,
    failed_reported: AtomicUsize,
}

impl BatchProgressCallback for Counting {
    fn on_object_start(&self, _key: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_object_complete(&self, _key: &str, _status: &InvocationStatus) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_batch_complete(&self, _total: usize, failed: usize) {
        self.failed_reported.store(failed, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn batch_run_appends_one_row_per_map_and_exports_csv() {
    let config = PipelineConfig::builder().concurrency(3).build().unwrap();
    let lookup = FakeLookup {
        hits: HashMap::from([("T8N R70W Section 15".into(), Coordinate::new(40.66, -105.34))]),
        ..Default::default()
    };
    let h = harness(config.clone(), T8N_REPLY, lookup, FakeGeocoder::default());
    for name in ["a.tif", "b.TIFF", "c.tif"] {
        h.store.put(&format!("raw/{name}"), smooth_tiff(16, 16)).await.unwrap();
    }
    h.store.put("raw/notes.txt", b"hello".to_vec()).await.unwrap();
    h.store.put("raw/broken.tif", b"not a tiff".to_vec()).await.unwrap();

    let events = h.pipeline.pending_raw().await.unwrap();
    assert_eq!(events.len(), 5);

    let progress = Arc::new(Counting::default());
    let statuses = h.pipeline.run_batch(events, Some(progress.clone())).await;

    assert_eq!(progress.started.load(Ordering::SeqCst), 5);
    assert_eq!(progress.completed.load(Ordering::SeqCst), 5);
    assert_eq!(progress.failed_reported.load(Ordering::SeqCst), 1);
    assert_eq!(statuses.iter().filter(|s| matches!(s, InvocationStatus::Published { .. })).count(), 3);
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.store.list("error").await.unwrap(), vec!["error/broken.txt"]);

    let table = RowLogTable::new(h.store.clone(), &config.namespaces.analysis);
    assert_eq!(table.export_csv(&config.table_key()).await.unwrap(), 3);
    let csv = String::from_utf8(h.store.get(&config.table_key()).await.unwrap()).unwrap();
    let mut reader = csv::Reader::from_reader(csv.as_bytes());
    let mut titles: Vec<String> = reader
        .records()
        .map(|r| r.unwrap()[0].to_string())
        .collect();
    titles.sort();
    assert_eq!(titles, ["a", "b", "c"]);
    assert_eq!(config.table_key(), "analysis/dublin core metadata analysis file.csv");
}
