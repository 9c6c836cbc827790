//! Live tests against the public GEOLocate and Nominatim services.
//!
//! They are gated behind the `E2E_ENABLED` environment variable so they do
//! not run in CI unless explicitly requested. The model test additionally
//! needs provider credentials and a sample map in `./test_cases/`.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use georef_pipeline::pipeline::extraction::parse_extraction;
use georef_pipeline::pipeline::llm::ModelRequest;
use georef_pipeline::{
    GeoLocateClient, Geocoder, LlmVisionModel, NominatimGeocoder, PipelineConfig, TownshipLookup,
    VisionModel,
};
use std::path::PathBuf;

macro_rules! e2e_skip_unless_enabled {
    () => {
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    };
}

#[tokio::test]
async fn geolocate_resolves_a_colorado_section() {
    e2e_skip_unless_enabled!();
    let client = GeoLocateClient::new("United States of America", "Colorado").unwrap();

    let hit = client
        .locate("T8N R70W Section 15")
        .await
        .expect("GEOLocate request")
        .expect("a result for a valid PLSS section");

    println!("{hit:?}");
    assert!((39.0..42.0).contains(&hit.coordinate.latitude));
    assert!((-110.0..-101.0).contains(&hit.coordinate.longitude));
}

#[tokio::test]
async fn nominatim_finds_a_named_reservoir() {
    e2e_skip_unless_enabled!();
    let geocoder = NominatimGeocoder::new("georef-pipeline-e2e", 10).unwrap();

    let coord = geocoder
        .geocode("Horsetooth Reservoir, Colorado, USA", "us")
        .await
        .expect("Nominatim request")
        .expect("a result");

    println!("{coord:?}");
    assert!((40.0..41.0).contains(&coord.latitude));
}

#[tokio::test]
async fn model_extracts_structured_fields_from_sample_map() {
    e2e_skip_unless_enabled!();
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/sample_map.png");
    if !path.exists() {
        println!("SKIP — test file not found: {}", path.display());
        return;
    }
    let config = PipelineConfig::default();
    let model = match LlmVisionModel::from_config(&config) {
        Ok(m) => m,
        Err(e) => {
            println!("SKIP — no model provider: {e}");
            return;
        }
    };

    let png = std::fs::read(&path).unwrap();
    let reply = model
        .invoke(&ModelRequest::for_png(&png, &config))
        .await
        .expect("model reply");
    let extraction = parse_extraction(&reply).expect("well-formed extraction");

    println!("{extraction:#?}");
    assert!(!extraction.map_description.is_empty());
}
