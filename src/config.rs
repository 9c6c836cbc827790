//! Configuration types for the compression and extraction stages.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built
//! via its [`PipelineConfigBuilder`]. Every knob lives in one struct so a
//! single value can be shared by both stages, logged at start-up, and
//! compared between runs.
//!
//! Storage layout is part of the configuration, not the design: the
//! [`Namespaces`] struct names the logical folders the transport uses, and
//! the stages only ever ask it where to read or write.

use crate::error::GeoRefError;
use serde::{Deserialize, Serialize};

// ── Policy constants ─────────────────────────────────────────────────────

/// Section appended to a township-range string that has none.
///
/// Last-resort fallback when the model reports only township and range; the
/// lookup service needs a section to return a point.
pub const DEFAULT_SECTION: &str = "Section 15";

/// Region qualifier appended to a bare water-resource name before geocoding.
pub const DEFAULT_GEOCODE_REGION: &str = "Colorado, USA";

/// Country passed to the township-range lookup service.
pub const DEFAULT_LOOKUP_COUNTRY: &str = "United States of America";

/// State passed to the township-range lookup service.
pub const DEFAULT_LOOKUP_STATE: &str = "Colorado";

/// Country restriction for name-based geocoding (ISO 3166-1 alpha-2).
pub const DEFAULT_GEOCODE_COUNTRY_CODES: &str = "us";

/// Sampling temperature for the extraction call. Not configurable.
pub const MODEL_TEMPERATURE: f32 = 0.5;

/// File name of the rendered cumulative metadata table.
pub const DEFAULT_TABLE_NAME: &str = "dublin core metadata analysis file.csv";

/// Logical folders used by the storage transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespaces {
    /// Where raw TIFF scans land. Default: `raw`.
    pub raw: String,
    /// Where the Compressor writes PNGs. Default: `compressed`.
    pub compressed: String,
    /// Where the metadata row log and rendered table live. Default: `analysis`.
    pub analysis: String,
    /// Where both stages write error records. Default: `error`.
    pub error: String,
    /// Where [`crate::store::ObjectDocumentStore`] writes feature collections. Default: `geojson`.
    pub documents: String,
}

impl Default for Namespaces {
    fn default() -> Self {
        Self {
            raw: "raw".into(),
            compressed: "compressed".into(),
            analysis: "analysis".into(),
            error: "error".into(),
            documents: "geojson".into(),
        }
    }
}

impl Namespaces {
    /// Join a namespace and a file name into an object key.
    pub fn key(namespace: &str, file_name: &str) -> String {
        let ns = namespace.trim_matches('/');
        if ns.is_empty() {
            file_name.to_string()
        } else {
            format!("{ns}/{file_name}")
        }
    }

    /// True when `key` lives directly or transitively under `namespace`.
    pub fn contains(namespace: &str, key: &str) -> bool {
        let ns = namespace.trim_matches('/');
        ns.is_empty() || key.strip_prefix(ns).is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Configuration shared by the Compressor and the Extractor.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use georef_pipeline::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .target_size_mb(3.0)
///     .model("claude-sonnet-4-20250514")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound for the compressed PNG, in MiB. Default: 3.0.
    ///
    /// Multimodal APIs reject large uploads; 3 MiB of PNG leaves room for the
    /// base64 expansion (×4/3) under the common 5 MB request limit.
    pub target_size_mb: f64,

    /// Storage layout.
    pub namespaces: Namespaces,

    /// Model identifier, e.g. "claude-sonnet-4-20250514". If None, uses provider default.
    pub model: Option<String>,

    /// Provider name (e.g. "anthropic", "openai"). If None, auto-detected.
    pub provider_name: Option<String>,

    /// Region of the model endpoint. Informational only: it is logged when
    /// the model is resolved but not passed to the provider, which takes its
    /// region (if any) from its own environment variables.
    pub model_region: Option<String>,

    /// Maximum tokens the model may generate. Default: 2048.
    pub max_tokens: usize,

    /// Custom extraction prompt. If None, uses [`crate::prompts::DEFAULT_EXTRACTION_PROMPT`].
    pub prompt: Option<String>,

    /// Section appended to township-range strings lacking one. Default: [`DEFAULT_SECTION`].
    pub default_section: String,

    /// Region qualifier for name geocoding. Default: [`DEFAULT_GEOCODE_REGION`].
    pub geocode_region: String,

    /// Country sent to the township lookup. Default: [`DEFAULT_LOOKUP_COUNTRY`].
    pub lookup_country: String,

    /// State sent to the township lookup. Default: [`DEFAULT_LOOKUP_STATE`].
    pub lookup_state: String,

    /// Country restriction for geocoding. Default: [`DEFAULT_GEOCODE_COUNTRY_CODES`].
    pub geocode_country_codes: String,

    /// File name of the rendered cumulative table. Default: [`DEFAULT_TABLE_NAME`].
    pub table_name: String,

    /// Objects processed at once by [`crate::runner::Pipeline::run_batch`]. Default: 4.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_size_mb: 3.0,
            namespaces: Namespaces::default(),
            model: None,
            provider_name: None,
            model_region: None,
            max_tokens: 2048,
            prompt: None,
            default_section: DEFAULT_SECTION.into(),
            geocode_region: DEFAULT_GEOCODE_REGION.into(),
            lookup_country: DEFAULT_LOOKUP_COUNTRY.into(),
            lookup_state: DEFAULT_LOOKUP_STATE.into(),
            geocode_country_codes: DEFAULT_GEOCODE_COUNTRY_CODES.into(),
            table_name: DEFAULT_TABLE_NAME.into(),
            concurrency: 4,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Target size converted to bytes (1 MB = 1024 × 1024 bytes).
    pub fn target_bytes(&self) -> u64 {
        (self.target_size_mb * 1024.0 * 1024.0) as u64
    }

    /// Object key of the rendered cumulative table.
    pub fn table_key(&self) -> String {
        Namespaces::key(&self.namespaces.analysis, &self.table_name)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn target_size_mb(mut self, mb: f64) -> Self {
        self.config.target_size_mb = mb;
        self
    }

    pub fn namespaces(mut self, namespaces: Namespaces) -> Self {
        self.config.namespaces = namespaces;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model_region(mut self, region: impl Into<String>) -> Self {
        self.config.model_region = Some(region.into());
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn default_section(mut self, section: impl Into<String>) -> Self {
        self.config.default_section = section.into();
        self
    }

    pub fn geocode_region(mut self, region: impl Into<String>) -> Self {
        self.config.geocode_region = region.into();
        self
    }

    pub fn lookup_area(mut self, country: impl Into<String>, state: impl Into<String>) -> Self {
        self.config.lookup_country = country.into();
        self.config.lookup_state = state.into();
        self
    }

    pub fn geocode_country_codes(mut self, codes: impl Into<String>) -> Self {
        self.config.geocode_country_codes = codes.into();
        self
    }

    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.config.table_name = name.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, GeoRefError> {
        let c = &self.config;
        if !(c.target_size_mb.is_finite() && c.target_size_mb > 0.0) {
            return Err(GeoRefError::InvalidConfig(format!(
                "Target size must be a positive number of MB, got {}",
                c.target_size_mb
            )));
        }
        if c.max_tokens == 0 {
            return Err(GeoRefError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.default_section.trim().is_empty() {
            return Err(GeoRefError::InvalidConfig(
                "Default section must not be empty".into(),
            ));
        }
        let ns = &c.namespaces;
        if ns.compressed.trim_matches('/') == ns.raw.trim_matches('/') {
            return Err(GeoRefError::InvalidConfig(format!(
                "Raw and compressed namespaces must differ, both are '{}'",
                ns.raw
            )));
        }
        Ok(self.config)
    }
}
