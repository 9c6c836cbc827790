//! Coordinate resolution for map-level township ranges and water resources.
//!
//! ## Tier order
//!
//! For each water resource:
//!
//! 1. **Township lookup**: only when the resource carries a township-range
//!    string; the string is normalised first (default section appended).
//! 2. **Geocoding**: only when tier 1 was absent or returned nothing. The
//!    query is the normalised township-range string if there is one,
//!    otherwise `"<name>, <region>"`.
//!
//! Lookup failures propagate (they fail the invocation); geocoding failures
//! are logged and the resource simply gets no coordinate.

use crate::config::PipelineConfig;
use crate::error::{GeoRefError, ResolveError};
use crate::pipeline::extraction::{ModelExtraction, WaterResource};
use crate::pipeline::geocode::Geocoder;
use crate::pipeline::geometry::GeoReference;
use crate::pipeline::lookup::{LookupHit, TownshipLookup};
use crate::pipeline::township::{self, TownshipRange};
use tracing::{debug, info, warn};

/// A water resource together with where (if anywhere) it was placed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedResource {
    pub resource: WaterResource,
    /// Normalised township-range string, or empty when the model gave none.
    pub township_range_used: String,
    pub reference: Option<GeoReference>,
}

/// Everything the resolver learned about one map.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Every map-level township range after normalisation, resolved or not.
    pub map_township_ranges: Vec<String>,
    /// Coordinates of the map-level township ranges that resolved.
    pub map_references: Vec<GeoReference>,
    /// One entry per water resource, in extraction order.
    pub resources: Vec<ResolvedResource>,
}

impl Resolution {
    /// References of the resources that resolved, in extraction order.
    pub fn resource_references(&self) -> Vec<GeoReference> {
        self.resources
            .iter()
            .filter_map(|r| r.reference.clone())
            .collect()
    }
}

/// Applies the resolution policy using injected lookup and geocoding services.
pub struct Resolver<'a> {
    lookup: &'a dyn TownshipLookup,
    geocoder: &'a dyn Geocoder,
    config: &'a PipelineConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(
        lookup: &'a dyn TownshipLookup,
        geocoder: &'a dyn Geocoder,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            lookup,
            geocoder,
            config,
        }
    }

    /// Resolve the map-level ranges, then each water resource in order.
    pub async fn resolve(&self, extraction: &ModelExtraction) -> Result<Resolution, GeoRefError> {
        let map_township_ranges: Vec<String> = extraction
            .township_range
            .iter()
            .map(|tr| township::normalize(tr, &self.config.default_section))
            .collect();

        let mut map_references = Vec::new();
        for tr in &map_township_ranges {
            if let Some(hit) = self.lookup_township(tr).await? {
                map_references.push(township_reference(tr, hit));
            }
        }
        info!(
            "Map-level township ranges: {}/{} resolved",
            map_references.len(),
            map_township_ranges.len()
        );

        let mut resources = Vec::with_capacity(extraction.water_resources.len());
        for resource in &extraction.water_resources {
            resources.push(self.resolve_resource(resource).await?);
        }

        Ok(Resolution {
            map_township_ranges,
            map_references,
            resources,
        })
    }

    /// Two-tier resolution of a single water resource.
    pub async fn resolve_resource(&self, resource: &WaterResource) -> Result<ResolvedResource, GeoRefError> {
        let name = resource.name.trim();
        let raw_tr = resource.township_range.trim();
        let township_range_used = if raw_tr.is_empty() {
            String::new()
        } else {
            township::normalize(raw_tr, &self.config.default_section)
        };

        let mut reference = None;
        if !township_range_used.is_empty() {
            if let Some(hit) = self.lookup_township(&township_range_used).await? {
                reference = Some(township_reference(&township_range_used, hit));
            }
        }

        if reference.is_none() {
            match self.geocode(name, &township_range_used).await {
                Ok(Some(coord)) => {
                    reference = Some(GeoReference {
                        latitude: coord.latitude,
                        longitude: coord.longitude,
                        precision: None,
                        score: None,
                        uncertainty_radius_m: None,
                        source_description: format!("Geocoded from name: {name}"),
                    });
                }
                Ok(None) => debug!("No geocoding result for '{}'", name),
                Err(e) => warn!("Could not geocode water resource '{}': {}", name, e),
            }
        }

        match &reference {
            Some(r) => info!("'{}' placed via {}", name, r.source_description),
            None => info!("'{}' has no coordinate", name),
        }

        Ok(ResolvedResource {
            resource: resource.clone(),
            township_range_used,
            reference,
        })
    }

    /// Tier 1. Strings without township, range and section tokens are not sent.
    async fn lookup_township(&self, township_range: &str) -> Result<Option<LookupHit>, GeoRefError> {
        if !TownshipRange::is_resolvable(township_range) {
            warn!("Skipping lookup of unresolvable township range '{}'", township_range);
            return Ok(None);
        }
        self.lookup.locate(township_range).await
    }

    /// Tier 2.
    async fn geocode(
        &self,
        name: &str,
        township_range: &str,
    ) -> Result<Option<crate::pipeline::geometry::Coordinate>, ResolveError> {
        let query = if !township_range.is_empty() {
            township_range.to_string()
        } else if !name.is_empty() {
            format!("{}, {}", name, self.config.geocode_region)
        } else {
            return Err(ResolveError::EmptyQuery);
        };
        self.geocoder
            .geocode(&query, &self.config.geocode_country_codes)
            .await
    }
}

fn township_reference(township_range: &str, hit: LookupHit) -> GeoReference {
    GeoReference {
        latitude: hit.coordinate.latitude,
        longitude: hit.coordinate.longitude,
        precision: hit.precision,
        score: hit.score,
        uncertainty_radius_m: hit.uncertainty_radius_m,
        source_description: format!("Township-Range: {township_range}"),
    }
}
