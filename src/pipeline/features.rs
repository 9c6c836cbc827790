//! Bounding-box derivation and GeoJSON feature-collection assembly.

use crate::error::GeoRefError;
use crate::pipeline::geometry::{BoundingBox, Coordinate, GeoReference};
use crate::pipeline::resolve::Resolution;
use serde::{Deserialize, Serialize};

/// Which coordinate set the map boundary was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundarySource {
    MapTownshipRanges,
    WaterResources,
    None,
}

impl BoundarySource {
    pub fn description(&self) -> &'static str {
        match self {
            BoundarySource::MapTownshipRanges => "Derived from Map-Level Township Ranges",
            BoundarySource::WaterResources => "Fallback from Water Resource Coordinates",
            BoundarySource::None => "No coordinates available",
        }
    }
}

/// The map's derived spatial extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapExtent {
    pub bbox: Option<BoundingBox>,
    pub source: BoundarySource,
}

impl MapExtent {
    pub fn center(&self) -> Option<Coordinate> {
        self.bbox.map(|b| b.center())
    }
}

/// Map-level coordinates take priority; resource coordinates are the fallback.
pub fn derive_extent(map_refs: &[GeoReference], resource_refs: &[GeoReference]) -> MapExtent {
    let (basis, source) = if !map_refs.is_empty() {
        (map_refs, BoundarySource::MapTownshipRanges)
    } else if !resource_refs.is_empty() {
        (resource_refs, BoundarySource::WaterResources)
    } else {
        return MapExtent {
            bbox: None,
            source: BoundarySource::None,
        };
    };
    MapExtent {
        bbox: BoundingBox::from_coordinates(basis.iter().map(GeoReference::coordinate)),
        source,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionTag {
    #[default]
    FeatureCollection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureTag {
    #[default]
    Feature,
}

/// A GeoJSON `FeatureCollection`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: CollectionTag,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: FeatureTag,
    pub geometry: Geometry,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point([f64; 2]),
    Polygon(Vec<Vec<[f64; 2]>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Properties {
    Boundary(BoundaryProperties),
    Water(WaterProperties),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryProperties {
    pub name: String,
    pub source: String,
    pub map_township_ranges_used: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterProperties {
    pub name: String,
    #[serde(rename = "type")]
    pub feature_type: String,
    pub coordinate_source: String,
    pub township_range_used: String,
}

impl FeatureCollection {
    /// Boundary polygon first (when there is an extent), then one point per
    /// resolved resource in extraction order.
    pub fn assemble(resolution: &Resolution, extent: &MapExtent) -> Self {
        let mut features = Vec::with_capacity(resolution.resources.len() + 1);

        if let Some(bbox) = extent.bbox {
            features.push(Feature {
                kind: FeatureTag::Feature,
                geometry: Geometry::Polygon(vec![bbox.ring().to_vec()]),
                properties: Properties::Boundary(BoundaryProperties {
                    name: "Map Boundary".to_string(),
                    source: extent.source.description().to_string(),
                    map_township_ranges_used: resolution.map_township_ranges.clone(),
                }),
            });
        }

        for resolved in &resolution.resources {
            let Some(reference) = &resolved.reference else {
                continue;
            };
            features.push(Feature {
                kind: FeatureTag::Feature,
                geometry: Geometry::Point(reference.coordinate().position()),
                properties: Properties::Water(WaterProperties {
                    name: resolved.resource.name.trim().to_string(),
                    feature_type: resolved.resource.feature_type.trim().to_string(),
                    coordinate_source: reference.source_description.clone(),
                    township_range_used: resolved.township_range_used.clone(),
                }),
            });
        }

        Self {
            kind: CollectionTag::FeatureCollection,
            features,
        }
    }

    /// Bounding box recovered from the boundary polygon, if there is one.
    pub fn boundary(&self) -> Option<BoundingBox> {
        self.features.iter().find_map(|f| match (&f.geometry, &f.properties) {
            (Geometry::Polygon(rings), Properties::Boundary(_)) => {
                rings.first().and_then(|ring| BoundingBox::from_ring(ring))
            }
            _ => None,
        })
    }

    pub fn point_count(&self) -> usize {
        self.features
            .iter()
            .filter(|f| matches!(f.geometry, Geometry::Point(_)))
            .count()
    }

    /// Two-space indented JSON, as published.
    pub fn to_pretty_json(&self) -> Result<String, GeoRefError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| GeoRefError::Internal(format!("GeoJSON serialisation: {e}")))
    }
}
