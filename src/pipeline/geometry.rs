//! Coordinates, provenance-tagged references and bounding boxes.
//!
//! Longitude comes first wherever coordinates are written as pairs, as in
//! GeoJSON.

use serde::{Deserialize, Serialize};

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// `[longitude, latitude]`.
    pub fn position(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// A resolved coordinate plus how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoReference {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncertainty_radius_m: Option<f64>,
    /// `"Township-Range: …"` or `"Geocoded from name: …"`.
    pub source_description: String,
}

impl GeoReference {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// An axis-aligned rectangle in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

impl BoundingBox {
    /// Smallest box containing every coordinate; `None` for an empty set.
    pub fn from_coordinates<I>(coords: I) -> Option<Self>
    where
        I: IntoIterator<Item = Coordinate>,
    {
        coords.into_iter().fold(None, |acc, c| {
            Some(match acc {
                None => BoundingBox {
                    west: c.longitude,
                    east: c.longitude,
                    south: c.latitude,
                    north: c.latitude,
                },
                Some(b) => BoundingBox {
                    west: b.west.min(c.longitude),
                    east: b.east.max(c.longitude),
                    south: b.south.min(c.latitude),
                    north: b.north.max(c.latitude),
                },
            })
        })
    }

    /// Midpoint of the rectangle.
    pub fn center(&self) -> Coordinate {
        Coordinate::new((self.north + self.south) / 2.0, (self.west + self.east) / 2.0)
    }

    /// Closed polygon ring: SW, SE, NE, NW, SW.
    pub fn ring(&self) -> [[f64; 2]; 5] {
        [
            [self.west, self.south],
            [self.east, self.south],
            [self.east, self.north],
            [self.west, self.north],
            [self.west, self.south],
        ]
    }

    /// `ENVELOPE(west,east,north,south)`.
    pub fn envelope(&self) -> String {
        format!(
            "ENVELOPE({},{},{},{})",
            self.west, self.east, self.north, self.south
        )
    }

    /// Recover the box from a polygon ring.
    ///
    /// Returns `None` for rings that are not closed or have fewer than four
    /// positions.
    pub fn from_ring(ring: &[[f64; 2]]) -> Option<Self> {
        if ring.len() < 4 || ring.first() != ring.last() {
            return None;
        }
        Self::from_coordinates(ring.iter().map(|[lon, lat]| Coordinate::new(*lat, *lon)))
    }

    /// Parse an `ENVELOPE(west,east,north,south)` string.
    pub fn parse_envelope(s: &str) -> Option<Self> {
        let inner = s.trim().strip_prefix("ENVELOPE(")?.strip_suffix(')')?;
        let values: Vec<f64> = inner
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        match values.as_slice() {
            [west, east, north, south] => Some(BoundingBox {
                west: *west,
                east: *east,
                south: *south,
                north: *north,
            }),
            _ => None,
        }
    }
}
