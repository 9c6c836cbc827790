//! Free-text → coordinate geocoding, the second resolution tier.
//!
//! Failures here are never fatal: the resolver logs them and carries on
//! without a coordinate for that resource.

use crate::error::ResolveError;
use crate::pipeline::geometry::Coordinate;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Default Nominatim instance.
pub const NOMINATIM_ENDPOINT: &str = "https://nominatim.openstreetmap.org";

/// Resolves a free-text place query to a coordinate.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `country_codes` is a comma-separated ISO 3166-1 alpha-2 list.
    async fn geocode(&self, query: &str, country_codes: &str) -> Result<Option<Coordinate>, ResolveError>;
}

/// OpenStreetMap Nominatim search client.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    /// Nominatim's usage policy requires an identifying user agent.
    pub fn new(user_agent: &str, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: NOMINATIM_ENDPOINT.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str, country_codes: &str) -> Result<Option<Coordinate>, ResolveError> {
        let failed = |detail: String| ResolveError::GeocodeFailed {
            query: query.to_string(),
            detail,
        };

        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("limit", "1"),
                ("countrycodes", country_codes),
            ])
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }

        let body = response.text().await.map_err(|e| failed(e.to_string()))?;
        let coordinate = parse_search_response(&body).map_err(failed)?;
        debug!("Nominatim '{}' → {:?}", query, coordinate);
        Ok(coordinate)
    }
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

/// First place of a Nominatim `format=json` search result.
pub fn parse_search_response(body: &str) -> Result<Option<Coordinate>, String> {
    let places: Vec<Place> = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let Some(place) = places.first() else {
        return Ok(None);
    };
    let lat = place.lat.parse::<f64>().map_err(|e| format!("lat {:?}: {e}", place.lat))?;
    let lon = place.lon.parse::<f64>().map_err(|e| format!("lon {:?}: {e}", place.lon))?;
    Ok(Some(Coordinate::new(lat, lon)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_place() {
        let body = r#"[{"place_id": 1, "lat": "40.5465", "lon": "-105.1675", "display_name": "Horsetooth Reservoir"},
                       {"place_id": 2, "lat": "0", "lon": "0"}]"#;
        assert_eq!(
            parse_search_response(body).unwrap(),
            Some(Coordinate::new(40.5465, -105.1675))
        );
    }

    #[test]
    fn empty_result_is_not_found() {
        assert_eq!(parse_search_response("[]").unwrap(), None);
    }

    #[test]
    fn bad_numbers_are_errors() {
        assert!(parse_search_response(r#"[{"lat": "north", "lon": "1"}]"#).is_err());
        assert!(parse_search_response("<html>rate limited</html>").is_err());
    }
}
