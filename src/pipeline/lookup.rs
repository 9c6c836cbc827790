//! Township-range → coordinate lookup.
//!
//! [`TownshipLookup`] is the capability the resolver calls; the production
//! implementation, [`GeoLocateClient`], talks to the GEOLocate `Georef2`
//! SOAP operation, which understands PLSS locality strings and returns a
//! WGS84 point with a precision label, score and uncertainty radius.
//!
//! "Not found" is `Ok(None)`. Transport failures and non-2xx statuses are
//! errors and fail the invocation.

use crate::error::GeoRefError;
use crate::pipeline::geometry::Coordinate;
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, info};

/// Default GEOLocate SOAP endpoint.
pub const GEOLOCATE_ENDPOINT: &str =
    "http://www.geo-locate.org/webservices/geolocatesvcv2/geolocatesvc.asmx";

const SOAP_ACTION: &str = "http://geo-locate.org/webservices/Georef2";

/// A successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupHit {
    pub coordinate: Coordinate,
    pub precision: Option<String>,
    pub score: Option<i64>,
    pub uncertainty_radius_m: Option<f64>,
}

/// Resolves a normalised township-range string to a coordinate.
#[async_trait]
pub trait TownshipLookup: Send + Sync {
    async fn locate(&self, locality: &str) -> Result<Option<LookupHit>, GeoRefError>;
}

/// GEOLocate web-service client.
#[derive(Debug, Clone)]
pub struct GeoLocateClient {
    client: reqwest::Client,
    endpoint: String,
    country: String,
    state: String,
}

impl GeoLocateClient {
    /// Client for the public endpoint, restricted to `country` / `state`.
    pub fn new(country: impl Into<String>, state: impl Into<String>) -> Result<Self, GeoRefError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GeoRefError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: GEOLOCATE_ENDPOINT.to_string(),
            country: country.into(),
            state: state.into(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn envelope(&self, locality: &str) -> String {
        use quick_xml::escape::escape;
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
               xmlns:xsd="http://www.w3.org/2001/XMLSchema"
               xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <Georef2 xmlns="http://geo-locate.org/webservices/">
      <Country>{country}</Country>
      <State>{state}</State>
      <County></County>
      <LocalityString>{locality}</LocalityString>
      <HwyX>true</HwyX>
      <FindWaterbody>true</FindWaterbody>
      <RestrictToLowestAdm>false</RestrictToLowestAdm>
      <doUncert>true</doUncert>
      <doPoly>true</doPoly>
      <displacePoly>false</displacePoly>
      <polyAsLinkID>false</polyAsLinkID>
      <LanguageKey>0</LanguageKey>
    </Georef2>
  </soap:Body>
</soap:Envelope>"#,
            country = escape(self.country.as_str()),
            state = escape(self.state.as_str()),
            locality = escape(locality),
        )
    }
}

#[async_trait]
impl TownshipLookup for GeoLocateClient {
    async fn locate(&self, locality: &str) -> Result<Option<LookupHit>, GeoRefError> {
        let failed = |detail: String| GeoRefError::LookupFailed {
            locality: locality.to_string(),
            detail,
        };

        debug!("GEOLocate request for '{}'", locality);
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", SOAP_ACTION)
            .body(self.envelope(locality))
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }

        let body = response.text().await.map_err(|e| failed(e.to_string()))?;
        let hit = parse_georef2_response(&body).map_err(failed)?;
        match &hit {
            Some(h) => info!(
                "GEOLocate '{}' → ({}, {}) precision {:?}",
                locality, h.coordinate.latitude, h.coordinate.longitude, h.precision
            ),
            None => info!("GEOLocate '{}' → no result", locality),
        }
        Ok(hit)
    }
}

/// Read the first `ResultSet` of a `Georef2Response`.
///
/// Namespace prefixes are ignored; only local names are matched.
pub fn parse_georef2_response(xml: &str) -> Result<Option<LookupHit>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut in_result_set = false;
    let (mut lat, mut lon): (Option<f64>, Option<f64>) = (None, None);
    let mut precision = None;
    let mut score = None;
    let mut uncertainty = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"ResultSet" {
                    in_result_set = true;
                }
                path.push(name);
            }
            Ok(Event::End(e)) => {
                path.pop();
                if in_result_set && e.local_name().as_ref() == b"ResultSet" {
                    break;
                }
            }
            Ok(Event::Text(t)) if in_result_set && path.len() >= 2 => {
                let text = t.unescape().map_err(|e| format!("invalid XML text: {e}"))?;
                let text = text.trim();
                let n = path.len();
                match (path[n - 2].as_slice(), path[n - 1].as_slice()) {
                    (b"WGS84Coordinate", b"Latitude") => lat = text.parse().ok(),
                    (b"WGS84Coordinate", b"Longitude") => lon = text.parse().ok(),
                    (b"ResultSet", b"Precision") => precision = Some(text.to_string()),
                    (b"ResultSet", b"Score") => score = text.parse().ok(),
                    (b"ResultSet", b"UncertaintyRadiusMeters") => uncertainty = text.parse().ok(),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "malformed response at byte {}: {e}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
    }

    Ok(match (lat, lon) {
        (Some(latitude), Some(longitude)) => Some(LookupHit {
            coordinate: Coordinate::new(latitude, longitude),
            precision,
            score,
            uncertainty_radius_m: uncertainty,
        }),
        _ => None,
    })
}
