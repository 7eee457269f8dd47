use crate::{Coordinates, PlotwatchError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Free-text place search.
///
/// `Ok(vec![])` means the service answered and knows no such place; `Err`
/// means the call itself failed and may be retried.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Coordinates>>;
}

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
const MAX_CANDIDATES: u8 = 5;

/// OpenStreetMap Nominatim client. Rate limiting is left to the caller.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    pub fn new(user_agent: &str) -> Result<Self> {
        Self::with_endpoint(user_agent, NOMINATIM_URL)
    }

    pub fn with_endpoint(user_agent: &str, endpoint: &str) -> Result<Self> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn search(&self, query: &str) -> Result<Vec<Coordinates>> {
        debug!("Geocoding query: {}", query);
        let limit = MAX_CANDIDATES.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json"), ("limit", limit.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(PlotwatchError::Geocoding(format!(
                "{} answered HTTP {}",
                self.endpoint, status
            )));
        }
        if !status.is_success() {
            return Err(PlotwatchError::Geocoding(format!(
                "unexpected HTTP {} for {:?}",
                status, query
            )));
        }

        let places: Vec<NominatimPlace> = response.json().await?;
        Ok(parse_places(places))
    }
}

fn parse_places(places: Vec<NominatimPlace>) -> Vec<Coordinates> {
    places
        .into_iter()
        .filter_map(|place| {
            let lat = place.lat.parse::<f64>().ok()?;
            let lon = place.lon.parse::<f64>().ok()?;
            Some(Coordinates::new(lat, lon))
        })
        .collect()
}
