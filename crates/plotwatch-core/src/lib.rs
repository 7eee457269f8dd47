use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

mod cloud;
mod display;
mod error;
pub mod geo;
mod map;
mod normalize;
mod notify;
mod pipeline;
pub mod reconcile;
pub mod retry;
pub mod store;

pub use cloud::CloudDrive;
pub use display::{create_listing_table, ListingTableRow};
pub use error::{PlotwatchError, Result};
pub use geo::{
    CountyTable, Gazetteer, GeoResolver, Geocoder, NominatimGeocoder, Resolution, ResolverConfig,
};
pub use map::MapRenderer;
pub use normalize::{clean_price, normalize};
pub use notify::{compose_messages, Notifier, NotifierConfig, TelegramNotifier};
pub use pipeline::{CancelToken, Pipeline, RunOutcome, RunSummary};
pub use reconcile::{reconcile, Reconciliation};
pub use retry::{Backoff, RetryPolicy};
pub use store::{open_store, CsvStore, ListingStore, SqliteStore};

/// Sentinel for text fields the scraper could not extract.
pub const UNKNOWN: &str = "unknown";

/// Listing price as scraped: a plain PLN amount, some other text, or nothing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Price {
    Amount(u64),
    Text(String),
    Unknown,
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Price::Amount(amount) => write!(f, "{}", amount),
            Price::Text(text) => write!(f, "{}", text),
            Price::Unknown => write!(f, "{}", UNKNOWN),
        }
    }
}

impl FromStr for Price {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case(UNKNOWN) {
            return Ok(Price::Unknown);
        }
        Ok(match s.parse::<u64>() {
            Ok(amount) => Price::Amount(amount),
            Err(_) => Price::Text(s.to_string()),
        })
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        // Infallible
        Ok(raw.parse().unwrap_or(Price::Unknown))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lon)
    }
}

/// Great-circle distance in kilometers.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Raw fields as pulled out of a listing page, before any cleanup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    pub title: Option<String>,
    pub price: Option<String>,
    pub location: Option<String>,
    pub link: Option<String>,
}

/// One listing at one candidate location. Several records may share a link
/// when the location text matched more than one plausible place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Location")]
    pub location_text: String,
    #[serde(rename = "Price at first find")]
    pub price_at_first_find: Option<Price>,
    #[serde(rename = "Date first found")]
    pub date_first_found: Option<NaiveDate>,
    #[serde(rename = "Date last updated")]
    pub date_last_updated: NaiveDate,
    #[serde(rename = "Price last updated")]
    pub price_last_updated: Price,
    #[serde(rename = "Distance (km)")]
    pub distance_km: Option<f64>,
    #[serde(rename = "Active")]
    pub active: bool,
    #[serde(rename = "Link")]
    pub link: String,
    #[serde(rename = "Latitude")]
    pub latitude: Option<f64>,
    #[serde(rename = "Longitude")]
    pub longitude: Option<f64>,
}

/// Uniqueness key of a record: link plus the exact coordinate bits.
pub type RecordKey = (String, Option<u64>, Option<u64>);

impl ListingRecord {
    pub fn key(&self) -> RecordKey {
        (
            self.link.clone(),
            self.latitude.map(f64::to_bits),
            self.longitude.map(f64::to_bits),
        )
    }

    pub fn has_link(&self) -> bool {
        !self.link.is_empty() && self.link != UNKNOWN
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        }
    }

    /// Copy of this record placed at one resolved location.
    pub fn located_at(&self, resolution: &Resolution) -> Self {
        Self {
            distance_km: Some(resolution.distance_km),
            latitude: Some(resolution.coordinates.lat),
            longitude: Some(resolution.coordinates.lon),
            ..self.clone()
        }
    }
}
