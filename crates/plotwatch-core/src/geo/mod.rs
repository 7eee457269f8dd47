//! Location text to coordinates: local gazetteer first, then the county
//! table, then a live geocoder behind a retry policy.

mod county;
mod gazetteer;
mod geocoder;

pub use county::CountyTable;
pub use gazetteer::Gazetteer;
pub use geocoder::{Geocoder, NominatimGeocoder};

use crate::{haversine_km, Coordinates, RetryPolicy, UNKNOWN};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Distances are measured from here.
    pub reference: Coordinates,
    pub max_distance_km: f64,
    /// Appended to live geocoding queries to keep matches local.
    pub region: String,
    pub country: String,
    /// Minimum spacing between two outbound geocoding calls.
    pub min_call_interval: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            reference: Coordinates::new(50.0647, 19.9450),
            max_distance_km: 50.0,
            region: "Małopolskie".to_string(),
            country: "Poland".to_string(),
            min_call_interval: Duration::from_secs(1),
        }
    }
}

/// A candidate location for a listing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub distance_km: f64,
    pub coordinates: Coordinates,
}

type CacheKey = (String, Option<String>);

pub struct GeoResolver {
    config: ResolverConfig,
    gazetteer: Gazetteer,
    counties: CountyTable,
    geocoder: Arc<dyn Geocoder>,
    retry: RetryPolicy,
    last_call: Mutex<Option<Instant>>,
    cache: Mutex<HashMap<CacheKey, Vec<Resolution>>>,
}

impl GeoResolver {
    pub fn new(
        config: ResolverConfig,
        gazetteer: Gazetteer,
        counties: CountyTable,
        geocoder: Arc<dyn Geocoder>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            config,
            gazetteer,
            counties,
            geocoder,
            retry,
            last_call: Mutex::new(None),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Candidate locations within the configured distance, in the order the
    /// source listed them. Empty when nothing usable was found; never fails.
    pub async fn resolve(&self, location_text: &str, county_hint: Option<&str>) -> Vec<Resolution> {
        let Some(town) = extract_town(location_text) else {
            debug!("No town in location {:?}", location_text);
            return Vec::new();
        };

        let county = county_hint
            .and_then(|hint| self.counties.lookup(hint))
            .map(|(name, _)| name.to_string());
        let key = (town.clone(), county.clone());

        if let Some(cached) = self.cache.lock().await.get(&key) {
            return cached.clone();
        }

        let (resolutions, definitive) = self.lookup(&town, county.as_deref()).await;
        if definitive {
            self.cache.lock().await.insert(key, resolutions.clone());
        }
        resolutions
    }

    // The flag is false only when the live geocoder kept failing, so a later
    // listing in the same town gets another chance.
    async fn lookup(&self, town: &str, county: Option<&str>) -> (Vec<Resolution>, bool) {
        // A gazetteer hit is authoritative, even when every place is too far.
        if let Some(points) = self.gazetteer.lookup(town) {
            let within = self.within_range(points);
            if within.is_empty() {
                info!("{} is in the gazetteer but beyond {} km, rejected", town, self.config.max_distance_km);
            }
            return (within, true);
        }

        if let Some((name, point)) = self.counties.lookup(town) {
            let within = self.within_range(&[point]);
            if within.is_empty() {
                info!("County {} is beyond {} km, rejected", name, self.config.max_distance_km);
            }
            return (within, true);
        }

        let mut exhausted = false;
        for query in self.queries(town, county) {
            let label = format!("Geocoding {:?}", query);
            let query = query.as_str();
            let outcome = self
                .retry
                .run_paced(
                    &label,
                    || self.wait_turn(),
                    move |turn| async move {
                        let found = self.geocoder.search(query).await;
                        drop(turn);
                        found
                    },
                )
                .await;

            match outcome {
                Ok(points) if points.is_empty() => {
                    debug!("No geocoding match for {:?}", query);
                }
                Ok(points) => {
                    let within = self.within_range(&points);
                    if within.is_empty() {
                        info!(
                            "{:?} geocoded beyond {} km, rejected",
                            query, self.config.max_distance_km
                        );
                    }
                    return (within, true);
                }
                Err(e) => {
                    warn!("Giving up on {:?}: {}", query, e);
                    exhausted = true;
                }
            }
        }

        info!("Location not found: {} ({})", town, county.unwrap_or("-"));
        (Vec::new(), !exhausted)
    }

    fn queries(&self, town: &str, county: Option<&str>) -> Vec<String> {
        let mut queries = Vec::with_capacity(2);
        if let Some(county) = county {
            queries.push(format!(
                "{}, {} county, {}, {}",
                town, county, self.config.region, self.config.country
            ));
        }
        queries.push(format!("{}, {}, {}", town, self.config.region, self.config.country));
        queries
    }

    fn within_range(&self, points: &[Coordinates]) -> Vec<Resolution> {
        points
            .iter()
            .map(|point| Resolution {
                distance_km: round_km(haversine_km(self.config.reference, *point)),
                coordinates: *point,
            })
            .filter(|r| r.distance_km <= self.config.max_distance_km)
            .collect()
    }

    // The guard is held through the call so outbound requests never overlap.
    async fn wait_turn(&self) -> MutexGuard<'_, Option<Instant>> {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.config.min_call_interval {
                tokio::time::sleep(self.config.min_call_interval - elapsed).await;
            }
        }
        *last_call = Some(Instant::now());
        last_call
    }
}

fn round_km(km: f64) -> f64 {
    (km * 100.0).round() / 100.0
}

/// Picks the town out of a portal location string.
///
/// `"Zabierzów, krakowski, małopolskie"` gives `zabierzów`,
/// `"ul. Długa, Skawina"` gives `skawina` and `"Kraków (dzielnica X)"` gives
/// `kraków`. Returns `None` for blank or unknown locations.
pub fn extract_town(location: &str) -> Option<String> {
    let parts: Vec<&str> = location.split(',').map(str::trim).collect();
    let first = parts.first().copied().unwrap_or_default();
    let candidate = if first.to_lowercase().starts_with("ul.") && parts.len() > 1 {
        parts[1]
    } else {
        first
    };

    let town = candidate.split('(').next().unwrap_or_default().trim().to_lowercase();
    if town.is_empty() || town == UNKNOWN {
        None
    } else {
        Some(town)
    }
}
