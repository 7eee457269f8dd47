use async_trait::async_trait;
use chrono::NaiveDate;
use plotwatch_core::{
    Backoff, Coordinates, CountyTable, Gazetteer, GeoResolver, Geocoder, PlotwatchError,
    RawListing, ResolverConfig, Result, RetryPolicy,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Answers from a fixed table; unknown queries fail like an unreachable service.
#[derive(Default)]
pub struct TableGeocoder {
    places: HashMap<String, Vec<Coordinates>>,
    calls: AtomicUsize,
}

impl TableGeocoder {
    pub fn with(mut self, query: &str, places: Vec<Coordinates>) -> Self {
        self.places.insert(query.to_string(), places);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for TableGeocoder {
    async fn search(&self, query: &str) -> Result<Vec<Coordinates>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.places
            .get(query)
            .cloned()
            .ok_or_else(|| PlotwatchError::Geocoding(format!("no route to host for {:?}", query)))
    }
}

pub const GAZETTEER: &str = "\
# town|lat|lon
kraków|50.0647|19.9450
skawina|49.9753|19.8283
zabierzów|50.1145|19.7993
zabierzów|49.9400|20.4500
gdańsk|54.3520|18.6466
";

pub fn resolver(geocoder: Arc<TableGeocoder>) -> GeoResolver {
    GeoResolver::new(
        ResolverConfig {
            min_call_interval: Duration::ZERO,
            ..ResolverConfig::default()
        },
        Gazetteer::parse(GAZETTEER),
        CountyTable::malopolska(),
        geocoder,
        RetryPolicy::new(3, Backoff::Fixed(Duration::ZERO), Duration::from_secs(5)),
    )
}

pub fn raw(link: &str, title: &str, location: &str, price: &str) -> RawListing {
    RawListing {
        title: Some(title.to_string()),
        price: Some(price.to_string()),
        location: Some(location.to_string()),
        link: Some(link.to_string()),
    }
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}
