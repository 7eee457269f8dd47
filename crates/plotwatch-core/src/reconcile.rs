//! Merging a fresh scrape into the persisted listing set.
//!
//! Listings are matched by link. A matched listing keeps the price and date it
//! was first seen with; a listing that vanished from the scrape stays in the
//! set, untouched apart from `active = false`. Nothing is ever deleted.

use crate::{ListingRecord, Price, RecordKey};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// The merged set, sorted by `(link, latitude, longitude)`.
    pub records: Vec<ListingRecord>,
    /// Current-batch records that had no usable link.
    pub rejected: Vec<ListingRecord>,
    /// Links seen for the first time in this batch.
    pub new_links: Vec<String>,
    /// Links that were active before and are missing from this batch.
    pub deactivated_links: Vec<String>,
}

impl Reconciliation {
    /// One active record per link that first appeared in this batch, the
    /// first of its link in canonical order.
    pub fn new_active(&self) -> Vec<&ListingRecord> {
        let mut pending: HashSet<&str> = self.new_links.iter().map(String::as_str).collect();
        self.records
            .iter()
            .filter(|r| r.active && pending.remove(r.link.as_str()))
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.records.iter().filter(|r| r.active).count()
    }
}

struct FirstSeen {
    price: Option<Price>,
    date: Option<NaiveDate>,
}

/// Merges `current` into `previous`. The result does not depend on the order
/// of either input.
pub fn reconcile(previous: &[ListingRecord], current: &[ListingRecord]) -> Reconciliation {
    let first_seen = index_first_seen(previous);

    let mut rejected = Vec::new();
    let mut batch: BTreeMap<RecordKey, ListingRecord> = BTreeMap::new();
    for record in current {
        if !record.has_link() {
            warn!("Rejecting listing without link: {:?}", record.title);
            rejected.push(record.clone());
            continue;
        }
        keep_preferred(&mut batch, record.clone());
    }
    rejected.sort_by(content_order);

    let current_links: BTreeSet<String> = batch.values().map(|r| r.link.clone()).collect();

    let mut merged: BTreeMap<RecordKey, ListingRecord> = BTreeMap::new();
    for (key, mut record) in batch {
        match first_seen.get(record.link.as_str()) {
            Some(seen) => {
                record.price_at_first_find = seen
                    .price
                    .clone()
                    .or_else(|| Some(record.price_last_updated.clone()));
                record.date_first_found = seen.date.or(Some(record.date_last_updated));
            }
            None => {
                record.price_at_first_find = record
                    .price_at_first_find
                    .take()
                    .or_else(|| Some(record.price_last_updated.clone()));
                record.date_first_found = record.date_first_found.or(Some(record.date_last_updated));
            }
        }
        record.active = true;
        merged.insert(key, record);
    }

    let mut deactivated = BTreeSet::new();
    for record in previous {
        if current_links.contains(&record.link) {
            continue;
        }
        if record.active {
            deactivated.insert(record.link.clone());
        }
        let mut retained = record.clone();
        retained.active = false;
        keep_preferred(&mut merged, retained);
    }

    let new_links: Vec<String> = current_links
        .iter()
        .filter(|link| !first_seen.contains_key(link.as_str()))
        .cloned()
        .collect();

    debug!(
        "Reconciled {} current against {} previous: {} merged, {} new, {} deactivated, {} rejected",
        current.len(),
        previous.len(),
        merged.len(),
        new_links.len(),
        deactivated.len(),
        rejected.len()
    );

    Reconciliation {
        records: merged.into_values().collect(),
        rejected,
        new_links,
        deactivated_links: deactivated.into_iter().collect(),
    }
}

// With fan-out a link has several previous rows; the earliest sighting wins.
fn index_first_seen(previous: &[ListingRecord]) -> HashMap<&str, FirstSeen> {
    let mut index: HashMap<&str, FirstSeen> = HashMap::new();
    for record in previous {
        let candidate = FirstSeen {
            price: record.price_at_first_find.clone(),
            date: record.date_first_found,
        };
        match index.entry(record.link.as_str()) {
            Entry::Occupied(mut existing) => {
                if earlier(&candidate, existing.get()) {
                    existing.insert(candidate);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(candidate);
            }
        }
    }
    index
}

fn earlier(a: &FirstSeen, b: &FirstSeen) -> bool {
    let rank = |s: &FirstSeen| (s.date.is_none(), s.date, s.price.is_none(), s.price.clone());
    rank(a) < rank(b)
}

// Duplicate keys collapse onto the smallest record so input order never leaks.
fn keep_preferred(records: &mut BTreeMap<RecordKey, ListingRecord>, record: ListingRecord) {
    let key = record.key();
    let replace = records
        .get(&key)
        .map_or(true, |existing| content_order(&record, existing) == Ordering::Less);
    if replace {
        records.insert(key, record);
    }
}

fn content_order(a: &ListingRecord, b: &ListingRecord) -> Ordering {
    a.title
        .cmp(&b.title)
        .then_with(|| a.location_text.cmp(&b.location_text))
        .then_with(|| a.price_last_updated.cmp(&b.price_last_updated))
        .then_with(|| a.date_last_updated.cmp(&b.date_last_updated))
        .then_with(|| a.price_at_first_find.cmp(&b.price_at_first_find))
        .then_with(|| a.date_first_found.cmp(&b.date_first_found))
        .then_with(|| a.active.cmp(&b.active))
        .then_with(|| {
            a.distance_km
                .map(f64::to_bits)
                .cmp(&b.distance_km.map(f64::to_bits))
        })
        .then_with(|| a.key().cmp(&b.key()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UNKNOWN;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn listing(link: &str, price: u64, day: &str) -> ListingRecord {
        ListingRecord {
            title: format!("Działka {}", link),
            location_text: "Zabierzów, krakowski".to_string(),
            price_at_first_find: None,
            date_first_found: None,
            date_last_updated: date(day),
            price_last_updated: Price::Amount(price),
            distance_km: Some(14.2),
            active: true,
            link: link.to_string(),
            latitude: Some(50.114),
            longitude: Some(19.799),
        }
    }

    fn persisted(link: &str, first_price: u64, first_day: &str) -> ListingRecord {
        ListingRecord {
            price_at_first_find: Some(Price::Amount(first_price)),
            date_first_found: Some(date(first_day)),
            ..listing(link, first_price, first_day)
        }
    }

    #[test]
    fn test_matched_listing_keeps_first_seen_values() {
        let previous = vec![persisted("L1", 100, "2024-01-01")];
        let current = vec![listing("L1", 120, "2024-02-01")];

        let result = reconcile(&previous, &current);
        assert_eq!(result.records.len(), 1);
        let merged = &result.records[0];
        assert_eq!(merged.price_at_first_find, Some(Price::Amount(100)));
        assert_eq!(merged.date_first_found, Some(date("2024-01-01")));
        assert_eq!(merged.price_last_updated, Price::Amount(120));
        assert_eq!(merged.date_last_updated, date("2024-02-01"));
        assert!(merged.active);
        assert!(result.new_links.is_empty());
    }

    #[test]
    fn test_vanished_listing_is_deactivated_not_deleted() {
        let previous = vec![persisted("L1", 100, "2024-01-01")];

        let result = reconcile(&previous, &[]);
        assert_eq!(result.records.len(), 1);
        let mut expected = previous[0].clone();
        expected.active = false;
        assert_eq!(result.records[0], expected);
        assert_eq!(result.deactivated_links, vec!["L1".to_string()]);
    }

    #[test]
    fn test_new_listing_uses_own_values_as_first_seen() {
        let result = reconcile(&[], &[listing("L2", 90_000, "2024-03-01")]);
        let record = &result.records[0];
        assert_eq!(record.price_at_first_find, Some(Price::Amount(90_000)));
        assert_eq!(record.date_first_found, Some(date("2024-03-01")));
        assert_eq!(result.new_links, vec!["L2".to_string()]);
        assert_eq!(result.new_active().len(), 1);
    }

    #[test]
    fn test_already_inactive_listing_is_not_reported_again() {
        let mut old = persisted("L1", 100, "2024-01-01");
        old.active = false;

        let result = reconcile(&[old.clone()], &[]);
        assert_eq!(result.records, vec![old]);
        assert!(result.deactivated_links.is_empty());
    }

    #[test]
    fn test_reappearing_listing_becomes_active_again() {
        let mut old = persisted("L1", 100, "2024-01-01");
        old.active = false;

        let result = reconcile(&[old], &[listing("L1", 95, "2024-04-01")]);
        assert!(result.records[0].active);
        assert_eq!(result.records[0].price_at_first_find, Some(Price::Amount(100)));
    }

    #[test]
    fn test_fan_out_records_share_first_seen_values() {
        let previous = vec![persisted("L1", 100, "2024-01-01")];
        let mut second_place = listing("L1", 110, "2024-02-01");
        second_place.latitude = Some(49.95);
        second_place.longitude = Some(20.10);
        let current = vec![listing("L1", 110, "2024-02-01"), second_place];

        let result = reconcile(&previous, &current);
        assert_eq!(result.records.len(), 2);
        for record in &result.records {
            assert_eq!(record.link, "L1");
            assert_eq!(record.price_at_first_find, Some(Price::Amount(100)));
            assert_eq!(record.date_first_found, Some(date("2024-01-01")));
        }
    }

    #[test]
    fn test_new_active_lists_each_link_once() {
        let mut second_place = listing("L1", 110, "2024-02-01");
        second_place.latitude = Some(49.95);
        second_place.longitude = Some(20.10);
        let current = vec![second_place, listing("L1", 110, "2024-02-01")];

        let result = reconcile(&[], &current);
        assert_eq!(result.records.len(), 2);
        let fresh = result.new_active();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0], &result.records[0]);
    }

    #[test]
    fn test_earliest_previous_sighting_wins() {
        let mut later = persisted("L1", 150, "2024-02-01");
        later.latitude = Some(49.9);
        let previous = vec![later, persisted("L1", 100, "2024-01-01")];

        let result = reconcile(&previous, &[listing("L1", 160, "2024-03-01")]);
        let active: Vec<_> = result.records.iter().filter(|r| r.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].price_at_first_find, Some(Price::Amount(100)));
        assert_eq!(active[0].date_first_found, Some(date("2024-01-01")));
    }

    #[test]
    fn test_records_without_link_are_rejected_individually() {
        let mut broken = listing(UNKNOWN, 1, "2024-03-01");
        broken.title = "Brak linku".to_string();
        let current = vec![broken, listing("L3", 200, "2024-03-01")];

        let result = reconcile(&[], &current);
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].title, "Brak linku");
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].link, "L3");
    }

    #[test]
    fn test_order_independent() {
        let previous = vec![
            persisted("L1", 100, "2024-01-01"),
            persisted("L2", 200, "2024-01-05"),
            persisted("L9", 900, "2023-12-24"),
        ];
        let mut dup_a = listing("L4", 400, "2024-02-01");
        dup_a.title = "A".to_string();
        let mut dup_b = listing("L4", 400, "2024-02-01");
        dup_b.title = "B".to_string();
        let mut current = vec![
            listing("L1", 120, "2024-02-01"),
            listing("L3", 300, "2024-02-01"),
            dup_a,
            listing("L2", 180, "2024-02-01"),
            dup_b,
        ];

        let expected = reconcile(&previous, &current);
        for _ in 0..current.len() {
            current.rotate_left(1);
            assert_eq!(reconcile(&previous, &current), expected);
        }
        current.reverse();
        let mut reversed_previous = previous.clone();
        reversed_previous.reverse();
        assert_eq!(reconcile(&reversed_previous, &current), expected);

        let l4: Vec<_> = expected.records.iter().filter(|r| r.link == "L4").collect();
        assert_eq!(l4.len(), 1);
        assert_eq!(l4[0].title, "A");
    }

    #[test]
    fn test_reapplying_same_batch_is_idempotent() {
        let previous = vec![
            persisted("L1", 100, "2024-01-01"),
            persisted("L9", 900, "2023-12-24"),
        ];
        let current = vec![listing("L1", 120, "2024-02-01"), listing("L5", 500, "2024-02-01")];

        let once = reconcile(&previous, &current);
        let twice = reconcile(&once.records, &current);
        assert_eq!(twice.records, once.records);
    }
}
