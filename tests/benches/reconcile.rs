use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use plotwatch_core::{reconcile, ListingRecord, Price};
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

// Random listings drawn from a pool of `links` distinct links, some of them
// fanned out over two locations.
fn generate_records(count: usize, links: usize, date: NaiveDate) -> Vec<ListingRecord> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let id = rng.gen_range(0..links);
            let fan_out = rng.gen_bool(0.1);
            let lat = 49.8 + (id % 100) as f64 * 0.005 + if fan_out { 0.1 } else { 0.0 };
            let lon = 19.6 + (id / 100) as f64 * 0.005;
            let price = rng.gen_range(50_000..400_000);
            ListingRecord {
                title: format!("Działka {}", id),
                location_text: "Skawina, krakowski".to_string(),
                price_at_first_find: None,
                date_first_found: None,
                date_last_updated: date,
                price_last_updated: Price::Amount(price),
                distance_km: Some(rng.gen_range(0.0..50.0)),
                active: true,
                link: format!("https://www.otodom.pl/pl/oferta/{}", id),
                latitude: Some(lat),
                longitude: Some(lon),
            }
        })
        .collect()
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(5));

    let first_day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let next_day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

    for size in [100, 1_000, 10_000].iter() {
        let previous = reconcile(&[], &generate_records(*size, size * 2, first_day)).records;
        let current = generate_records(*size, size * 2, next_day);

        group.bench_with_input(BenchmarkId::new("merge", size), size, |b, _| {
            b.iter(|| black_box(reconcile(&previous, &current)));
        });

        let mut shuffled = current.clone();
        shuffled.shuffle(&mut rand::thread_rng());
        group.bench_with_input(BenchmarkId::new("merge_shuffled", size), size, |b, _| {
            b.iter(|| black_box(reconcile(&previous, &shuffled)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reconcile);
criterion_main!(benches);
