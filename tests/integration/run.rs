use crate::support::{day, raw, resolver, TableGeocoder};
use plotwatch_core::{open_store, CsvStore, ListingStore, Pipeline, Price, SqliteStore};
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn test_runs_accumulate_history_in_csv() {
    let temp_dir = tempdir().unwrap();
    let store = CsvStore::new(temp_dir.path().join("otodom.csv"));
    let resolver = resolver(Arc::new(TableGeocoder::default()));
    let pipeline = Pipeline::new(&resolver, &store);

    let first = vec![
        raw("https://www.otodom.pl/pl/oferta/1", "Działka 1000 m²", "Skawina, krakowski", "100 000 zł"),
        raw("https://www.otodom.pl/pl/oferta/2", "Działka rolna", "Kraków (Nowa Huta)", "250 000 zł"),
    ];
    pipeline.run(&first, day(1)).await.unwrap();

    let second = vec![raw(
        "https://www.otodom.pl/pl/oferta/1",
        "Działka 1000 m², obniżka",
        "Skawina, krakowski",
        "120 000 zł",
    )];
    let outcome = pipeline.run(&second, day(8)).await.unwrap();
    assert_eq!(outcome.summary.deactivated, 1);
    assert_eq!(outcome.summary.new_listings, 0);

    let stored = store.load_all().await.unwrap();
    assert_eq!(stored.len(), 2);

    let kept = stored.iter().find(|r| r.link.ends_with("/1")).unwrap();
    assert_eq!(kept.price_at_first_find, Some(Price::Amount(100_000)));
    assert_eq!(kept.price_last_updated, Price::Amount(120_000));
    assert_eq!(kept.date_first_found, Some(day(1)));
    assert_eq!(kept.date_last_updated, day(8));
    assert_eq!(kept.title, "Działka 1000 m², obniżka");
    assert!(kept.active);

    let gone = stored.iter().find(|r| r.link.ends_with("/2")).unwrap();
    assert!(!gone.active);
    assert_eq!(gone.distance_km, Some(0.0));
    assert_eq!(gone.date_last_updated, day(1));
    assert_eq!(gone.price_last_updated, Price::Amount(250_000));
}

#[tokio::test]
async fn test_unreachable_geocoder_keeps_listing_without_coordinates() {
    let temp_dir = tempdir().unwrap();
    let store = CsvStore::new(temp_dir.path().join("olx.csv"));
    let geocoder = Arc::new(TableGeocoder::default());
    let resolver = resolver(geocoder.clone());

    let batch = vec![raw("https://www.olx.pl/d/oferta/a", "Działka", "Mogilany", "90 000 zł")];
    let outcome = Pipeline::new(&resolver, &store).run(&batch, day(2)).await.unwrap();

    assert_eq!(geocoder.calls(), 3);
    assert_eq!(outcome.summary.unresolved, 1);

    let stored = store.load_all().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].latitude, None);
    assert_eq!(stored[0].longitude, None);
    assert_eq!(stored[0].distance_km, None);
    assert!(stored[0].active);
}

#[tokio::test]
async fn test_far_gazetteer_town_skips_geocoder() {
    let temp_dir = tempdir().unwrap();
    let store = CsvStore::new(temp_dir.path().join("olx.csv"));
    let geocoder = Arc::new(TableGeocoder::default());
    let resolver = resolver(geocoder.clone());

    let batch = vec![raw("https://www.olx.pl/d/oferta/b", "Działka nad morzem", "Gdańsk", "1 zł")];
    Pipeline::new(&resolver, &store).run(&batch, day(2)).await.unwrap();

    assert_eq!(geocoder.calls(), 0);
    assert_eq!(store.load_all().await.unwrap()[0].coordinates(), None);
}

#[tokio::test]
async fn test_county_hint_query_and_fan_out_in_sqlite() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("listings.db");
    let store = SqliteStore::open(&db_path).await.unwrap();
    let geocoder = Arc::new(
        TableGeocoder::default().with(
            "brzezie, wielicki county, Małopolskie, Poland",
            vec![
                plotwatch_core::Coordinates::new(49.9700, 20.1300),
                plotwatch_core::Coordinates::new(49.9200, 20.0500),
            ],
        ),
    );
    let resolver = resolver(geocoder.clone());

    let batch = vec![
        raw("https://www.otodom.pl/pl/oferta/z", "Działka", "Zabierzów", "200 000 zł"),
        raw("https://www.otodom.pl/pl/oferta/b", "Działka", "Brzezie, wielicki", "150 000 zł"),
    ];
    let outcome = Pipeline::new(&resolver, &store)
        .with_county_hint("powiat wielicki")
        .run(&batch, day(3))
        .await
        .unwrap();

    assert_eq!(geocoder.calls(), 1);
    assert_eq!(outcome.summary.resolved, 2);
    assert_eq!(outcome.summary.total_stored, 4);

    // Reopened through the extension-based factory.
    let reopened = open_store(&db_path).await.unwrap();
    let stored = reopened.load_all().await.unwrap();
    assert_eq!(stored.len(), 4);
    assert_eq!(stored.iter().filter(|r| r.link.ends_with("/z")).count(), 2);
    assert_eq!(stored.iter().filter(|r| r.link.ends_with("/b")).count(), 2);
    assert!(stored.iter().all(|r| r.distance_km.is_some()));
}

#[tokio::test]
async fn test_rerun_with_same_batch_is_stable() {
    let temp_dir = tempdir().unwrap();
    let store = CsvStore::new(temp_dir.path().join("otodom.csv"));
    let resolver = resolver(Arc::new(TableGeocoder::default()));
    let pipeline = Pipeline::new(&resolver, &store);

    let batch = vec![
        raw("https://x/1", "A", "Zabierzów", "1 zł"),
        raw("https://x/2", "B", "Skawina", "2 zł"),
    ];
    let first = pipeline.run(&batch, day(5)).await.unwrap();
    let second = pipeline.run(&batch, day(5)).await.unwrap();
    assert_eq!(first.records, second.records);
    assert_eq!(second.summary.new_listings, 0);
}
