use crate::support::{day, raw, resolver, TableGeocoder};
use plotwatch_core::store::HEADERS;
use plotwatch_core::{CsvStore, ListingStore, MapRenderer, Pipeline, ResolverConfig, SqliteStore};
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn test_export_sqlite_to_csv() {
    let temp_dir = tempdir().unwrap();
    let db = SqliteStore::open(temp_dir.path().join("listings.db")).await.unwrap();
    let resolver = resolver(Arc::new(TableGeocoder::default()));

    let batch = vec![
        raw("https://x/1", "Działka, \"widokowa\"", "Skawina", "100 000 zł"),
        raw("https://x/2", "Działka rolna", "Mogilany", "Zapytaj o cenę"),
    ];
    Pipeline::new(&resolver, &db).run(&batch, day(10)).await.unwrap();

    let export_path = temp_dir.path().join("export").join("listings.csv");
    let export = CsvStore::new(&export_path);
    export.save_all(&db.load_all().await.unwrap()).await.unwrap();

    let content = fs::read_to_string(&export_path).unwrap();
    assert_eq!(content.lines().next().unwrap(), HEADERS.join(","));
    assert!(content.contains("Zapytaj o cenę"));
    assert_eq!(export.load_all().await.unwrap(), db.load_all().await.unwrap());
}

#[tokio::test]
async fn test_map_from_stored_listings() {
    let temp_dir = tempdir().unwrap();
    let store = CsvStore::new(temp_dir.path().join("otodom.csv"));
    let resolver = resolver(Arc::new(TableGeocoder::default()));

    let batch = vec![
        raw("https://x/1", "Pierwsza", "Skawina", "1 zł"),
        raw("https://x/2", "Druga", "Skawina", "2 zł"),
        raw("https://x/3", "Bez lokalizacji", "Mogilany", "3 zł"),
    ];
    Pipeline::new(&resolver, &store).run(&batch, day(10)).await.unwrap();

    let map_path = temp_dir.path().join("otodom.html");
    MapRenderer::new(ResolverConfig::default().reference, "Kraków")
        .write(&map_path, &store.load_all().await.unwrap())
        .unwrap();

    let html = fs::read_to_string(&map_path).unwrap();
    // Reference point plus one shared Skawina marker.
    assert_eq!(html.matches("L.marker(").count(), 2);
    assert!(html.contains("2 listings in this location"));
    assert!(!html.contains("Bez lokalizacji"));
}
