use crate::support::{day, resolver, TableGeocoder};
use plotwatch_core::{CsvStore, ListingStore, Pipeline, Price};
use plotwatch_scrapers::{HtmlScraper, ScraperType, SourceProfile};
use std::sync::Arc;
use tempfile::tempdir;

const OLX_PAGE: &str = r#"
<html><body>
<div data-cy="l-card">
    <a href="/d/oferta/dzialka-skawina-CID3-ID1.html#photos"><h4>Działka  budowlana   Skawina</h4></a>
    <p data-testid="ad-price">99 000 zł</p>
    <p data-testid="location-date">Skawina - Dzisiaj o 08:12</p>
</div>
<div data-cy="l-card">
    <a href="/d/oferta/dzialka-skawina-CID3-ID1.html"><h4>Działka budowlana Skawina</h4></a>
    <p data-testid="ad-price">99 000 zł</p>
    <p data-testid="location-date">Skawina - Dzisiaj o 08:12</p>
</div>
<div data-cy="l-card">
    <a href="/d/oferta/dzialka-bez-ceny-CID3-ID2.html"><h4>Działka</h4></a>
    <p data-testid="location-date">Kraków, Podgórze - 12 marca 2024</p>
</div>
</body></html>
"#;

#[tokio::test]
async fn test_scraped_page_flows_into_store() {
    let temp_dir = tempdir().unwrap();
    let store = CsvStore::new(temp_dir.path().join("olx.csv"));
    let resolver = resolver(Arc::new(TableGeocoder::default()));
    let scraper = HtmlScraper::new(SourceProfile::builtin(ScraperType::Olx)).unwrap();

    let raw = scraper.parse_listings(OLX_PAGE);
    assert_eq!(raw.len(), 3);

    let outcome = Pipeline::new(&resolver, &store).run(&raw, day(12)).await.unwrap();
    assert_eq!(outcome.summary.raw_found, 3);
    assert_eq!(outcome.summary.deduplicated, 2);
    assert_eq!(outcome.summary.resolved, 2);

    let stored = store.load_all().await.unwrap();
    assert_eq!(stored.len(), 2);

    let skawina = stored.iter().find(|r| r.link.contains("ID1")).unwrap();
    assert_eq!(skawina.link, "https://www.olx.pl/d/oferta/dzialka-skawina-CID3-ID1.html");
    assert_eq!(skawina.title, "Działka budowlana Skawina");
    assert_eq!(skawina.price_last_updated, Price::Amount(99_000));
    assert_eq!(skawina.location_text, "Skawina");

    let no_price = stored.iter().find(|r| r.link.contains("ID2")).unwrap();
    assert_eq!(no_price.price_last_updated, Price::Unknown);
    assert_eq!(no_price.distance_km, Some(0.0));
}
