use crate::ScraperType;
use plotwatch_core::{PlotwatchError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where a portal keeps each listing field, as CSS selectors.
///
/// Portals reshuffle their markup often, so profiles can be loaded from JSON
/// instead of waiting for a release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProfile {
    pub name: String,
    /// Relative links are resolved against this.
    pub base_url: String,
    /// One match per listing card.
    pub card_selector: String,
    pub title_selector: String,
    pub price_selector: String,
    pub location_selector: String,
    /// Anchor inside the card; its `href` is the listing link.
    pub link_selector: String,
    /// The location text is cut at the first occurrence of this, e.g. OLX's
    /// `"Wieliczka - Odświeżono dzisiaj"`.
    #[serde(default)]
    pub location_split: Option<String>,
    /// Query parameter carrying the page number.
    pub page_param: String,
    #[serde(default)]
    pub county_hint: Option<String>,
}

impl SourceProfile {
    pub fn builtin(scraper_type: ScraperType) -> Self {
        match scraper_type {
            ScraperType::Otodom => Self {
                name: "otodom".to_string(),
                base_url: "https://www.otodom.pl".to_string(),
                card_selector: r#"article[data-cy="listing-item"]"#.to_string(),
                title_selector: r#"[data-cy="listing-item-title"]"#.to_string(),
                price_selector: r#"[data-sentry-component="Price"]"#.to_string(),
                location_selector: r#"[data-sentry-component="Address"]"#.to_string(),
                link_selector: r#"a[data-cy="listing-item-link"]"#.to_string(),
                location_split: None,
                page_param: "page".to_string(),
                county_hint: None,
            },
            ScraperType::Olx => Self {
                name: "olx".to_string(),
                base_url: "https://www.olx.pl".to_string(),
                card_selector: r#"div[data-cy="l-card"]"#.to_string(),
                title_selector: "h4, h6".to_string(),
                price_selector: r#"p[data-testid="ad-price"]"#.to_string(),
                location_selector: r#"p[data-testid="location-date"]"#.to_string(),
                link_selector: "a[href]".to_string(),
                location_split: Some(" - ".to_string()),
                page_param: "page".to_string(),
                county_hint: None,
            },
            ScraperType::NieruchomosciOnline => Self {
                name: "nieruchomosci-online".to_string(),
                base_url: "https://www.nieruchomosci-online.pl".to_string(),
                card_selector: "div.tile-inner, div.tertiary".to_string(),
                title_selector: "h2.name".to_string(),
                price_selector: "p.title-a span".to_string(),
                location_selector: "p.province".to_string(),
                link_selector: "h2.name a".to_string(),
                location_split: None,
                page_param: "p".to_string(),
                county_hint: None,
            },
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PlotwatchError::Config(format!("Cannot read profile {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }
}
