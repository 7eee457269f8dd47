pub mod html;
pub mod profile;

use async_trait::async_trait;
use plotwatch_core::{CancelToken, PlotwatchError, RawListing, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use html::HtmlScraper;
pub use profile::SourceProfile;

/// Enum representing the supported listing portals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScraperType {
    /// Otodom - the largest Polish real estate portal
    Otodom,
    /// OLX - classifieds, real estate section
    Olx,
    /// Nieruchomosci-online
    NieruchomosciOnline,
}

impl fmt::Display for ScraperType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScraperType::Otodom => write!(f, "otodom"),
            ScraperType::Olx => write!(f, "olx"),
            ScraperType::NieruchomosciOnline => write!(f, "nieruchomosci-online"),
        }
    }
}

/// A portal search, paged through one page at a time.
#[derive(Debug, Clone)]
pub struct ScrapeQuery {
    /// Search result URL with all filters applied, as copied from a browser.
    pub search_url: String,
    pub page: u32,
    /// Checked before every page.
    pub cancel: CancelToken,
}

impl ScrapeQuery {
    pub fn new(search_url: impl Into<String>) -> Self {
        Self {
            search_url: search_url.into(),
            page: 1,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn next_page(&mut self) {
        self.page += 1;
    }
}

/// Trait for scraping listing pages from a portal
#[async_trait]
pub trait Scraper: Send + Sync {
    fn name(&self) -> &str;

    /// Pause between two page fetches.
    fn page_delay(&self) -> Duration;

    /// Scrape a single page of listings
    async fn scrape_page(&self, query: &ScrapeQuery) -> Result<Vec<RawListing>>;

    /// Scrape pages until one comes back empty, a fetch keeps failing, or
    /// `max_pages` pages were read. Fails with `Cancelled` if the query's
    /// token fires first.
    async fn scrape_listing(&self, mut query: ScrapeQuery, max_pages: u32) -> Result<Vec<RawListing>> {
        let mut all_listings = Vec::new();
        let mut pages_scraped = 0;

        while pages_scraped < max_pages {
            if pages_scraped > 0 {
                tokio::time::sleep(self.page_delay()).await;
            }
            if query.cancel.is_cancelled() {
                warn!("{}: cancelled before page {}", self.name(), query.page);
                return Err(PlotwatchError::Cancelled);
            }

            let listings = match self.scrape_page(&query).await {
                Ok(listings) => listings,
                Err(e) => {
                    warn!("{}: giving up on page {}: {}", self.name(), query.page, e);
                    break;
                }
            };
            pages_scraped += 1;

            if listings.is_empty() {
                info!("{}: page {} is empty, stopping", self.name(), query.page);
                break;
            }
            all_listings.extend(listings);
            query.next_page();
        }

        info!(
            "{}: {} listings from {} pages",
            self.name(),
            all_listings.len(),
            pages_scraped
        );
        Ok(all_listings)
    }
}

/// Factory for creating scraper instances
pub struct ScraperFactory;

impl ScraperFactory {
    /// Scraper for one of the built-in portals
    pub fn create_scraper(scraper_type: ScraperType) -> Result<Arc<dyn Scraper>> {
        Self::from_profile(SourceProfile::builtin(scraper_type))
    }

    pub fn from_profile(profile: SourceProfile) -> Result<Arc<dyn Scraper>> {
        Ok(Arc::new(HtmlScraper::new(profile)?))
    }
}
