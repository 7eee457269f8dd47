use crate::{ScrapeQuery, Scraper, SourceProfile};
use async_trait::async_trait;
use plotwatch_core::{PlotwatchError, RawListing, Result, RetryPolicy};
use reqwest::{header, Client};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) plotwatch";

struct Selectors {
    card: Selector,
    title: Selector,
    price: Selector,
    location: Selector,
    link: Selector,
}

impl Selectors {
    fn from_profile(profile: &SourceProfile) -> Result<Self> {
        Ok(Self {
            card: parse_selector(&profile.card_selector)?,
            title: parse_selector(&profile.title_selector)?,
            price: parse_selector(&profile.price_selector)?,
            location: parse_selector(&profile.location_selector)?,
            link: parse_selector(&profile.link_selector)?,
        })
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| PlotwatchError::Scraping(format!("bad selector {:?}: {}", selector, e)))
}

/// Scrapes search result pages of any portal described by a [`SourceProfile`].
pub struct HtmlScraper {
    client: Client,
    profile: SourceProfile,
    selectors: Selectors,
    base_url: Url,
    retry: RetryPolicy,
    page_delay: Duration,
}

impl HtmlScraper {
    pub fn new(profile: SourceProfile) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(
                [(header::ACCEPT_LANGUAGE, header::HeaderValue::from_static("pl-PL,pl;q=0.9"))]
                    .into_iter()
                    .collect(),
            )
            .build()?;

        Ok(Self {
            client,
            selectors: Selectors::from_profile(&profile)?,
            base_url: Url::parse(&profile.base_url)?,
            profile,
            retry: RetryPolicy::default(),
            page_delay: Duration::from_secs(2),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    pub fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    /// The search URL with the page parameter set. Page 1 is the URL as given.
    pub fn page_url(&self, query: &ScrapeQuery) -> Result<Url> {
        let mut url = Url::parse(&query.search_url)?;
        if query.page > 1 {
            let others: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(key, _)| key != self.profile.page_param.as_str())
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(others)
                .append_pair(&self.profile.page_param, &query.page.to_string());
        }
        Ok(url)
    }

    /// Pulls the raw listing fields out of one search result page.
    pub fn parse_listings(&self, html: &str) -> Vec<RawListing> {
        let document = Html::parse_document(html);
        document
            .select(&self.selectors.card)
            .map(|card| self.parse_card(card))
            .filter(|listing| *listing != RawListing::default())
            .collect()
    }

    fn parse_card(&self, card: ElementRef) -> RawListing {
        let location = select_text(card, &self.selectors.location).map(|text| {
            match &self.profile.location_split {
                Some(delimiter) => text
                    .split(delimiter.as_str())
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
                None => text,
            }
        });

        let link = card
            .select(&self.selectors.link)
            .next()
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| self.absolute_link(href));

        RawListing {
            title: select_text(card, &self.selectors.title),
            price: select_text(card, &self.selectors.price),
            location,
            link,
        }
    }

    fn absolute_link(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        match self.base_url.join(href) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                debug!("Unusable link {:?}: {}", href, e);
                None
            }
        }
    }

    async fn fetch_page(&self, url: &Url) -> Result<String> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PlotwatchError::Scraping(format!("{} answered HTTP {}", url, status)));
        }
        Ok(response.text().await?)
    }
}

// Text of the first match, whitespace-joined across child elements.
fn select_text(card: ElementRef, selector: &Selector) -> Option<String> {
    let element = card.select(selector).next()?;
    let text = element
        .text()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl Scraper for HtmlScraper {
    fn name(&self) -> &str {
        &self.profile.name
    }

    fn page_delay(&self) -> Duration {
        self.page_delay
    }

    async fn scrape_page(&self, query: &ScrapeQuery) -> Result<Vec<RawListing>> {
        let url = self.page_url(query)?;
        info!("Scraping page {}: {}", query.page, url);

        let label = format!("Fetching {}", url);
        let url = &url;
        let html = self.retry.run(&label, move || self.fetch_page(url)).await?;

        let listings = self.parse_listings(&html);
        debug!("Found {} listings on page {}", listings.len(), query.page);
        Ok(listings)
    }
}
