//! One scrape batch, end to end: load, normalize, resolve, reconcile, save.

use crate::{
    normalize, reconcile, GeoResolver, ListingRecord, ListingStore, Notifier, PlotwatchError,
    RawListing, Result,
};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Stops a run between two listings, either on request or past a deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub raw_found: usize,
    pub deduplicated: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub rejected: usize,
    pub new_listings: usize,
    pub deactivated: usize,
    pub total_stored: usize,
    pub active_stored: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Raw listings found:   {}", self.raw_found)?;
        writeln!(f, "After deduplication:  {}", self.deduplicated)?;
        writeln!(f, "Resolved:             {}", self.resolved)?;
        writeln!(f, "Unresolved:           {}", self.unresolved)?;
        writeln!(f, "Rejected (no link):   {}", self.rejected)?;
        writeln!(f, "New:                  {}", self.new_listings)?;
        writeln!(f, "Deactivated:          {}", self.deactivated)?;
        write!(
            f,
            "Stored:               {} ({} active)",
            self.total_stored, self.active_stored
        )
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    /// The set as saved.
    pub records: Vec<ListingRecord>,
}

pub struct Pipeline<'a> {
    resolver: &'a GeoResolver,
    store: &'a dyn ListingStore,
    notifier: Option<&'a dyn Notifier>,
    county_hint: Option<String>,
    cancel: CancelToken,
}

impl<'a> Pipeline<'a> {
    pub fn new(resolver: &'a GeoResolver, store: &'a dyn ListingStore) -> Self {
        Self {
            resolver,
            store,
            notifier: None,
            county_hint: None,
            cancel: CancelToken::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: &'a dyn Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_county_hint(mut self, county_hint: impl Into<String>) -> Self {
        self.county_hint = Some(county_hint.into());
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs one batch. Store failures and cancellation abort the run before
    /// anything is written; notification failures are only logged.
    pub async fn run(&self, raw: &[RawListing], today: NaiveDate) -> Result<RunOutcome> {
        let mut summary = RunSummary {
            raw_found: raw.len(),
            ..RunSummary::default()
        };

        let previous = self.store.load_all().await?;
        info!("Loaded {} stored listings from {}", previous.len(), self.store.describe());

        let listings = dedupe_by_link(raw.iter().map(|r| normalize(r, today)).collect());
        summary.deduplicated = listings.len();

        let mut current = Vec::with_capacity(listings.len());
        for (idx, listing) in listings.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Run cancelled after {} of {} listings", idx, summary.deduplicated);
                return Err(PlotwatchError::Cancelled);
            }

            let resolutions = self
                .resolver
                .resolve(&listing.location_text, self.county_hint.as_deref())
                .await;
            if resolutions.is_empty() {
                debug!("Unresolved location {:?} for {}", listing.location_text, listing.link);
                summary.unresolved += 1;
                current.push(listing);
            } else {
                summary.resolved += 1;
                current.extend(resolutions.iter().map(|r| listing.located_at(r)));
            }
        }

        if self.cancel.is_cancelled() {
            return Err(PlotwatchError::Cancelled);
        }

        let merged = reconcile(&previous, &current);
        summary.rejected = merged.rejected.len();
        summary.new_listings = merged.new_links.len();
        summary.deactivated = merged.deactivated_links.len();
        summary.total_stored = merged.records.len();
        summary.active_stored = merged.active_count();

        self.store.save_all(&merged.records).await?;

        if let Some(notifier) = self.notifier {
            let fresh = merged.new_active();
            if let Err(e) = notifier.notify(&fresh).await {
                warn!("Notification failed: {}", e);
            }
        }

        Ok(RunOutcome {
            summary,
            records: merged.records,
        })
    }
}

// Keeps the first listing per link. Listings without a link pass through
// so reconciliation can report them.
fn dedupe_by_link(listings: Vec<ListingRecord>) -> Vec<ListingRecord> {
    let mut seen = HashSet::new();
    listings
        .into_iter()
        .filter(|listing| !listing.has_link() || seen.insert(listing.link.clone()))
        .collect()
}
