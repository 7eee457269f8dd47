use crate::{ListingRecord, Price, RawListing, UNKNOWN};
use chrono::NaiveDate;

/// Builds a record stub from raw scraped fields.
///
/// Missing or blank fields become [`UNKNOWN`] / [`Price::Unknown`] so a single
/// broken card never costs the rest of the batch. First-seen values stay unset
/// until reconciliation decides them.
pub fn normalize(raw: &RawListing, today: NaiveDate) -> ListingRecord {
    ListingRecord {
        title: clean_text(raw.title.as_deref()),
        location_text: clean_text(raw.location.as_deref()),
        price_at_first_find: None,
        date_first_found: None,
        date_last_updated: today,
        price_last_updated: raw
            .price
            .as_deref()
            .map(clean_price)
            .unwrap_or(Price::Unknown),
        distance_km: None,
        active: true,
        link: clean_link(raw.link.as_deref()),
        latitude: None,
        longitude: None,
    }
}

fn clean_text(text: Option<&str>) -> String {
    let collapsed = text
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    if collapsed.is_empty() {
        UNKNOWN.to_string()
    } else {
        collapsed
    }
}

fn clean_link(link: Option<&str>) -> String {
    let link = link.map(str::trim).unwrap_or_default();
    let link = link.split('#').next().unwrap_or_default();
    if link.is_empty() {
        UNKNOWN.to_string()
    } else {
        link.to_string()
    }
}

/// Parses a price label such as `"249 000 zł"` or `"120 000 zł do negocjacji"`.
pub fn clean_price(text: &str) -> Price {
    let trimmed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if trimmed.is_empty() {
        return Price::Unknown;
    }

    let lowered = trimmed.to_lowercase();
    let digits: String = lowered
        .replace("do negocjacji", "")
        .replace("zł", "")
        .replace("pln", "")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && *c != '.' && *c != '\u{a0}')
        .collect();

    match digits.parse::<u64>() {
        Ok(amount) => Price::Amount(amount),
        Err(_) => Price::Text(trimmed),
    }
}
