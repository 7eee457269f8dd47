use crate::ListingRecord;
use tabled::settings::{object::Columns, Modify, Style, Width};
use tabled::{Table, Tabled};

#[derive(Tabled)]
pub struct ListingTableRow {
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "Price", display_with = "display_right_12")]
    pub price: String,
    #[tabled(rename = "Km", display_with = "display_right_6")]
    pub distance: String,
    #[tabled(rename = "First found")]
    pub first_found: String,
    #[tabled(rename = "Active")]
    pub active: String,
    #[tabled(rename = "Location")]
    pub location: String,
    #[tabled(rename = "Link")]
    pub link: String,
}

fn display_right_12(s: &str) -> String {
    format!("{:>12}", s)
}

fn display_right_6(s: &str) -> String {
    format!("{:>6}", s)
}

impl ListingTableRow {
    pub fn from_record(record: &ListingRecord) -> Self {
        let distance = record
            .distance_km
            .map(|km| format!("{:.1}", km))
            .unwrap_or_else(|| "N/A".to_string());

        let first_found = record
            .date_first_found
            .map(|date| date.to_string())
            .unwrap_or_else(|| "-".to_string());

        Self {
            title: record.title.clone(),
            price: record.price_last_updated.to_string(),
            distance,
            first_found,
            active: if record.active { "yes" } else { "no" }.to_string(),
            location: record.location_text.clone(),
            link: record.link.clone(),
        }
    }
}

pub fn create_listing_table(records: &[ListingRecord]) -> String {
    let rows: Vec<ListingTableRow> = records.iter().map(ListingTableRow::from_record).collect();

    let mut table = Table::new(&rows);
    table
        .with(Style::modern())
        .with(Modify::new(Columns::single(0)).with(Width::truncate(40)))
        .with(Modify::new(Columns::single(1)).with(Width::truncate(12)))
        .with(Modify::new(Columns::single(5)).with(Width::wrap(30)))
        .with(Modify::new(Columns::single(6)).with(Width::wrap(60)));

    table.to_string()
}
