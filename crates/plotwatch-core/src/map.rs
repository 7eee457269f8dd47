use crate::store::write_atomically;
use crate::{Coordinates, ListingRecord, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::info;

const LEAFLET_VERSION: &str = "1.9.4";

/// Renders active listings as a standalone Leaflet page.
#[derive(Debug, Clone)]
pub struct MapRenderer {
    reference: Coordinates,
    reference_label: String,
    zoom: u8,
}

impl MapRenderer {
    pub fn new(reference: Coordinates, reference_label: impl Into<String>) -> Self {
        Self {
            reference,
            reference_label: reference_label.into(),
            zoom: 10,
        }
    }

    pub fn with_zoom(mut self, zoom: u8) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn render(&self, records: &[ListingRecord]) -> Result<String> {
        let groups = group_by_location(records);

        let mut markers = String::new();
        markers.push_str(&marker_js(
            self.reference,
            &format!("<b>{}</b><br>Reference point", escape_html(&self.reference_label)),
            &self.reference_label,
            "referenceIcon",
        )?);
        for (point, listings) in groups.values() {
            let (popup, tooltip) = popup_for(listings);
            markers.push_str(&marker_js(*point, &popup, &tooltip, "listingIcon")?);
        }

        Ok(format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@{version}/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@{version}/dist/leaflet.js"></script>
<style>html, body, #map {{ height: 100%; margin: 0; }}</style>
</head>
<body>
<div id="map"></div>
<script>
var map = L.map('map').setView([{lat}, {lon}], {zoom});
L.tileLayer('https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', {{
    attribution: '&copy; OpenStreetMap contributors'
}}).addTo(map);
var referenceIcon = L.divIcon({{className: 'reference', html: '&#9733;', iconSize: [20, 20]}});
var listingIcon = new L.Icon.Default();
{markers}</script>
</body>
</html>
"#,
            title = escape_html(&format!("Listings around {}", self.reference_label)),
            version = LEAFLET_VERSION,
            lat = self.reference.lat,
            lon = self.reference.lon,
            zoom = self.zoom,
            markers = markers,
        ))
    }

    pub fn write(&self, path: &Path, records: &[ListingRecord]) -> Result<()> {
        let html = self.render(records)?;
        write_atomically(path, |file| {
            file.write_all(html.as_bytes())?;
            Ok(())
        })?;
        info!("Map saved to {}", path.display());
        Ok(())
    }
}

type GroupKey = (i64, i64);

// Active records with coordinates, grouped on a ~10 m grid.
fn group_by_location(records: &[ListingRecord]) -> BTreeMap<GroupKey, (Coordinates, Vec<&ListingRecord>)> {
    let mut groups: BTreeMap<GroupKey, (Coordinates, Vec<&ListingRecord>)> = BTreeMap::new();
    for record in records.iter().filter(|r| r.active) {
        let Some(point) = record.coordinates() else {
            continue;
        };
        let key = ((point.lat * 1e4).round() as i64, (point.lon * 1e4).round() as i64);
        groups.entry(key).or_insert_with(|| (point, Vec::new())).1.push(record);
    }
    groups
}

fn popup_for(listings: &[&ListingRecord]) -> (String, String) {
    match listings {
        [single] => (
            format!(
                "<b>{}</b><br>{}<br>{} PLN<br><a href=\"{}\" target=\"_blank\">View listing</a>",
                escape_html(&single.title),
                escape_html(&single.location_text),
                escape_html(&single.price_last_updated.to_string()),
                escape_html(&single.link),
            ),
            single.title.clone(),
        ),
        _ => {
            let items: String = listings
                .iter()
                .map(|r| {
                    format!(
                        "<li><a href=\"{}\" target=\"_blank\">{}</a> - {} PLN</li>",
                        escape_html(&r.link),
                        escape_html(&r.title),
                        escape_html(&r.price_last_updated.to_string()),
                    )
                })
                .collect();
            (
                format!("<b>{} listings</b><br><ul>{}</ul>", listings.len(), items),
                format!("{} listings in this location", listings.len()),
            )
        }
    }
}

fn marker_js(point: Coordinates, popup_html: &str, tooltip: &str, icon: &str) -> Result<String> {
    // JSON string literals are valid JS string literals.
    let popup = serde_json::to_string(popup_html)?;
    let tooltip = serde_json::to_string(&escape_html(tooltip))?;
    Ok(format!(
        "L.marker([{}, {}], {{icon: {}}}).bindPopup({}, {{maxWidth: 300}}).bindTooltip({}).addTo(map);\n",
        point.lat, point.lon, icon, popup, tooltip
    ))
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
