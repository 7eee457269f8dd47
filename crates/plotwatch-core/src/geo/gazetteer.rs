use crate::{Coordinates, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Town name to known coordinates, curated by hand (or exported from OSM).
/// Names are stored lowercased; one name may point at several places.
#[derive(Debug, Clone, Default)]
pub struct Gazetteer {
    towns: HashMap<String, Vec<Coordinates>>,
    skipped_lines: usize,
}

impl Gazetteer {
    /// Loads `town|lat|lon` lines. A missing file gives an empty gazetteer.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Gazetteer file {} not found, continuing without it", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let gazetteer = Self::parse(&contents);
        info!(
            "Loaded {} towns from {} ({} lines skipped)",
            gazetteer.len(),
            path.display(),
            gazetteer.skipped_lines
        );
        Ok(gazetteer)
    }

    pub fn parse(contents: &str) -> Self {
        let mut gazetteer = Self::default();

        for (number, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_line(line) {
                Some((town, coordinates)) => gazetteer.insert(&town, coordinates),
                None => {
                    warn!("Skipping malformed gazetteer line {}: {}", number + 1, line);
                    gazetteer.skipped_lines += 1;
                }
            }
        }

        gazetteer
    }

    pub fn insert(&mut self, town: &str, coordinates: Coordinates) {
        self.towns
            .entry(town.trim().to_lowercase())
            .or_default()
            .push(coordinates);
    }

    pub fn lookup(&self, town: &str) -> Option<&[Coordinates]> {
        self.towns.get(&town.trim().to_lowercase()).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.towns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.towns.is_empty()
    }

    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }
}

// Coordinates are the last two fields, so the name may contain the delimiter.
fn parse_line(line: &str) -> Option<(String, Coordinates)> {
    let delimiter = if line.contains('|') { '|' } else { ',' };
    let mut fields = line.rsplitn(3, delimiter);
    let lon = fields.next()?.trim().parse::<f64>().ok()?;
    let lat = fields.next()?.trim().parse::<f64>().ok()?;
    let town = fields.next()?.trim();

    if town.is_empty() || !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    Some((town.to_string(), Coordinates::new(lat, lon)))
}
