use crate::Coordinates;

/// Allow-listed counties with a representative point (the county seat).
#[derive(Debug, Clone)]
pub struct CountyTable {
    counties: Vec<(String, Coordinates)>,
}

impl CountyTable {
    pub fn new(counties: Vec<(String, Coordinates)>) -> Self {
        Self {
            counties: counties
                .into_iter()
                .map(|(name, point)| (name.to_lowercase(), point))
                .collect(),
        }
    }

    /// Counties around Kraków.
    pub fn malopolska() -> Self {
        Self::new(vec![
            ("krakowski".to_string(), Coordinates::new(50.0647, 19.9450)),
            ("wielicki".to_string(), Coordinates::new(49.9870, 20.0647)),
            ("wadowicki".to_string(), Coordinates::new(49.8833, 19.4929)),
            ("chrzanowski".to_string(), Coordinates::new(50.1355, 19.4024)),
            ("olkuski".to_string(), Coordinates::new(50.2813, 19.5656)),
            ("myślenicki".to_string(), Coordinates::new(49.8336, 19.9383)),
        ])
    }

    pub fn empty() -> Self {
        Self { counties: Vec::new() }
    }

    /// Matches `"wielicki"`, `"Powiat wielicki"` and the like.
    pub fn lookup(&self, name: &str) -> Option<(&str, Coordinates)> {
        let key = county_key(name);
        self.counties
            .iter()
            .find(|(county, _)| *county == key)
            .map(|(county, point)| (county.as_str(), *point))
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }
}

impl Default for CountyTable {
    fn default() -> Self {
        Self::malopolska()
    }
}

fn county_key(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    lowered
        .strip_prefix("powiat ")
        .unwrap_or(&lowered)
        .trim()
        .to_string()
}
