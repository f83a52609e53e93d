//! Service regions, their service centers and the coverage dataset.

use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};

pub const REGIONS: [&str; 8] = [
    "Dhaka",
    "Chittagong",
    "Rajshahi",
    "Khulna",
    "Barisal",
    "Sylhet",
    "Rangpur",
    "Mymensingh",
];

const SERVICE_CENTERS: [(&str, &[&str]); 8] = [
    ("Dhaka", &["Dhanmondi", "Gulshan", "Uttara", "Old Dhaka", "Wari"]),
    ("Chittagong", &["Agrabad", "Nasirabad", "Panchlaish", "Halishahar"]),
    ("Rajshahi", &["Shaheb Bazar", "Uposhohor", "Rajpara"]),
    ("Khulna", &["Moylapota", "Sonadanga", "Khalishpur"]),
    ("Barisal", &["Sadar Road", "Band Road", "Nathullabad"]),
    ("Sylhet", &["Zindabazar", "Amberkhana", "Subhanighat"]),
    ("Rangpur", &["Guptapara", "Mahiganj", "Modern"]),
    ("Mymensingh", &["Charpara", "Ganginarpar", "Town Hall"]),
];

pub fn is_known_region(region: &str) -> bool {
    REGIONS.contains(&region)
}

pub fn service_centers(region: &str) -> Option<&'static [&'static str]> {
    SERVICE_CENTERS
        .iter()
        .find(|(name, _)| *name == region)
        .map(|(_, centers)| *centers)
}

pub fn is_service_center(region: &str, center: &str) -> bool {
    service_centers(region)
        .map(|centers| centers.contains(&center))
        .unwrap_or(false)
}

/// One district entry of the coverage map dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoverageArea {
    pub district: String,
    #[serde(default)]
    pub city: Option<String>,
    pub region: String,
    #[serde(default)]
    pub covered_area: Vec<String>,
    pub latitude: f64,
    pub longitude: f64,
}

impl CoverageArea {
    fn matches(&self, needle: &str) -> bool {
        let hit = |value: &str| value.to_lowercase().contains(needle);
        hit(&self.district)
            || self.city.as_deref().map(hit).unwrap_or(false)
            || hit(&self.region)
            || self.covered_area.iter().any(|area| hit(area.as_str()))
    }
}

pub fn load_coverage(path: &Path) -> io::Result<Vec<CoverageArea>> {
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(io::Error::from)
}

/// Case-insensitive search over district, city, region and covered areas,
/// optionally narrowed to one region.
pub fn search_coverage<'a>(
    areas: &'a [CoverageArea],
    term: &str,
    region: Option<&str>,
) -> Vec<&'a CoverageArea> {
    let needle = term.trim().to_lowercase();
    areas
        .iter()
        .filter(|area| region.map(|r| area.region == r).unwrap_or(true))
        .filter(|area| needle.is_empty() || area.matches(&needle))
        .collect()
}
