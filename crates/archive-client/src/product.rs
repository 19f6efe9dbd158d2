//! Product reference data and collection metadata.

use std::collections::BTreeMap;

use serde::Deserialize;

use archive_protocol::ProtocolError;

/// Data products the archive serves.
pub const PRODUCTS: &[&str] = &[
    "ATL01", "ATL02", "ATL03", "ATL04", "ATL06", "ATL07", "ATL07QL", "ATL08", "ATL08QL", "ATL09",
    "ATL09QL", "ATL10", "ATL11", "ATL12", "ATL13", "ATL14", "ATL15", "ATL16", "ATL17", "ATL19",
    "ATL20", "ATL21",
];

/// Confirm a valid product short name, normalizing case.
pub fn validate_product(product: &str) -> Result<String, ProtocolError> {
    let product = product.to_ascii_uppercase();
    if PRODUCTS.contains(&product.as_str()) {
        Ok(product)
    } else {
        Err(ProtocolError::Validation(format!(
            "unknown product '{}'",
            product
        )))
    }
}

/// Whether a product's queries must carry a temporal constraint.
///
/// Along-track products (numeric suffix 13 and below) are dense enough that
/// the archive requires a date range or an orbital filter; gridded products
/// above that can be queried by extent alone.
pub fn temporal_required(product: &str) -> bool {
    let digits: String = product
        .chars()
        .skip(3)
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<u32>().map(|n| n <= 13).unwrap_or(true)
}

/// Normalize a requested product version against the latest available one.
///
/// Versions are 3-digit zero-padded strings. A missing request resolves to
/// the latest; a request newer than the latest is rejected.
pub fn normalize_version(latest: &str, requested: Option<&str>) -> Result<String, ProtocolError> {
    let requested = match requested {
        None => return Ok(latest.to_string()),
        Some(r) => r,
    };

    let value: u32 = requested.parse().map_err(|_| {
        ProtocolError::Validation(format!("version '{}' is not numeric", requested))
    })?;
    if value == 0 {
        return Err(ProtocolError::Validation(
            "version 0 does not exist".to_string(),
        ));
    }

    let latest_value: u32 = latest
        .parse()
        .map_err(|_| ProtocolError::Validation(format!("latest version '{}' malformed", latest)))?;
    if value > latest_value {
        return Err(ProtocolError::Validation(format!(
            "version {:03} is newer than the latest release {}",
            value, latest
        )));
    }

    Ok(format!("{:03}", value))
}

/// Collection metadata feed returned by the discovery service.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionFeed {
    pub feed: CollectionEntries,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionEntries {
    #[serde(default)]
    pub entry: Vec<CollectionEntry>,
}

/// One collection (product + version) entry in the metadata feed.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub version_id: String,
    #[serde(default)]
    pub time_start: String,
    #[serde(default)]
    pub coordinate_system: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub orbit_parameters: BTreeMap<String, serde_json::Value>,
}

impl CollectionFeed {
    /// Most recent version id across the feed's entries.
    pub fn latest_version(&self) -> Option<String> {
        self.feed
            .entry
            .iter()
            .map(|e| e.version_id.clone())
            .max()
    }

    /// The entry for the most recent version (feeds list oldest first).
    pub fn latest_entry(&self) -> Option<&CollectionEntry> {
        self.feed.entry.last()
    }
}

/// Selected metadata for display, pulled from the latest collection entry.
#[derive(Debug, Clone)]
pub struct ProductSummary {
    pub title: String,
    pub short_name: String,
    pub version_id: String,
    pub time_start: String,
    pub coordinate_system: String,
    pub summary: String,
    pub orbit_parameters: BTreeMap<String, serde_json::Value>,
}

impl From<&CollectionEntry> for ProductSummary {
    fn from(entry: &CollectionEntry) -> Self {
        Self {
            title: entry.title.clone(),
            short_name: entry.short_name.clone(),
            version_id: entry.version_id.clone(),
            time_start: entry.time_start.clone(),
            coordinate_system: entry.coordinate_system.clone(),
            summary: entry.summary.clone(),
            orbit_parameters: entry.orbit_parameters.clone(),
        }
    }
}
