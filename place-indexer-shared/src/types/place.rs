//! Subject rows read from the gazetteer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::address_row::AddressRow;
use crate::types::geo::{BoundingBox, Centroid};
use crate::types::names::Names;

/// OpenStreetMap object type of the source element.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OsmType {
    Node,
    Way,
    Relation,
}

impl OsmType {
    /// Parse the gazetteer's single-letter code (`N`, `W`, `R`).
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "N" | "n" => Some(Self::Node),
            "W" | "w" => Some(Self::Way),
            "R" | "r" => Some(Self::Relation),
            _ => None,
        }
    }

    /// Lowercase name as used in documents and API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }
}

impl fmt::Display for OsmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A place row as read from the gazetteer. Immutable once read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaceRow {
    pub place_id: i64,
    pub osm_type: OsmType,
    pub osm_id: i64,
    pub osm_key: String,
    pub osm_value: String,
    pub rank_address: i32,
    pub names: Names,
    pub house_number: Option<String>,
    pub postcode: Option<String>,
    pub country_code: Option<String>,
    pub centroid: Centroid,
    pub importance: f64,
    pub bbox: Option<BoundingBox>,
}

impl PlaceRow {
    /// View this row through the same projection as its ancestors, so the subject can be
    /// classified with the same predicates.
    pub fn as_address_row(&self) -> AddressRow {
        AddressRow {
            place_id: self.place_id,
            names: self.names.clone(),
            osm_key: self.osm_key.clone(),
            osm_value: self.osm_value.clone(),
            rank_address: self.rank_address,
        }
    }

    /// Returns true if the row carries a non-empty house number.
    pub fn has_house_number(&self) -> bool {
        self.house_number
            .as_deref()
            .map(|hn| !hn.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Restricts a full scan to a set of ISO 3166-1 alpha-2 country codes.
///
/// An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryFilter {
    codes: Vec<String>,
}

impl CountryFilter {
    /// A filter that matches everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a filter from codes. Codes are lowercased (the gazetteer stores them that way),
    /// deduplicated and sorted; anything that is not two ASCII letters is rejected.
    pub fn new<I, S>(codes: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = Vec::new();
        for code in codes {
            let code = code.as_ref().trim();
            if code.is_empty() {
                continue;
            }
            if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(format!("Invalid country code '{}'", code));
            }
            normalized.push(code.to_ascii_lowercase());
        }
        normalized.sort();
        normalized.dedup();
        Ok(Self { codes: normalized })
    }

    /// Parse a comma-separated list such as `"de,ch,AT"`.
    pub fn parse(list: &str) -> Result<Self, String> {
        Self::new(list.split(','))
    }

    /// Returns true if no restriction applies.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// The normalised codes.
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    /// Returns true if a row with the given country code passes the filter.
    pub fn matches(&self, country_code: Option<&str>) -> bool {
        if self.codes.is_empty() {
            return true;
        }
        country_code
            .map(|cc| self.codes.iter().any(|c| c.eq_ignore_ascii_case(cc)))
            .unwrap_or(false)
    }
}
