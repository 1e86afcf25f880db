//! Ancestor rows of the address hierarchy and their rank classification.
//!
//! The classification is never stored: each predicate is an independent boolean view
//! over `(rank_address, osm_key, osm_value, names)`. The rank thresholds are domain
//! constants of the gazetteer's address rank schema.

use serde::{Deserialize, Serialize};

use crate::types::names::Names;

/// Highest address rank the gazetteer assigns (house numbers, POIs).
pub const MAX_RANK_ADDRESS: i32 = 30;

/// Tag keys whose named rows are worth keeping as search context.
const USEFUL_CONTEXT_KEYS: [&str; 3] = ["boundary", "landuse", "place"];

/// One entry of a place's ancestor chain, as returned by the gazetteer's
/// address lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddressRow {
    pub place_id: i64,
    pub names: Names,
    pub osm_key: String,
    pub osm_value: String,
    pub rank_address: i32,
}

impl AddressRow {
    /// Create a new address row.
    pub fn new(
        place_id: i64,
        names: Names,
        osm_key: impl Into<String>,
        osm_value: impl Into<String>,
        rank_address: i32,
    ) -> Self {
        Self {
            place_id,
            names,
            osm_key: osm_key.into(),
            osm_value: osm_value.into(),
            rank_address,
        }
    }

    /// Street level: `26 <= rank < 28`.
    pub fn is_street(&self) -> bool {
        (26..28).contains(&self.rank_address)
    }

    /// City level: `13 <= rank <= 16`.
    pub fn is_city(&self) -> bool {
        (13..=16).contains(&self.rank_address)
    }

    /// State level: `5 <= rank <= 9`.
    pub fn is_state(&self) -> bool {
        (5..=9).contains(&self.rank_address)
    }

    /// Country: an administrative boundary at rank 4.
    pub fn is_country(&self) -> bool {
        self.rank_address == 4 && self.osm_key == "boundary" && self.osm_value == "administrative"
    }

    /// Postcode entities, independent of rank.
    pub fn is_postcode(&self) -> bool {
        matches!(
            (self.osm_key.as_str(), self.osm_value.as_str()),
            ("place", "postcode") | ("boundary", "postal_code")
        )
    }

    /// Named areas (not postcodes, not continents or seas) that help disambiguate a place.
    pub fn is_useful_for_context(&self) -> bool {
        if self.names.is_empty() {
            return false;
        }

        if self.is_postcode() {
            return false;
        }

        // continents, seas
        if self.rank_address < 4 {
            return false;
        }

        USEFUL_CONTEXT_KEYS.contains(&self.osm_key.as_str())
    }

    /// Returns true if the rank lies inside the documented `0..=30` domain.
    pub fn has_known_rank(&self) -> bool {
        (0..=MAX_RANK_ADDRESS).contains(&self.rank_address)
    }
}
