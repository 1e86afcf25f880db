//! Document builder.
//!
//! Flattens a subject row and its ancestor chain into one search document.

use tracing::{debug, trace};

use place_indexer_shared::types::names::postcode_value;
use place_indexer_shared::{AddressRow, Names, PlaceDocument, PlaceRow};

/// Ancestor class slots of a document under construction.
///
/// Each slot is written at most once; the first (nearest) qualifying row wins.
#[derive(Debug, Default)]
struct AddressSlots {
    country: Option<Names>,
    state: Option<Names>,
    city: Option<Names>,
    street: Option<Names>,
    postcode: Option<String>,
    context: Vec<Names>,
}

impl AddressSlots {
    /// Offer a row to every slot it qualifies for. Returns true if it filled at least one.
    fn assign(&mut self, row: &AddressRow) -> bool {
        let mut filled = false;

        if row.is_postcode() {
            if self.postcode.is_none() {
                if let Some(code) = postcode_value(&row.names) {
                    self.postcode = Some(code.to_string());
                    filled = true;
                }
            }
            // postcodes never fill name slots
            return filled;
        }

        if row.names.is_empty() {
            return false;
        }

        filled |= fill(&mut self.country, row.is_country(), &row.names);
        filled |= fill(&mut self.state, row.is_state(), &row.names);
        filled |= fill(&mut self.city, row.is_city(), &row.names);
        filled |= fill(&mut self.street, row.is_street(), &row.names);
        filled
    }

    fn add_context(&mut self, row: &AddressRow) {
        if row.is_useful_for_context() && !self.context.contains(&row.names) {
            self.context.push(row.names.clone());
        }
    }
}

fn fill(slot: &mut Option<Names>, qualifies: bool, names: &Names) -> bool {
    if qualifies && slot.is_none() {
        *slot = Some(names.clone());
        true
    } else {
        false
    }
}

/// Outcome of building a batch.
#[derive(Debug, Default)]
pub struct BuildOutcome {
    /// Documents ready to be written.
    pub documents: Vec<PlaceDocument>,
    /// Places that produced no document.
    pub skipped: Vec<i64>,
}

/// Builds search documents from gazetteer rows.
///
/// Pure and deterministic: the same row and chain always give the same document.
#[derive(Debug, Clone, Default)]
pub struct DocumentBuilder;

impl DocumentBuilder {
    /// Create a new document builder.
    pub fn new() -> Self {
        Self
    }

    /// Returns true if the subject carries nothing to search for: no name, no house
    /// number, and it is not a postcode entity.
    pub fn should_skip(place: &PlaceRow) -> bool {
        place.names.is_empty() && !place.has_house_number() && !place.as_address_row().is_postcode()
    }

    /// Build the document for one subject.
    ///
    /// `chain` must be ordered nearest ancestor first. Rows with a rank outside the known
    /// domain take part in no classification.
    ///
    /// # Returns
    ///
    /// `None` if the subject should not be indexed.
    pub fn build(&self, place: &PlaceRow, chain: &[AddressRow]) -> Option<PlaceDocument> {
        if Self::should_skip(place) {
            trace!(place_id = place.place_id, "Skipping place without names");
            return None;
        }

        let mut slots = AddressSlots::default();

        let subject = place.as_address_row();
        if subject.has_known_rank() {
            slots.assign(&subject);
        }

        for ancestor in chain {
            if ancestor.place_id == place.place_id || !ancestor.has_known_rank() {
                continue;
            }
            if !slots.assign(ancestor) {
                slots.add_context(ancestor);
            }
        }

        let postcode = slots.postcode.or_else(|| {
            place
                .postcode
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
        });

        Some(PlaceDocument {
            place_id: place.place_id,
            osm_type: place.osm_type,
            osm_id: place.osm_id,
            osm_key: place.osm_key.clone(),
            osm_value: place.osm_value.clone(),
            names: place.names.clone(),
            house_number: place
                .house_number
                .as_deref()
                .map(str::trim)
                .filter(|hn| !hn.is_empty())
                .map(str::to_string),
            postcode,
            country_code: place.country_code.clone(),
            country: slots.country,
            state: slots.state,
            city: slots.city,
            street: slots.street,
            context: slots.context,
            centroid: place.centroid,
            extent: place.bbox,
            importance: place.importance,
            rank_address: place.rank_address,
        })
    }

    /// Build documents for a batch of subjects with their chains.
    pub fn build_batch<'a, I>(&self, subjects: I) -> BuildOutcome
    where
        I: IntoIterator<Item = (&'a PlaceRow, &'a [AddressRow])>,
    {
        let mut outcome = BuildOutcome::default();
        for (place, chain) in subjects {
            match self.build(place, chain) {
                Some(doc) => outcome.documents.push(doc),
                None => outcome.skipped.push(place.place_id),
            }
        }

        debug!(
            built = outcome.documents.len(),
            skipped = outcome.skipped.len(),
            "Built document batch"
        );
        outcome
    }
}
