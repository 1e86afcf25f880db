//! Reader module for the place indexer.
//!
//! Streams subject rows together with their ancestor chains from the gazetteer, either as
//! a full keyset scan or as the delta since an update marker.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use place_indexer_repository::{GazetteerSource, PlacePage};
use place_indexer_shared::{AddressRow, CountryFilter, PlaceRow, UpdateMarker};

use crate::errors::PipelineError;

/// Default number of subject rows per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Subject rows with their ancestor chains (nearest ancestor first).
#[derive(Debug, Clone, Default)]
pub struct SubjectBatch {
    pub subjects: Vec<(PlaceRow, Vec<AddressRow>)>,
    /// Rows that could not be decoded, or whose ancestor chain could not, and were left out.
    pub skipped: usize,
    /// Ids of the skipped places, where known.
    pub skipped_ids: Vec<i64>,
}

impl SubjectBatch {
    /// Number of subjects in the batch.
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    /// Returns true if the batch has no subjects.
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Borrowing view suitable for [`crate::processor::DocumentBuilder::build_batch`].
    pub fn iter(&self) -> impl Iterator<Item = (&PlaceRow, &[AddressRow])> {
        self.subjects
            .iter()
            .map(|(place, chain)| (place, chain.as_slice()))
    }
}

/// Everything an update cycle has to apply.
#[derive(Debug, Clone, Default)]
pub struct DeltaBatch {
    /// Changed places plus every dependent place whose chain contains a changed or
    /// deleted ancestor.
    pub rebuild: SubjectBatch,
    /// Places to remove from the index.
    pub deleted: Vec<i64>,
    /// Number of places pulled in only because an ancestor changed.
    pub dependents: usize,
    /// Marker covering this delta.
    pub new_marker: UpdateMarker,
}

impl DeltaBatch {
    /// Returns true if there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.rebuild.is_empty() && self.deleted.is_empty()
    }
}

/// Reads subjects and their ancestor chains from a [`GazetteerSource`].
#[derive(Clone)]
pub struct GazetteerReader {
    source: Arc<dyn GazetteerSource>,
    batch_size: usize,
}

impl GazetteerReader {
    /// Create a new reader with the given source and batch size.
    pub fn new(source: Arc<dyn GazetteerSource>, batch_size: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.max(1),
        }
    }

    /// Rows per batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Start a full scan in `place_id` order.
    pub fn full_scan(&self, filter: CountryFilter) -> FullScan {
        FullScan {
            reader: self.clone(),
            filter,
            after: None,
            exhausted: false,
        }
    }

    /// The newest position of the gazetteer's change log.
    pub async fn current_marker(&self) -> Result<UpdateMarker, PipelineError> {
        Ok(self.source.current_marker().await?)
    }

    /// Attach ancestor chains to the rows of a page. Subjects whose chain is incomplete
    /// are skipped along with the page's undecodable rows.
    async fn with_chains(&self, page: PlacePage) -> Result<SubjectBatch, PipelineError> {
        let ids: Vec<i64> = page.rows.iter().map(|r| r.place_id).collect();
        let mut chains = self.source.address_chains(&ids).await?;

        let mut batch = SubjectBatch {
            subjects: Vec::with_capacity(page.rows.len()),
            skipped: page.skipped,
            skipped_ids: page.skipped_ids,
        };
        for row in page.rows {
            match chains.take(row.place_id) {
                Some(chain) => batch.subjects.push((row, chain)),
                None => {
                    batch.skipped += 1;
                    batch.skipped_ids.push(row.place_id);
                }
            }
        }
        Ok(batch)
    }

    /// Fetch rows for ids in batches. Ids that no longer exist are absent from the result.
    async fn fetch_subjects(&self, ids: &[i64]) -> Result<SubjectBatch, PipelineError> {
        let mut batch = SubjectBatch::default();
        for chunk in ids.chunks(self.batch_size) {
            let page = self.source.fetch_places(chunk).await?;
            let mut fetched = self.with_chains(page).await?;
            batch.subjects.append(&mut fetched.subjects);
            batch.skipped += fetched.skipped;
            batch.skipped_ids.append(&mut fetched.skipped_ids);
        }
        Ok(batch)
    }

    /// Collect the delta since `since`.
    ///
    /// Changed ids that are no longer present in the gazetteer count as deleted; ids that
    /// are present but could not be read are skipped, never deleted. Dependents of every
    /// changed or deleted place are rebuilt as well, since their documents embed the
    /// ancestor's names.
    #[instrument(skip(self))]
    pub async fn collect_delta(&self, since: UpdateMarker) -> Result<DeltaBatch, PipelineError> {
        let scan = self.source.read_changes(since).await?;
        if scan.is_empty() {
            return Ok(DeltaBatch {
                new_marker: scan.new_marker,
                ..DeltaBatch::default()
            });
        }

        let changed_ids: Vec<i64> = scan.changed.iter().copied().collect();
        let mut rebuild = self.fetch_subjects(&changed_ids).await?;

        let rebuilt: BTreeSet<i64> = rebuild.subjects.iter().map(|(p, _)| p.place_id).collect();
        let present: BTreeSet<i64> = rebuilt
            .iter()
            .chain(rebuild.skipped_ids.iter())
            .copied()
            .collect();
        let mut deleted: BTreeSet<i64> = scan.deleted.clone();
        deleted.extend(scan.changed.iter().filter(|id| !present.contains(id)));

        let ancestors: Vec<i64> = scan.changed.union(&scan.deleted).copied().collect();
        let mut dependent_ids = Vec::new();
        for chunk in ancestors.chunks(self.batch_size) {
            dependent_ids.extend(self.source.find_dependents(chunk).await?);
        }
        let dependent_ids: Vec<i64> = dependent_ids
            .into_iter()
            .filter(|id| !present.contains(id) && !deleted.contains(id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut dependents = self.fetch_subjects(&dependent_ids).await?;
        let dependent_count = dependents.len();
        rebuild.subjects.append(&mut dependents.subjects);
        rebuild.skipped += dependents.skipped;
        rebuild.skipped_ids.append(&mut dependents.skipped_ids);

        info!(
            changed = rebuilt.len(),
            deleted = deleted.len(),
            dependents = dependent_count,
            skipped = rebuild.skipped,
            new_marker = %scan.new_marker,
            "Collected delta"
        );

        Ok(DeltaBatch {
            rebuild,
            deleted: deleted.into_iter().collect(),
            dependents: dependent_count,
            new_marker: scan.new_marker,
        })
    }
}

/// State of a keyset-paginated full scan.
pub struct FullScan {
    reader: GazetteerReader,
    filter: CountryFilter,
    after: Option<i64>,
    exhausted: bool,
}

impl FullScan {
    /// Read the next batch. Returns `None` once the scan is exhausted.
    pub async fn next_batch(&mut self) -> Result<Option<SubjectBatch>, PipelineError> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self
            .reader
            .source
            .read_places(&self.filter, self.after, self.reader.batch_size)
            .await?;

        let last = match page.last_place_id {
            Some(last) => last,
            None => {
                self.exhausted = true;
                return Ok(None);
            }
        };
        if self.after.map_or(false, |after| last <= after) {
            return Err(PipelineError::invalid_state(format!(
                "Full scan did not advance past place_id {}",
                last
            )));
        }
        self.after = Some(last);

        let batch = self.reader.with_chains(page).await?;

        debug!(
            after = last,
            subjects = batch.len(),
            skipped = batch.skipped,
            "Read subject batch"
        );
        Ok(Some(batch))
    }
}
