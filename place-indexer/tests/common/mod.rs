//! In-memory gazetteer and index used by the pipeline integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use place_indexer::loader::{LoaderConfig, RetryPolicy, SearchLoader};
use place_indexer::orchestrator::{ImportPipeline, IndexReadiness, PipelineRunner, UpdatePipeline};
use place_indexer::processor::DocumentBuilder;
use place_indexer::reader::GazetteerReader;
use place_indexer_repository::postgres::collapse_changes;
use place_indexer_repository::{
    AddressChains, BatchOperationResult, BatchOperationSummary, DeltaScan, GazetteerError,
    GazetteerSource, IndexHealth, PlacePage, SearchIndexError, SearchIndexProvider,
};
use place_indexer_shared::{
    AddressRow, Centroid, CountryFilter, Names, OsmType, PlaceDocument, PlaceRow, UpdateMarker,
};

pub fn names(name: &str) -> Names {
    let mut names = Names::new();
    names.insert("default".to_string(), name.to_string());
    names
}

pub fn place(place_id: i64, name: &str, key: &str, value: &str, rank: i32) -> PlaceRow {
    PlaceRow {
        place_id,
        osm_type: OsmType::Node,
        osm_id: place_id * 100,
        osm_key: key.to_string(),
        osm_value: value.to_string(),
        rank_address: rank,
        names: if name.is_empty() { Names::new() } else { names(name) },
        house_number: None,
        postcode: None,
        country_code: Some("de".to_string()),
        centroid: Centroid::new(48.1, 11.5),
        importance: 0.2,
        bbox: None,
    }
}

pub fn ancestor(row: &PlaceRow) -> AddressRow {
    row.as_address_row()
}

/// Gazetteer held in memory.
#[derive(Default)]
pub struct MockGazetteer {
    places: Mutex<BTreeMap<i64, PlaceRow>>,
    /// Ancestor ids per place, nearest first.
    parents: Mutex<HashMap<i64, Vec<i64>>>,
    changes: Mutex<Vec<(i64, i64, bool)>>,
    /// Places whose subject row fails to decode.
    unreadable: Mutex<BTreeSet<i64>>,
    /// Places whose row fails to decode when read as someone's ancestor.
    unreadable_ancestors: Mutex<BTreeSet<i64>>,
    /// Fail every `read_places` call after this many.
    fail_reads_after: Mutex<Option<usize>>,
    fail_changes: AtomicBool,
    pub read_calls: AtomicUsize,
    pub change_reads: AtomicUsize,
}

impl MockGazetteer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, row: PlaceRow, parents: &[i64]) {
        self.parents.lock().unwrap().insert(row.place_id, parents.to_vec());
        self.places.lock().unwrap().insert(row.place_id, row);
    }

    /// Modify a place and record the change.
    pub fn update(&self, row: PlaceRow) {
        let place_id = row.place_id;
        self.places.lock().unwrap().insert(place_id, row);
        self.log_change(place_id, false);
    }

    /// Remove a place and record the deletion.
    pub fn remove(&self, place_id: i64) {
        self.places.lock().unwrap().remove(&place_id);
        self.parents.lock().unwrap().remove(&place_id);
        self.log_change(place_id, true);
    }

    fn log_change(&self, place_id: i64, deleted: bool) {
        let mut changes = self.changes.lock().unwrap();
        let seq = changes.last().map(|(seq, _, _)| seq + 1).unwrap_or(1);
        changes.push((seq, place_id, deleted));
    }

    /// Make the subject row of a place undecodable.
    pub fn corrupt(&self, place_id: i64) {
        self.unreadable.lock().unwrap().insert(place_id);
    }

    /// Make the row of a place undecodable in the chains it appears in.
    pub fn corrupt_ancestor(&self, place_id: i64) {
        self.unreadable_ancestors.lock().unwrap().insert(place_id);
    }

    pub fn repair(&self, place_id: i64) {
        self.unreadable.lock().unwrap().remove(&place_id);
        self.unreadable_ancestors.lock().unwrap().remove(&place_id);
    }

    /// Split found rows into a page, leaving out the undecodable ones.
    fn page(&self, found: Vec<PlaceRow>) -> PlacePage {
        let unreadable = self.unreadable.lock().unwrap();
        let last_place_id = found.iter().map(|p| p.place_id).max();
        let (skipped, rows): (Vec<PlaceRow>, Vec<PlaceRow>) = found
            .into_iter()
            .partition(|p| unreadable.contains(&p.place_id));
        PlacePage {
            rows,
            skipped: skipped.len(),
            skipped_ids: skipped.iter().map(|p| p.place_id).collect(),
            last_place_id,
        }
    }

    pub fn fail_reads_after(&self, calls: usize) {
        *self.fail_reads_after.lock().unwrap() = Some(calls);
    }

    pub fn set_fail_changes(&self, fail: bool) {
        self.fail_changes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl GazetteerSource for MockGazetteer {
    async fn read_places(
        &self,
        filter: &CountryFilter,
        after: Option<i64>,
        limit: usize,
    ) -> Result<PlacePage, GazetteerError> {
        let call = self.read_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(max) = *self.fail_reads_after.lock().unwrap() {
            if call >= max {
                return Err(GazetteerError::structural("connection to gazetteer lost"));
            }
        }

        let found: Vec<PlaceRow> = self
            .places
            .lock()
            .unwrap()
            .values()
            .filter(|p| after.map_or(true, |a| p.place_id > a))
            .filter(|p| filter.matches(p.country_code.as_deref()))
            .take(limit)
            .cloned()
            .collect();
        Ok(self.page(found))
    }

    async fn fetch_places(&self, place_ids: &[i64]) -> Result<PlacePage, GazetteerError> {
        let found: Vec<PlaceRow> = {
            let places = self.places.lock().unwrap();
            place_ids
                .iter()
                .filter_map(|id| places.get(id).cloned())
                .collect()
        };
        Ok(self.page(found))
    }

    async fn address_chains(&self, place_ids: &[i64]) -> Result<AddressChains, GazetteerError> {
        let places = self.places.lock().unwrap();
        let parents = self.parents.lock().unwrap();
        let broken = self.unreadable_ancestors.lock().unwrap();

        let mut chains = AddressChains::default();
        for id in place_ids {
            let parent_ids = parents.get(id).cloned().unwrap_or_default();
            let present: Vec<&PlaceRow> =
                parent_ids.iter().filter_map(|p| places.get(p)).collect();
            if present.iter().any(|p| broken.contains(&p.place_id)) {
                chains.incomplete.insert(*id);
            } else {
                let chain: Vec<AddressRow> = present.into_iter().map(ancestor).collect();
                chains.chains.insert(*id, chain);
            }
        }
        Ok(chains)
    }

    async fn current_marker(&self) -> Result<UpdateMarker, GazetteerError> {
        let changes = self.changes.lock().unwrap();
        Ok(UpdateMarker(changes.last().map(|(seq, _, _)| *seq).unwrap_or(0)))
    }

    async fn read_changes(&self, since: UpdateMarker) -> Result<DeltaScan, GazetteerError> {
        self.change_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_changes.load(Ordering::SeqCst) {
            return Err(GazetteerError::structural("place_changes is unavailable"));
        }
        let changes = self.changes.lock().unwrap();
        let newer: Vec<(i64, i64, bool)> = changes
            .iter()
            .filter(|(seq, _, _)| *seq > since.sequence())
            .copied()
            .collect();
        Ok(collapse_changes(&newer, since))
    }

    async fn find_dependents(&self, ancestor_ids: &[i64]) -> Result<Vec<i64>, GazetteerError> {
        let wanted: BTreeSet<i64> = ancestor_ids.iter().copied().collect();
        let parents = self.parents.lock().unwrap();
        Ok(parents
            .iter()
            .filter(|(_, chain)| chain.iter().any(|p| wanted.contains(p)))
            .map(|(id, _)| *id)
            .collect())
    }
}

/// Search index held in memory.
#[derive(Default)]
pub struct MockIndex {
    pub documents: Mutex<BTreeMap<i64, PlaceDocument>>,
    marker: Mutex<Option<UpdateMarker>>,
    exists: AtomicBool,
    /// Upsert requests after this many fail as unreachable.
    fail_upserts_after: Mutex<Option<usize>>,
    /// Ids rejected per item.
    rejected: Mutex<BTreeSet<i64>>,
    fail_marker_writes: AtomicBool,
    /// Set by `mark_rebuilding`, cleared by the next stored marker.
    rebuilding: AtomicBool,
    pub upsert_requests: AtomicUsize,
    pub delete_requests: AtomicUsize,
    pub drops: AtomicUsize,
    pub creates: AtomicUsize,
    pub refreshes: AtomicUsize,
}

impl MockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_marker(self, marker: UpdateMarker) -> Self {
        *self.marker.lock().unwrap() = Some(marker);
        self
    }

    pub fn fail_upserts_after(&self, requests: usize) {
        *self.fail_upserts_after.lock().unwrap() = Some(requests);
    }

    pub fn reject(&self, place_id: i64) {
        self.rejected.lock().unwrap().insert(place_id);
    }

    pub fn accept_all(&self) {
        self.rejected.lock().unwrap().clear();
        *self.fail_upserts_after.lock().unwrap() = None;
    }

    pub fn set_fail_marker_writes(&self, fail: bool) {
        self.fail_marker_writes.store(fail, Ordering::SeqCst);
    }

    pub fn stored_marker(&self) -> Option<UpdateMarker> {
        *self.marker.lock().unwrap()
    }

    pub fn document(&self, place_id: i64) -> Option<PlaceDocument> {
        self.documents.lock().unwrap().get(&place_id).cloned()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.documents.lock().unwrap().keys().copied().collect()
    }

    pub fn snapshot(&self) -> BTreeMap<i64, PlaceDocument> {
        self.documents.lock().unwrap().clone()
    }

    pub fn exists(&self) -> bool {
        self.exists.load(Ordering::SeqCst)
    }

    pub fn rebuild_flagged(&self) -> bool {
        self.rebuilding.load(Ordering::SeqCst)
    }

    fn item_results<F>(&self, ids: Vec<i64>, mut apply: F) -> BatchOperationSummary
    where
        F: FnMut(i64),
    {
        let rejected = self.rejected.lock().unwrap().clone();
        let results = ids
            .into_iter()
            .map(|id| {
                if rejected.contains(&id) {
                    BatchOperationResult::failed(id, SearchIndexError::bulk_index("rejected"))
                } else {
                    apply(id);
                    BatchOperationResult::ok(id)
                }
            })
            .collect();
        BatchOperationSummary::from_results(results)
    }
}

#[async_trait]
impl SearchIndexProvider for MockIndex {
    async fn create_index(&self) -> Result<(), SearchIndexError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.exists.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn drop_index(&self) -> Result<(), SearchIndexError> {
        self.drops.fetch_add(1, Ordering::SeqCst);
        self.exists.store(false, Ordering::SeqCst);
        self.documents.lock().unwrap().clear();
        Ok(())
    }

    async fn index_exists(&self) -> Result<bool, SearchIndexError> {
        Ok(self.exists())
    }

    async fn bulk_upsert_documents(
        &self,
        documents: &[PlaceDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        let request = self.upsert_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(max) = *self.fail_upserts_after.lock().unwrap() {
            if request >= max {
                return Err(SearchIndexError::connection("connection refused"));
            }
        }

        let by_id: HashMap<i64, &PlaceDocument> =
            documents.iter().map(|d| (d.place_id, d)).collect();
        let ids: Vec<i64> = documents.iter().map(|d| d.place_id).collect();
        let mut stored = self.documents.lock().unwrap();
        Ok(self.item_results(ids, |id| {
            if let Some(doc) = by_id.get(&id) {
                stored.insert(id, (*doc).clone());
            }
        }))
    }

    async fn bulk_delete_documents(
        &self,
        place_ids: &[i64],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        self.delete_requests.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.documents.lock().unwrap();
        Ok(self.item_results(place_ids.to_vec(), |id| {
            stored.remove(&id);
        }))
    }

    async fn refresh(&self) -> Result<(), SearchIndexError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self, _block_until_ready: bool) -> Result<IndexHealth, SearchIndexError> {
        Ok(IndexHealth::Green)
    }

    async fn get_stored_marker(&self) -> Result<Option<UpdateMarker>, SearchIndexError> {
        Ok(self.stored_marker())
    }

    async fn set_stored_marker(&self, marker: UpdateMarker) -> Result<(), SearchIndexError> {
        if self.fail_marker_writes.load(Ordering::SeqCst) {
            return Err(SearchIndexError::index("meta index is read-only"));
        }
        *self.marker.lock().unwrap() = Some(marker);
        self.rebuilding.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn mark_rebuilding(&self) -> Result<(), SearchIndexError> {
        *self.marker.lock().unwrap() = None;
        self.rebuilding.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_rebuilding(&self) -> Result<bool, SearchIndexError> {
        Ok(self.rebuild_flagged())
    }
}

/// Everything a pipeline test needs.
pub struct Harness {
    pub gazetteer: Arc<MockGazetteer>,
    pub index: Arc<MockIndex>,
    pub runner: PipelineRunner,
}

impl Harness {
    pub fn new(gazetteer: MockGazetteer, index: MockIndex, batch_size: usize) -> Self {
        Self::with_start_marker(gazetteer, index, batch_size, None)
    }

    pub fn with_start_marker(
        gazetteer: MockGazetteer,
        index: MockIndex,
        batch_size: usize,
        start_marker: Option<UpdateMarker>,
    ) -> Self {
        let gazetteer = Arc::new(gazetteer);
        let index = Arc::new(index);

        let reader = GazetteerReader::new(gazetteer.clone(), batch_size);
        let loader = SearchLoader::with_config(
            index.clone(),
            LoaderConfig {
                batch_size,
                retry: RetryPolicy {
                    max_retries: 2,
                    initial_backoff: Duration::from_millis(100),
                    max_backoff: Duration::from_secs(1),
                },
            },
        );
        let builder = DocumentBuilder::new();

        let import = Arc::new(ImportPipeline::new(
            reader.clone(),
            builder.clone(),
            loader.clone(),
            CountryFilter::all(),
            IndexReadiness::Ready,
        ));
        let update = Arc::new(UpdatePipeline::new(reader, builder, loader, start_marker));

        Self {
            gazetteer,
            index,
            runner: PipelineRunner::new(import, update),
        }
    }
}

/// A small hierarchy: Germany (1) > Bavaria (2) > Munich (3) > Leopoldstraße (4), with
/// buildings 10.. on the street.
pub fn munich(buildings: i64) -> MockGazetteer {
    let gazetteer = MockGazetteer::new();
    gazetteer.insert(place(1, "Germany", "boundary", "administrative", 4), &[]);
    gazetteer.insert(place(2, "Bavaria", "boundary", "administrative", 8), &[1]);
    gazetteer.insert(place(3, "Munich", "place", "city", 16), &[2, 1]);
    gazetteer.insert(place(4, "Leopoldstraße", "highway", "residential", 26), &[3, 2, 1]);
    for i in 0..buildings {
        let mut building = place(10 + i, "", "building", "yes", 30);
        building.house_number = Some((i + 1).to_string());
        gazetteer.insert(building, &[4, 3, 2, 1]);
    }
    gazetteer
}
