//! OpenSearch provider implementation.
//!
//! This module provides the concrete implementation of `SearchIndexProvider` and
//! `PlaceSearchProvider` using the OpenSearch Rust crate.

use async_trait::async_trait;
use opensearch::{
    cluster::ClusterHealthParts,
    http::{
        request::JsonBody,
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
    indices::{
        IndicesCreateParts, IndicesDeleteParts, IndicesExistsAliasParts, IndicesPutAliasParts,
        IndicesRefreshParts,
    },
    params::{Refresh, WaitForStatus},
    BulkParts, GetParts, IndexParts, OpenSearch, SearchParts,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use url::Url;

use place_indexer_shared::{
    ForwardQuery, MarkerRecord, PlaceDocument, ReverseQuery, SearchResponse, UpdateMarker,
};

use crate::errors::SearchIndexError;
use crate::interfaces::{PlaceSearchProvider, SearchIndexProvider};
use crate::opensearch::index_config::{
    get_index_settings, get_meta_index_settings, IndexConfig, MARKER_DOCUMENT_ID,
};
use crate::opensearch::query::{
    build_forward_query, build_reverse_query, parse_search_response, MatchTier,
};
use crate::types::{BatchOperationResult, BatchOperationSummary, IndexHealth};

/// Default maximum number of documents in one bulk request.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 5000;

/// How long a blocking health check waits for the cluster.
const HEALTH_TIMEOUT: &str = "30s";

/// Bulk action names as they appear in requests and response items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BulkAction {
    Index,
    Delete,
}

impl BulkAction {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Delete => "delete",
        }
    }
}

/// OpenSearch provider implementation.
///
/// Writes go to the alias, so the active generation can be swapped without
/// touching the pipelines.
///
/// # Example
///
/// ```ignore
/// use place_indexer_repository::opensearch::{IndexConfig, OpenSearchProvider};
///
/// let config = IndexConfig::new("places", 0);
/// let provider = OpenSearchProvider::new("http://localhost:9200", config).await?;
///
/// provider.create_index().await?;
/// let summary = provider.bulk_upsert_documents(&documents).await?;
/// ```
pub struct OpenSearchProvider {
    client: OpenSearch,
    index_config: IndexConfig,
    max_batch_size: usize,
}

impl OpenSearchProvider {
    /// Create a new OpenSearch provider connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `index_config` - The index configuration containing alias and version
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchProvider)` - A new provider instance
    /// * `Err(SearchIndexError)` - If connection setup fails
    pub async fn new(url: &str, index_config: IndexConfig) -> Result<Self, SearchIndexError> {
        let parsed_url =
            Url::parse(url).map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            alias = %index_config.alias,
            version = index_config.version,
            "Created OpenSearch provider"
        );

        Ok(Self {
            client,
            index_config,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        })
    }

    /// Override the maximum number of documents per bulk request.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// The index configuration in use.
    pub fn index_config(&self) -> &IndexConfig {
        &self.index_config
    }

    fn validate_batch_size(&self, size: usize) -> Result<(), SearchIndexError> {
        if size > self.max_batch_size {
            return Err(SearchIndexError::batch_size_exceeded(
                size,
                self.max_batch_size,
            ));
        }
        Ok(())
    }

    /// Read the record in the metadata index, if there is one.
    async fn read_marker_record(&self) -> Result<Option<MarkerRecord>, SearchIndexError> {
        let meta_index = self.index_config.meta_index_name();
        let response = self
            .client
            .get(GetParts::IndexId(&meta_index, MARKER_DOCUMENT_ID))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let status = response.status_code();

        // 404 covers both a missing document and a missing metadata index
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let error_body = Self::error_body(response).await;
            return Err(SearchIndexError::index(format!(
                "Reading marker failed with status {}: {}",
                status, error_body
            )));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        if body["found"].as_bool() == Some(false) {
            return Ok(None);
        }

        serde_json::from_value(body["_source"].clone())
            .map(Some)
            .map_err(|e| SearchIndexError::parse(format!("Invalid marker record: {}", e)))
    }

    /// Replace the record in the metadata index, visible to reads when this returns.
    async fn write_marker_record(&self, record: &MarkerRecord) -> Result<(), SearchIndexError> {
        let meta_index = self.index_config.meta_index_name();
        let body = serde_json::to_value(record)
            .map_err(|e| SearchIndexError::serialization(e.to_string()))?;

        let response = self
            .client
            .index(IndexParts::IndexId(&meta_index, MARKER_DOCUMENT_ID))
            .refresh(Refresh::True)
            .body(body)
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = Self::error_body(response).await;
            error!(status = %status, body = %error_body, "Writing marker failed");
            return Err(SearchIndexError::index(format!(
                "Writing marker failed with status {}: {}",
                status, error_body
            )));
        }
        Ok(())
    }

    /// Read the body of a failed response for error reporting.
    async fn error_body(response: Response) -> String {
        response.text().await.unwrap_or_default()
    }

    /// Create an index from settings, treating "already exists" as success.
    async fn create_named_index(&self, name: &str, settings: Value) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(name))
            .body(settings)
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if status.is_success() {
            info!(index = %name, "Index created");
            return Ok(());
        }

        let error_body = Self::error_body(response).await;
        if status.as_u16() == 400 && error_body.contains("resource_already_exists_exception") {
            debug!(index = %name, "Index already exists");
            return Ok(());
        }

        error!(index = %name, status = %status, body = %error_body, "Index creation failed");
        Err(SearchIndexError::index_creation(format!(
            "Creating {} failed with status {}: {}",
            name, status, error_body
        )))
    }

    /// Build the NDJSON body of a bulk upsert.
    fn upsert_body(documents: &[PlaceDocument]) -> Result<Vec<JsonBody<Value>>, SearchIndexError> {
        let mut body = Vec::with_capacity(documents.len() * 2);
        for doc in documents {
            body.push(JsonBody::new(json!({ "index": { "_id": doc.document_id() } })));
            let source = serde_json::to_value(doc)
                .map_err(|e| SearchIndexError::serialization(e.to_string()))?;
            body.push(JsonBody::new(source));
        }
        Ok(body)
    }

    /// Build the NDJSON body of a bulk delete.
    fn delete_body(place_ids: &[i64]) -> Vec<JsonBody<Value>> {
        place_ids
            .iter()
            .map(|id| JsonBody::new(json!({ "delete": { "_id": id.to_string() } })))
            .collect()
    }

    /// Map a `_bulk` response back to per-place results.
    ///
    /// Items are matched by position, which the bulk API preserves. A delete that finds
    /// nothing (404) counts as success.
    fn parse_bulk_response(
        body: &Value,
        place_ids: &[i64],
        action: BulkAction,
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        let items = body["items"]
            .as_array()
            .ok_or_else(|| SearchIndexError::parse("Bulk response has no items array"))?;

        if items.len() != place_ids.len() {
            return Err(SearchIndexError::parse(format!(
                "Bulk response has {} items for {} requests",
                items.len(),
                place_ids.len()
            )));
        }

        let results = items
            .iter()
            .zip(place_ids)
            .map(|(item, &place_id)| {
                let entry = &item[action.as_str()];
                let status = entry["status"].as_u64().unwrap_or(0);

                if (200..300).contains(&status) || (action == BulkAction::Delete && status == 404) {
                    return BatchOperationResult::ok(place_id);
                }

                let reason = entry["error"]["reason"]
                    .as_str()
                    .or_else(|| entry["error"]["type"].as_str())
                    .unwrap_or("unknown error");
                let message = format!("status {}: {}", status, reason);
                let error = match action {
                    BulkAction::Index => SearchIndexError::bulk_index(message),
                    BulkAction::Delete => SearchIndexError::delete(message),
                };
                BatchOperationResult::failed(place_id, error)
            })
            .collect();

        Ok(BatchOperationSummary::from_results(results))
    }

    /// Send a bulk body to the alias and parse the item outcomes.
    async fn send_bulk(
        &self,
        body: Vec<JsonBody<Value>>,
        place_ids: &[i64],
        action: BulkAction,
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        let response = self
            .client
            .bulk(BulkParts::Index(&self.index_config.alias))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = Self::error_body(response).await;
            error!(status = %status, body = %error_body, action = action.as_str(), "Bulk request failed");
            return Err(SearchIndexError::bulk_index(format!(
                "Bulk {} failed with status {}: {}",
                action.as_str(),
                status,
                error_body
            )));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        let summary = Self::parse_bulk_response(&body, place_ids, action)?;
        if summary.failed > 0 {
            warn!(
                action = action.as_str(),
                total = summary.total,
                failed = summary.failed,
                "Bulk request had item failures"
            );
        } else {
            debug!(action = action.as_str(), total = summary.total, "Bulk request succeeded");
        }
        Ok(summary)
    }

    async fn execute_search(&self, body: Value) -> Result<Value, SearchIndexError> {
        let response = self
            .client
            .search(SearchParts::Index(&[&self.index_config.alias]))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = Self::error_body(response).await;
            error!(status = %status, body = %error_body, "Search request failed");
            return Err(SearchIndexError::query(format!(
                "Search failed with status {}: {}",
                status, error_body
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))
    }
}

#[async_trait]
impl SearchIndexProvider for OpenSearchProvider {
    /// Create the generation index, point the alias at it, and make sure the metadata
    /// index exists.
    async fn create_index(&self) -> Result<(), SearchIndexError> {
        let index_name = self.index_config.versioned_index_name();
        self.create_named_index(&index_name, get_index_settings())
            .await?;

        let response = self
            .client
            .indices()
            .put_alias(IndicesPutAliasParts::IndexName(
                &[&index_name],
                &self.index_config.alias,
            ))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = Self::error_body(response).await;
            error!(status = %status, body = %error_body, "Alias creation failed");
            return Err(SearchIndexError::index_creation(format!(
                "Pointing alias {} at {} failed with status {}: {}",
                self.index_config.alias, index_name, status, error_body
            )));
        }

        info!(index = %index_name, alias = %self.index_config.alias, "Alias points at index");

        self.create_named_index(&self.index_config.meta_index_name(), get_meta_index_settings())
            .await
    }

    async fn drop_index(&self) -> Result<(), SearchIndexError> {
        let index_name = self.index_config.versioned_index_name();
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[&index_name]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let status = response.status_code();

        // 404 is acceptable - index may not exist
        if !status.is_success() && status.as_u16() != 404 {
            let error_body = Self::error_body(response).await;
            error!(status = %status, body = %error_body, "Index deletion failed");
            return Err(SearchIndexError::delete(format!(
                "Dropping {} failed with status {}: {}",
                index_name, status, error_body
            )));
        }

        info!(index = %index_name, "Index dropped");
        Ok(())
    }

    async fn index_exists(&self) -> Result<bool, SearchIndexError> {
        let response = self
            .client
            .indices()
            .exists_alias(IndicesExistsAliasParts::Name(&[&self.index_config.alias]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        Ok(response.status_code().is_success())
    }

    async fn bulk_upsert_documents(
        &self,
        documents: &[PlaceDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        if documents.is_empty() {
            return Ok(BatchOperationSummary::default());
        }
        self.validate_batch_size(documents.len())?;

        let place_ids: Vec<i64> = documents.iter().map(|d| d.place_id).collect();
        let body = Self::upsert_body(documents)?;
        self.send_bulk(body, &place_ids, BulkAction::Index).await
    }

    async fn bulk_delete_documents(
        &self,
        place_ids: &[i64],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        if place_ids.is_empty() {
            return Ok(BatchOperationSummary::default());
        }
        self.validate_batch_size(place_ids.len())?;

        let body = Self::delete_body(place_ids);
        self.send_bulk(body, place_ids, BulkAction::Delete).await
    }

    async fn refresh(&self) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[&self.index_config.alias]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = Self::error_body(response).await;
            return Err(SearchIndexError::index(format!(
                "Refresh failed with status {}: {}",
                status, error_body
            )));
        }

        debug!(alias = %self.index_config.alias, "Index refreshed");
        Ok(())
    }

    async fn health_check(&self, block_until_ready: bool) -> Result<IndexHealth, SearchIndexError> {
        let cluster = self.client.cluster();
        let health = cluster.health(ClusterHealthParts::None);
        let health = if block_until_ready {
            health
                .wait_for_status(WaitForStatus::Yellow)
                .timeout(HEALTH_TIMEOUT)
        } else {
            health
        };

        let response = health
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        // A blocking call that times out answers 408 with the current status in the body.
        let status = response.status_code();
        if !status.is_success() && status.as_u16() != 408 {
            let error_body = Self::error_body(response).await;
            return Err(SearchIndexError::connection(format!(
                "Health check failed with status {}: {}",
                status, error_body
            )));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        body["status"]
            .as_str()
            .and_then(IndexHealth::parse)
            .ok_or_else(|| SearchIndexError::parse("Health response has no status"))
    }

    async fn get_stored_marker(&self) -> Result<Option<UpdateMarker>, SearchIndexError> {
        Ok(self
            .read_marker_record()
            .await?
            .and_then(|record| record.sequence))
    }

    async fn set_stored_marker(&self, marker: UpdateMarker) -> Result<(), SearchIndexError> {
        self.write_marker_record(&MarkerRecord::now(marker)).await?;
        debug!(marker = %marker, "Marker stored");
        Ok(())
    }

    async fn mark_rebuilding(&self) -> Result<(), SearchIndexError> {
        // The first import runs before create_index has made the metadata index.
        self.create_named_index(&self.index_config.meta_index_name(), get_meta_index_settings())
            .await?;
        self.write_marker_record(&MarkerRecord::rebuilding()).await?;
        info!(alias = %self.index_config.alias, "Index marked as rebuilding");
        Ok(())
    }

    async fn is_rebuilding(&self) -> Result<bool, SearchIndexError> {
        Ok(self
            .read_marker_record()
            .await?
            .map_or(false, |record| record.rebuilding))
    }
}

#[async_trait]
impl PlaceSearchProvider for OpenSearchProvider {
    /// Strict tier first; the fuzzy tier only runs when the strict one found nothing.
    async fn search(&self, query: &ForwardQuery) -> Result<SearchResponse, SearchIndexError> {
        let language = query.language.as_deref();

        let body = self
            .execute_search(build_forward_query(query, MatchTier::Strict))
            .await?;
        let response = parse_search_response(&body, language, false)?;
        if !response.is_empty() {
            return Ok(response);
        }

        debug!(query = %query.query, "No strict matches, retrying with fuzzy matching");
        let body = self
            .execute_search(build_forward_query(query, MatchTier::Fuzzy))
            .await?;
        parse_search_response(&body, language, false)
    }

    async fn reverse(&self, query: &ReverseQuery) -> Result<SearchResponse, SearchIndexError> {
        let body = self.execute_search(build_reverse_query(query)?).await?;
        parse_search_response(&body, query.language.as_deref(), true)
    }
}
