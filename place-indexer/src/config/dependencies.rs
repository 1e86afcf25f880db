//! Dependency initialization and wiring for the place indexer.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::settings::{ConnectionMode, RunMode, Settings};
use crate::loader::SearchLoader;
use crate::orchestrator::{ImportPipeline, IndexReadiness, PipelineRunner, UpdatePipeline};
use crate::processor::DocumentBuilder;
use crate::reader::GazetteerReader;
use crate::search::GeocodingService;
use crate::IndexingError;
use place_indexer_repository::opensearch::IndexConfig;
use place_indexer_repository::postgres::connect;
use place_indexer_repository::{
    GazetteerSource, OpenSearchProvider, PlaceSearchProvider, PostgresGazetteer,
    SearchIndexProvider,
};

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub settings: Settings,
    /// Single-flight launcher for both pipelines.
    pub runner: PipelineRunner,
    /// Validated query surface over the same index.
    pub geocoder: GeocodingService,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// See [`Settings::from_env`] for the variables read.
    pub async fn new() -> Result<Self, IndexingError> {
        Self::with_settings(Settings::from_env()?).await
    }

    /// Initialize all dependencies from the given settings.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If initialization fails (for OpenSearch only in fail-fast mode)
    pub async fn with_settings(settings: Settings) -> Result<Self, IndexingError> {
        info!(
            mode = ?settings.mode,
            opensearch_url = %settings.opensearch_url,
            index = %settings.index.versioned_index_name(),
            gazetteer_host = %settings.gazetteer.host,
            gazetteer_database = %settings.gazetteer.database,
            connection_mode = ?settings.connection_mode,
            retry_interval_secs = settings.retry_interval.as_secs(),
            "Initializing dependencies"
        );

        // Initialize OpenSearch provider with retry logic
        let search_provider = Arc::new(
            Self::connect_to_opensearch(
                &settings.opensearch_url,
                settings.index.clone(),
                settings.connection_mode,
                settings.retry_interval,
            )
            .await?,
        );

        info!("OpenSearch connection established");

        let pool = connect(&settings.gazetteer).await.map_err(|e| {
            IndexingError::config(format!("Failed to connect to gazetteer database: {}", e))
        })?;
        let gazetteer: Arc<dyn GazetteerSource> = Arc::new(PostgresGazetteer::new(pool));

        let index: Arc<dyn SearchIndexProvider> = search_provider.clone();
        let search: Arc<dyn PlaceSearchProvider> = search_provider;

        let readiness = Self::initial_readiness(index.as_ref(), settings.mode).await?;

        let reader = GazetteerReader::new(gazetteer, settings.loader.batch_size);
        let builder = DocumentBuilder::new();
        let loader = SearchLoader::with_config(index, settings.loader.clone());

        let import = Arc::new(ImportPipeline::new(
            reader.clone(),
            builder.clone(),
            loader.clone(),
            settings.countries.clone(),
            readiness,
        ));
        let update = Arc::new(UpdatePipeline::new(
            reader,
            builder,
            loader,
            settings.start_marker,
        ));

        let geocoder = GeocodingService::new(
            search,
            settings.languages.clone(),
            import.subscribe_readiness(),
        );
        let runner = PipelineRunner::new(import, update);

        Ok(Self {
            settings,
            runner,
            geocoder,
        })
    }

    /// Check the index at startup.
    ///
    /// An index left behind by an import that never committed is incomplete. Update modes
    /// need an index to write to, so a missing one is created (empty, hence not ready).
    pub async fn initial_readiness(
        index: &dyn SearchIndexProvider,
        mode: RunMode,
    ) -> Result<IndexReadiness, IndexingError> {
        let exists = index
            .index_exists()
            .await
            .map_err(|e| IndexingError::config(format!("Failed to check index: {}", e)))?;

        if exists {
            let rebuilding = index.is_rebuilding().await.map_err(|e| {
                IndexingError::config(format!("Failed to read index metadata: {}", e))
            })?;
            if rebuilding {
                warn!("Index was left by an unfinished import; run a full import to complete it");
                return Ok(IndexReadiness::Incomplete);
            }
            return Ok(IndexReadiness::Ready);
        }

        if matches!(mode, RunMode::Update | RunMode::UpdateLoop) {
            warn!("Index does not exist, creating an empty one; run a full import to populate it");
            index
                .create_index()
                .await
                .map_err(|e| IndexingError::config(format!("Failed to create index: {}", e)))?;
        }
        Ok(IndexReadiness::Incomplete)
    }

    /// Connect to OpenSearch with retry logic based on connection mode.
    async fn connect_to_opensearch(
        url: &str,
        index_config: IndexConfig,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchProvider, IndexingError> {
        loop {
            match Self::try_connect_opensearch(url, index_config.clone()).await {
                Ok(provider) => return Ok(provider),
                Err(e) => match mode {
                    ConnectionMode::FailFast => {
                        return Err(IndexingError::config(format!(
                            "Failed to connect to OpenSearch: {}",
                            e
                        )));
                    }
                    ConnectionMode::Retry => {
                        warn!(
                            opensearch_url = %url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }

    /// Attempt to connect to OpenSearch and wait for the cluster to serve requests.
    async fn try_connect_opensearch(
        url: &str,
        index_config: IndexConfig,
    ) -> Result<OpenSearchProvider, IndexingError> {
        let search_provider = OpenSearchProvider::new(url, index_config)
            .await
            .map_err(|e| {
                IndexingError::config(format!("Failed to create OpenSearch provider: {}", e))
            })?;

        let health = search_provider
            .health_check(true)
            .await
            .map_err(|e| IndexingError::config(format!("Health check failed: {}", e)))?;
        if !health.is_available() {
            return Err(IndexingError::config(format!(
                "Cluster is not available (status {:?})",
                health
            )));
        }

        Ok(search_provider)
    }
}
