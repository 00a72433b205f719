use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clickhouse::Client;
use tracing::{info, warn};

use backend_application::ops::{
    FanoutPublisher,
    SettingsProvider,
    UserLocks,
    VisitPublishQueue,
    VisitStreamHub,
};
use backend_application::{AppState, Metrics};
use backend_domain::ports::{
    LocationRepository,
    PlaceIndex,
    SettingsRepository,
    VisitPublisher,
    VisitStateRepository,
    VisitTransitionRepository,
};
use backend_domain::{DbConfig, RuntimeConfig, StorageBackend};
use backend_infrastructure::{
    AppConfig,
    CatalogPlaceIndex,
    ClickhouseRepo,
    ConfigFileRepository,
    DefaultHealthService,
    MemoryLocationRepository,
    MemoryTransitionRepository,
    MemoryVisitStateRepository,
    WebhookVisitPublisher,
};

pub struct AppContext {
    pub state: AppState,
}

/// Storage and reference-data ports the state is assembled from.
pub struct Ports {
    pub location_repo: Arc<dyn LocationRepository>,
    pub transition_repo: Arc<dyn VisitTransitionRepository>,
    pub visit_store: Arc<dyn VisitStateRepository>,
    pub settings_repo: Arc<dyn SettingsRepository>,
    pub place_index: Arc<dyn PlaceIndex>,
}

impl AppContext {
    pub async fn new(config_path: Option<&str>) -> Result<Self> {
        let config = match config_path {
            Some(path) => AppConfig::load_from(path).await?,
            None => AppConfig::load().await?,
        };
        Self::from_config(config).await
    }

    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let runtime_config = config.to_runtime_config();
        let db_config = config.to_db_config();

        let (location_repo, transition_repo) = build_log_repositories(&db_config, &runtime_config).await?;

        let files = Arc::new(ConfigFileRepository::new(
            runtime_config.settings_path.clone(),
            runtime_config.places_path.clone(),
        ));
        let place_index = Arc::new(CatalogPlaceIndex::new(files.clone()));
        if let Err(err) = place_index.reload().await {
            warn!("place catalog not loaded, starting with an empty index: {}", err);
        }
        if let Err(err) = files.load_detection_settings().await.and_then(|doc| doc.validate()) {
            warn!("detection settings invalid, defaults will be used: {}", err);
        }

        let ports = Ports {
            location_repo,
            transition_repo,
            visit_store: Arc::new(MemoryVisitStateRepository::new(
                runtime_config.visit_history_limit,
            )),
            settings_repo: files,
            place_index,
        };
        let state = assemble_state(runtime_config, ports)?;
        Ok(Self { state })
    }
}

async fn build_log_repositories(
    db_config: &DbConfig,
    runtime_config: &RuntimeConfig,
) -> Result<(Arc<dyn LocationRepository>, Arc<dyn VisitTransitionRepository>)> {
    match db_config.storage_backend {
        StorageBackend::Clickhouse => {
            let mut clickhouse = Client::default()
                .with_url(&db_config.clickhouse_url)
                .with_database(&db_config.clickhouse_database);
            if let Some(user) = &db_config.clickhouse_user {
                clickhouse = clickhouse.with_user(user);
            }
            if let Some(password) = &db_config.clickhouse_password {
                clickhouse = clickhouse.with_password(password);
            }
            let repo = Arc::new(ClickhouseRepo::new(
                clickhouse,
                db_config.clickhouse_database.clone(),
            ));
            repo.ensure_schema().await?;
            info!("storage: clickhouse at {}", db_config.clickhouse_url);
            let location_repo: Arc<dyn LocationRepository> = repo.clone();
            let transition_repo: Arc<dyn VisitTransitionRepository> = repo;
            Ok((location_repo, transition_repo))
        }
        StorageBackend::Memory => {
            info!("storage: in-memory buffers");
            let limit = runtime_config.location_buffer_limit;
            let location_repo: Arc<dyn LocationRepository> =
                Arc::new(MemoryLocationRepository::new(limit));
            let transition_repo: Arc<dyn VisitTransitionRepository> =
                Arc::new(MemoryTransitionRepository::new(limit));
            Ok((location_repo, transition_repo))
        }
    }
}

/// Wires publishers, settings cache, locks and metrics around the ports.
pub fn assemble_state(config: RuntimeConfig, ports: Ports) -> Result<AppState> {
    let stream_hub = Arc::new(VisitStreamHub::default());
    let mut targets: Vec<Arc<dyn VisitPublisher>> = vec![stream_hub.clone() as Arc<dyn VisitPublisher>];
    if let Some(webhook) = WebhookVisitPublisher::from_config(&config)? {
        info!("visit webhook enabled");
        targets.push(Arc::new(webhook));
    }
    let settings = Arc::new(SettingsProvider::new(
        ports.settings_repo,
        Duration::from_secs(config.settings_cache_seconds),
    ));
    let health = Arc::new(DefaultHealthService::new(
        ports.location_repo.clone(),
        ports.place_index.clone(),
    ));

    let metrics = Arc::new(Metrics::default());
    let publish_queue = Arc::new(VisitPublishQueue::new(
        Arc::new(FanoutPublisher::new(targets)),
        metrics.clone(),
    ));

    Ok(AppState {
        config,
        location_repo: ports.location_repo,
        visit_store: ports.visit_store,
        transition_repo: ports.transition_repo,
        settings,
        place_index: ports.place_index,
        publish_queue,
        stream_hub,
        health,
        user_locks: Arc::new(UserLocks::default()),
        metrics,
    })
}
