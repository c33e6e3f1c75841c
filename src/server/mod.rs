pub mod config;
pub mod request_logger;

use crate::{
    config::Config,
    error::AppError,
    events::BusWriteFeed,
    health::HealthService,
    jobs::{BusCleanupJob, Job, JobScheduler},
    metrics,
    reporting::{
        ListenerHealthChecker, StatsQueryService, WriteReactionHandler, WriteReactionListener,
    },
    routes::{create_bus_routes, create_health_routes, create_stats_routes},
    server::request_logger::request_response_logger,
    shutdown::{ShutdownCoordinator, ShutdownManager},
    storage::{DocumentStore, NotifyingDocumentStore, StoreFactory, StoreHealthChecker},
};
use axum::{Router, middleware};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{error, info};

#[derive(Clone)]
pub struct Server {
    pub config: Arc<Config>,
    /// Store handle every component shares; bus writes through it reach the feed
    pub store: Arc<dyn DocumentStore>,
    pub feed: BusWriteFeed,
    pub listener: Arc<WriteReactionListener>,
    pub job_scheduler: Arc<RwLock<JobScheduler>>,
    pub stats_service: Arc<StatsQueryService>,
    pub health_service: Arc<HealthService>,
    pub shutdown_coordinator: Arc<ShutdownCoordinator>,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, AppError> {
        if config.metrics.enabled {
            if let Err(e) = metrics::init_metrics_with_port(config.metrics.port) {
                error!(
                    "Failed to start metrics server on port {}: {}",
                    config.metrics.port, e
                );
                return Err(AppError::Internal(format!(
                    "Failed to start metrics server: {}",
                    e
                )));
            }
        }

        let backend = StoreFactory::create_backend(&config.store).await?;
        Self::with_store(config, backend).await
    }

    /// Wire every component around an already constructed backend
    pub async fn with_store(
        config: Config,
        backend: Arc<dyn DocumentStore>,
    ) -> Result<Self, AppError> {
        let time_zone = config.time_zone()?;

        let feed = BusWriteFeed::new(config.reporting.feed_capacity);
        let store: Arc<dyn DocumentStore> =
            Arc::new(NotifyingDocumentStore::new(backend, feed.clone()));

        let handler = Arc::new(WriteReactionHandler::new(store.clone(), time_zone));
        let listener = Arc::new(WriteReactionListener::new(
            handler,
            feed.clone(),
            Duration::from_secs(config.shutdown.reaction_drain_timeout_seconds),
        ));

        let shutdown_coordinator = Arc::new(ShutdownCoordinator::new());
        let job_scheduler = Arc::new(RwLock::new(JobScheduler::with_shutdown_coordinator(
            config.jobs.clone(),
            time_zone,
            shutdown_coordinator.subscribe(),
        )));

        let stats_service = Arc::new(StatsQueryService::new(store.clone()));

        let health_service = Arc::new(HealthService::new());
        health_service
            .register(Arc::new(StoreHealthChecker::new(store.clone())))
            .await;
        health_service
            .register(Arc::new(ListenerHealthChecker::new(
                listener.clone(),
                feed.clone(),
            )))
            .await;

        Ok(Self {
            config: Arc::new(config),
            store,
            feed,
            listener,
            job_scheduler,
            stats_service,
            health_service,
            shutdown_coordinator,
        })
    }

    /// Jobs registered with the scheduler
    pub fn jobs(&self) -> Vec<Arc<dyn Job>> {
        vec![Arc::new(BusCleanupJob::new(
            self.store.clone(),
            self.config.jobs.bus_cleanup.retention_hours,
        ))]
    }

    /// Start the write-reaction listener and the job scheduler
    pub async fn start_background(&self) -> Result<(), AppError> {
        self.listener.start().await;
        self.job_scheduler.write().await.start(self.jobs()).await
    }

    pub async fn run(&self) -> Result<(), AppError> {
        self.start_background().await?;

        let app = self.create_app();

        let listener = TcpListener::bind((self.config.server.host.as_str(), self.config.server.port))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to bind to address: {}", e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| AppError::Internal(format!("Failed to read bound address: {}", e)))?;

        info!("Server listening on http://{}", addr);

        let shutdown_coordinator = self.shutdown_coordinator.clone();
        tokio::spawn(async move {
            shutdown_coordinator.wait_for_shutdown_signal().await;
        });

        let coordinator = self.shutdown_coordinator.clone();
        let mut serve_rx = self.shutdown_coordinator.subscribe();
        let http_task = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = serve_rx.wait_for(|stop| *stop).await;
                info!("Graceful shutdown initiated");
            })
            .await;

            if let Err(e) = result {
                error!("Server error: {}", e);
                coordinator.initiate_shutdown();
            }
        });

        let mut shutdown_manager = ShutdownManager::new(Duration::from_secs(
            self.config.shutdown.component_timeout_seconds,
        ));
        shutdown_manager.register_server_components(self, http_task);

        let mut shutdown_rx = self.shutdown_coordinator.subscribe();
        let _ = shutdown_rx.wait_for(|stop| *stop).await;

        shutdown_manager.shutdown_all().await;
        info!("Server shutdown complete");

        Ok(())
    }

    pub fn create_app(&self) -> Router {
        let mut app = Router::new()
            .nest(
                "/health",
                create_health_routes().with_state(self.health_service.clone()),
            )
            .merge(create_stats_routes().with_state(self.stats_service.clone()))
            .merge(create_bus_routes().with_state(self.store.clone()));

        if self.config.metrics.enabled {
            app = app.layer(middleware::from_fn(metrics::metrics_middleware));
        }
        if self.config.logging.log_request {
            app = app.layer(middleware::from_fn(request_response_logger));
        }
        app
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestServerBuilder;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_route_is_mounted() {
        let server = TestServerBuilder::new().build().await;
        let app = server.create_app();

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let server = TestServerBuilder::new().build().await;
        let app = server.create_app();

        let request = Request::builder()
            .uri("/nope")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_registers_cleanup_job() {
        let server = TestServerBuilder::new().build().await;
        let names: Vec<String> = server
            .jobs()
            .iter()
            .map(|job| job.name().to_string())
            .collect();
        assert_eq!(names, vec!["bus_cleanup"]);
    }

    #[tokio::test]
    async fn test_rejects_bad_time_zone() {
        let mut config = Config::default();
        config.timezone = "somewhere".to_string();
        let result = Server::with_store(config, Arc::new(crate::storage::MemoryDocumentStore::new()))
            .await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_background_start_and_shutdown() {
        let server = TestServerBuilder::new().build().await;
        server.start_background().await.unwrap();
        assert!(server.listener.is_running().await);

        let mut manager = ShutdownManager::new(Duration::from_secs(1));
        manager.register_server_components(&server, tokio::spawn(async {}));
        manager.shutdown_all().await;
        assert!(server.shutdown_coordinator.is_shutdown_requested());
        assert!(!server.listener.is_running().await);
    }
}
