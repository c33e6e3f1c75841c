use crate::{jobs::JobScheduler, reporting::WriteReactionListener};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    signal,
    sync::{Mutex, RwLock, watch},
    task::JoinHandle,
    time::timeout,
};
use tracing::{error, info};

/// Graceful shutdown coordinator
#[derive(Clone)]
pub struct ShutdownCoordinator {
    shutdown_requested: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Get a receiver that flips to `true` once shutdown starts
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Relaxed)
    }

    /// Initiate graceful shutdown; later calls are no-ops
    pub fn initiate_shutdown(&self) {
        if self
            .shutdown_requested
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            info!("Initiating graceful shutdown...");
            self.shutdown_tx.send_replace(true);
        }
    }

    /// Wait for SIGINT or SIGTERM, then initiate shutdown
    pub async fn wait_for_shutdown_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C signal");
            },
            _ = terminate => {
                info!("Received terminate signal");
            },
        }

        self.initiate_shutdown();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for components that need graceful shutdown
#[async_trait::async_trait]
pub trait GracefulShutdown {
    fn name(&self) -> &str;

    async fn shutdown(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Shuts registered components down one after another, in registration order
pub struct ShutdownManager {
    components: Vec<Box<dyn GracefulShutdown + Send + Sync>>,
    timeout_duration: Duration,
}

impl ShutdownManager {
    pub fn new(timeout_duration: Duration) -> Self {
        Self {
            components: Vec::new(),
            timeout_duration,
        }
    }

    pub fn register<T>(&mut self, component: T)
    where
        T: GracefulShutdown + Send + Sync + 'static,
    {
        self.components.push(Box::new(component));
    }

    /// Register the server's components: HTTP first so no write arrives
    /// after reactions stop, then jobs, then write reactions.
    /// Store handles are released when the last `Arc` drops.
    pub fn register_server_components(
        &mut self,
        server: &crate::server::Server,
        http_task: JoinHandle<()>,
    ) {
        self.register(HttpServerShutdown::new(
            server.shutdown_coordinator.clone(),
            http_task,
        ));
        self.register(JobSchedulerShutdown::new(server.job_scheduler.clone()));
        self.register(ReactionListenerShutdown::new(server.listener.clone()));
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    pub async fn shutdown_all(&self) {
        info!("Shutting down {} components...", self.components.len());

        for component in &self.components {
            let component_name = component.name();

            match timeout(self.timeout_duration, component.shutdown()).await {
                Ok(Ok(())) => {
                    info!("Successfully shut down component: {}", component_name);
                }
                Ok(Err(e)) => {
                    error!("Error shutting down component {}: {}", component_name, e);
                }
                Err(_) => {
                    error!("Timeout shutting down component: {}", component_name);
                }
            }
        }

        info!("Shutdown complete");
    }
}

/// Stops accepting connections and waits for in-flight requests to finish
pub struct HttpServerShutdown {
    coordinator: Arc<ShutdownCoordinator>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HttpServerShutdown {
    pub fn new(coordinator: Arc<ShutdownCoordinator>, task: JoinHandle<()>) -> Self {
        Self {
            coordinator,
            task: Mutex::new(Some(task)),
        }
    }
}

#[async_trait::async_trait]
impl GracefulShutdown for HttpServerShutdown {
    fn name(&self) -> &str {
        "HTTP Server"
    }

    async fn shutdown(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // axum's graceful shutdown waits on the coordinator
        self.coordinator.initiate_shutdown();
        if let Some(task) = self.task.lock().await.take() {
            task.await?;
        }
        Ok(())
    }
}

/// Stops scheduled jobs so no cleanup starts during shutdown
pub struct JobSchedulerShutdown {
    job_scheduler: Arc<RwLock<JobScheduler>>,
}

impl JobSchedulerShutdown {
    pub fn new(job_scheduler: Arc<RwLock<JobScheduler>>) -> Self {
        Self { job_scheduler }
    }
}

#[async_trait::async_trait]
impl GracefulShutdown for JobSchedulerShutdown {
    fn name(&self) -> &str {
        "Job Scheduler"
    }

    async fn shutdown(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.job_scheduler.write().await.stop().await;
        Ok(())
    }
}

/// Stops taking bus write events and drains queued and in-flight reactions
pub struct ReactionListenerShutdown {
    listener: Arc<WriteReactionListener>,
}

impl ReactionListenerShutdown {
    pub fn new(listener: Arc<WriteReactionListener>) -> Self {
        Self { listener }
    }
}

#[async_trait::async_trait]
impl GracefulShutdown for ReactionListenerShutdown {
    fn name(&self) -> &str {
        "Write Reactions"
    }

    async fn shutdown(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.listener.stop().await;
        Ok(())
    }
}
