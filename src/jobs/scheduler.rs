use super::{Job, JobsConfig};
use crate::{config::ServiceTimeZone, error::AppError};
use chrono::{DateTime, FixedOffset, Utc};
use cron::Schedule;
use std::{str::FromStr, sync::Arc};
use tokio::{
    sync::{RwLock, broadcast, watch},
    task::JoinHandle,
    time::{Duration, sleep},
};
use tracing::{error, info, warn};

/// Job scheduler that runs each job at the fire times of its cron schedule,
/// evaluated in the service time zone
pub struct JobScheduler {
    config: JobsConfig,
    time_zone: ServiceTimeZone,
    handles: Arc<RwLock<Vec<JoinHandle<()>>>>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_coordinator: Option<watch::Receiver<bool>>,
}

impl JobScheduler {
    pub fn new(config: JobsConfig, time_zone: ServiceTimeZone) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            config,
            time_zone,
            handles: Arc::new(RwLock::new(Vec::new())),
            shutdown_tx,
            shutdown_coordinator: None,
        }
    }

    /// Create JobScheduler with graceful shutdown integration
    pub fn with_shutdown_coordinator(
        config: JobsConfig,
        time_zone: ServiceTimeZone,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let mut scheduler = Self::new(config, time_zone);
        scheduler.shutdown_coordinator = Some(shutdown_rx);
        scheduler
    }

    /// Start the job scheduler with registered jobs
    pub async fn start(&mut self, jobs: Vec<Arc<dyn Job>>) -> Result<(), AppError> {
        if !self.config.enabled {
            info!("Job scheduler disabled in configuration");
            return Ok(());
        }

        info!("Starting job scheduler with {} jobs", jobs.len());

        let mut handles = self.handles.write().await;
        for job in jobs {
            let handle = self.spawn_job_with_schedule(job)?;
            handles.push(handle);
        }

        info!("Job scheduler started successfully");
        Ok(())
    }

    /// Stop the job scheduler and all running jobs
    pub async fn stop(&mut self) {
        info!("Stopping job scheduler...");

        // Nobody listening just means no job was started
        if self.shutdown_tx.send(()).is_err() {
            info!("No scheduled jobs to signal");
        }

        // Wait for all jobs to complete
        let mut handles = self.handles.write().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                error!("Job handle failed during shutdown: {}", e);
            }
        }

        info!("Job scheduler stopped");
    }

    /// Number of job loops currently spawned
    pub async fn running_jobs(&self) -> usize {
        self.handles.read().await.len()
    }

    /// Next fire time of a job in the scheduler's time zone
    pub fn next_run(&self, job_name: &str) -> Result<DateTime<FixedOffset>, AppError> {
        let schedule = parse_schedule(&self.get_schedule_for_job(job_name)?)?;
        next_fire_time(&schedule, self.time_zone)
    }

    /// Spawn a job with its configured schedule
    fn spawn_job_with_schedule(&self, job: Arc<dyn Job>) -> Result<JoinHandle<()>, AppError> {
        let schedule = parse_schedule(&self.get_schedule_for_job(job.name())?)?;
        let time_zone = self.time_zone;

        let job_name = job.name().to_string();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut coordinator_rx = self.shutdown_coordinator.clone();

        let handle = tokio::spawn(async move {
            info!("Job '{}' scheduled in time zone {}", job_name, time_zone);

            loop {
                let wait = match duration_until_next(&schedule, time_zone) {
                    Ok(wait) => wait,
                    Err(e) => {
                        error!("Job '{}' cannot be scheduled: {}", job_name, e);
                        break;
                    }
                };

                tokio::select! {
                    _ = sleep(wait) => {
                        info!("Executing job '{}'", job_name);

                        // A failed run is retried at the next fire time
                        match job.execute().await {
                            Ok(result) => {
                                if result.success {
                                    info!("Job '{}' completed: {}", job_name, result.message);
                                } else {
                                    warn!("Job '{}' failed: {}", job_name, result.message);
                                }
                            }
                            Err(e) => {
                                error!("Job '{}' execution error: {}", job_name, e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Job '{}' received internal shutdown signal", job_name);
                        break;
                    }
                    _ = async {
                        if let Some(ref mut coord_rx) = coordinator_rx {
                            let _ = coord_rx.wait_for(|stop| *stop).await;
                        }
                    }, if coordinator_rx.is_some() => {
                        info!("Job '{}' received global shutdown signal", job_name);
                        break;
                    }
                }
            }

            info!("Job '{}' stopped", job_name);
        });

        Ok(handle)
    }

    /// Get the schedule configuration for a specific job
    fn get_schedule_for_job(&self, job_name: &str) -> Result<String, AppError> {
        match job_name {
            "bus_cleanup" => Ok(self.config.bus_cleanup.schedule.clone()),
            _ => Err(AppError::Internal(format!("Unknown job: {job_name}"))),
        }
    }
}

/// Accept the classic 5-field form (min hour day month dow) by adding a
/// leading seconds field; 6- and 7-field expressions pass through
pub fn normalize_cron(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

fn parse_schedule(expression: &str) -> Result<Schedule, AppError> {
    let normalized = normalize_cron(expression);
    Schedule::from_str(&normalized).map_err(|e| {
        AppError::Internal(format!("Invalid cron expression '{expression}': {e}"))
    })
}

fn next_fire_time(
    schedule: &Schedule,
    time_zone: ServiceTimeZone,
) -> Result<DateTime<FixedOffset>, AppError> {
    let now = Utc::now();
    // Named zones are walked in their own rules so DST shifts move the fire time
    let next = match time_zone {
        ServiceTimeZone::Fixed(offset) => schedule.after(&now.with_timezone(&offset)).next(),
        ServiceTimeZone::Named(tz) => schedule
            .after(&now.with_timezone(&tz))
            .next()
            .map(|next| next.fixed_offset()),
    };

    next.ok_or_else(|| {
        AppError::Internal("No upcoming execution found for cron expression".to_string())
    })
}

/// Time left until the schedule next fires
fn duration_until_next(
    schedule: &Schedule,
    time_zone: ServiceTimeZone,
) -> Result<Duration, AppError> {
    let next_execution = next_fire_time(schedule, time_zone)?;

    (next_execution.with_timezone(&Utc) - Utc::now())
        .to_std()
        .map_err(|e| AppError::Internal(format!("Failed to convert duration: {e}")))
}
