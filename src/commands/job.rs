use crate::{
    Config,
    jobs::{BusCleanupJob, JobScheduler},
    storage::StoreFactory,
};
use chrono::Utc;
use clap::Subcommand;
use tracing::info;

#[derive(Subcommand)]
pub enum JobCommand {
    /// Run a specific job type once
    Run {
        #[arg(help = "Job type to run (cleanup)")]
        job_type: String,

        #[arg(
            long,
            help = "Dry run - show what would be done without actually doing it"
        )]
        dry_run: bool,
    },

    /// List available job types and their next run
    List,
}

pub async fn handle_job_command(
    command: JobCommand,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        JobCommand::Run { job_type, dry_run } => {
            info!("Running job: {} (dry_run: {})", job_type, dry_run);

            match job_type.as_str() {
                "cleanup" => {
                    let store = StoreFactory::create_backend(&config.store).await?;
                    let job = BusCleanupJob::new(store, config.jobs.bus_cleanup.retention_hours);
                    let now = Utc::now();

                    if dry_run {
                        let stale = job.stale_ids_at(now).await?;
                        info!(
                            "DRY RUN: Would delete {} bus records older than {} hours",
                            stale.len(),
                            config.jobs.bus_cleanup.retention_hours
                        );
                        for bus_id in stale {
                            println!("  {}", bus_id);
                        }
                        return Ok(());
                    }

                    let count = job.run_at(now).await?;
                    info!("Successfully cleaned up {} bus records", count);
                }

                _ => {
                    return Err(
                        format!("Unknown job type: {}. Available: cleanup", job_type).into(),
                    );
                }
            }
        }

        JobCommand::List => {
            let scheduler = JobScheduler::new(config.jobs.clone(), config.time_zone()?);
            let next_run = scheduler.next_run("bus_cleanup")?;

            println!("Available job types:");
            println!(
                "  cleanup    - Delete bus records older than {} hours",
                config.jobs.bus_cleanup.retention_hours
            );
            println!(
                "               schedule '{}' ({}), next run {}",
                config.jobs.bus_cleanup.schedule,
                if config.jobs.enabled {
                    "enabled"
                } else {
                    "disabled"
                },
                next_run.to_rfc3339()
            );
            println!();
            println!("Examples:");
            println!("  bus-stats job run cleanup --dry-run");
            println!("  bus-stats job run cleanup");
        }
    }

    Ok(())
}
