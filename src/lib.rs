pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod reporting;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod storage;
pub mod test_utils;

pub use config::Config;
pub use server::Server;
