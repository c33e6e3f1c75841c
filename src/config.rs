use crate::{
    jobs::JobsConfig,
    reporting::ReportingConfig,
    server::config::{LoggingConfig, MetricsConfig, ServerConfig, ShutdownConfig},
    storage::StoreConfig,
};
use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use chrono_tz::Tz;
use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path};

const ENV_PREFIX: &str = "BUS_STATS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    /// IANA zone name or fixed UTC offset for the cleanup schedule and
    /// hour-of-day counters
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "Asia/Kolkata".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            store: StoreConfig::default(),
            reporting: ReportingConfig::default(),
            jobs: JobsConfig::default(),
            metrics: MetricsConfig::default(),
            shutdown: ShutdownConfig::default(),
            timezone: default_timezone(),
        }
    }
}

/// Time zone the service schedules jobs and buckets hours in
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServiceTimeZone {
    Fixed(FixedOffset),
    Named(Tz),
}

impl ServiceTimeZone {
    /// `instant` as wall-clock time in this zone
    pub fn localize(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            ServiceTimeZone::Fixed(offset) => instant.with_timezone(offset),
            ServiceTimeZone::Named(tz) => instant.with_timezone(tz).fixed_offset(),
        }
    }

    /// Hour of day (0-23) of `instant` in this zone
    pub fn hour_at(&self, instant: DateTime<Utc>) -> u32 {
        self.localize(instant).hour()
    }
}

impl fmt::Display for ServiceTimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceTimeZone::Fixed(offset) => write!(f, "{}", offset),
            ServiceTimeZone::Named(tz) => write!(f, "{}", tz.name()),
        }
    }
}

/// Parse a time zone given as `UTC`, a fixed offset (`+05:30`, `-0800`) or
/// an IANA name (`Asia/Kolkata`)
pub fn parse_time_zone(value: &str) -> Result<ServiceTimeZone, ConfigError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
        return Ok(ServiceTimeZone::Fixed(Utc.fix()));
    }

    if let Ok(offset) = trimmed.parse::<FixedOffset>() {
        return Ok(ServiceTimeZone::Fixed(offset));
    }

    trimmed
        .parse::<Tz>()
        .map(ServiceTimeZone::Named)
        .map_err(|e| {
            ConfigError::Message(format!(
                "Invalid timezone '{}': expected an IANA name such as Asia/Kolkata \
                 or a UTC offset such as +05:30 ({})",
                value, e
            ))
        })
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(config::Config::try_from(&Config::default())?);

        if Path::new("config.yaml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        builder = builder.add_source(Self::environment());

        Self::finish(builder.build()?.try_deserialize()?)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(config::Config::try_from(&Config::default())?);

        if path.as_ref().exists() {
            builder = builder.add_source(File::from(path.as_ref()));
        }

        builder = builder.add_source(Self::environment());

        Self::finish(builder.build()?.try_deserialize()?)
    }

    /// The configured time zone
    pub fn time_zone(&self) -> Result<ServiceTimeZone, ConfigError> {
        parse_time_zone(&self.timezone)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
    }

    /// Reject settings that would only fail later at runtime
    fn finish(config: Config) -> Result<Self, ConfigError> {
        config.time_zone()?;
        if config.jobs.bus_cleanup.retention_hours == 0 {
            return Err(ConfigError::Message(
                "jobs.bus_cleanup.retention_hours must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }
}
