use super::{
    BusDocument, BusRecord, DailyStats, DayKey, DocumentStore, StatsIncrement, StorageResult,
    StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client, RedisResult, aio::ConnectionManager};
use std::{collections::HashMap, future::Future, time::Duration};
use tokio::time::timeout;

const TOTAL_REPORTS_FIELD: &str = "totalReports";
const DATE_FIELD: &str = "date";
const LAST_UPDATED_FIELD: &str = "lastUpdated";
const BY_BUS_PREFIX: &str = "reportsByBus";
const BY_STATUS_PREFIX: &str = "reportsByStatus";
const BY_HOUR_PREFIX: &str = "reportsByHour";

/// Redis document store implementation
///
/// Layout under the configured prefix:
/// - `bus:<id>` JSON-encoded bus record
/// - `buses:by_timestamp` sorted set of bus ids scored by report timestamp
/// - `stats:daily-<date>` hash of field-path counters
pub struct RedisDocumentStore {
    connection: ConnectionManager,
    key_prefix: String,
    command_timeout: Duration,
}

impl RedisDocumentStore {
    pub async fn new(
        redis_url: &str,
        key_prefix: &str,
        command_timeout_seconds: u64,
    ) -> StorageResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Connection(format!("Redis client error: {}", e)))?;

        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Connection(format!("Redis connection error: {}", e)))?;

        Ok(Self {
            connection,
            key_prefix: key_prefix.to_string(),
            command_timeout: Duration::from_secs(command_timeout_seconds),
        })
    }

    fn bus_key(&self, bus_id: &str) -> String {
        format!("{}bus:{}", self.key_prefix, bus_id)
    }

    fn timestamp_index_key(&self) -> String {
        format!("{}buses:by_timestamp", self.key_prefix)
    }

    fn daily_key(&self, day: DayKey) -> String {
        format!("{}stats:{}", self.key_prefix, day.document_id())
    }

    /// Run one Redis round trip under the command timeout
    async fn run<T, F>(&self, operation: &str, fut: F) -> StorageResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        timeout(self.command_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(format!("Redis {} timed out", operation)))?
            .map_err(|e| StoreError::Redis(format!("Redis {} error: {}", operation, e)))
    }

    fn decode_bus(raw: &str) -> StorageResult<BusRecord> {
        serde_json::from_str(raw)
            .map_err(|e| StoreError::Serialization(format!("Deserialization error: {}", e)))
    }

    /// Rebuild daily statistics from the hash's field-path entries
    fn decode_daily_stats(fields: HashMap<String, String>) -> StorageResult<DailyStats> {
        let mut stats = DailyStats::default();

        for (field, value) in fields {
            match field.as_str() {
                DATE_FIELD => stats.date = value,
                LAST_UPDATED_FIELD => {
                    let parsed = DateTime::parse_from_rfc3339(&value).map_err(|e| {
                        StoreError::InvalidData(format!("Bad {} value '{}': {}", field, value, e))
                    })?;
                    stats.last_updated = Some(parsed.with_timezone(&Utc));
                }
                TOTAL_REPORTS_FIELD => stats.total_reports = parse_counter(&field, &value)?,
                _ => {
                    let Some((group, key)) = field.split_once('.') else {
                        continue;
                    };
                    let count = parse_counter(&field, &value)?;
                    match group {
                        BY_BUS_PREFIX => {
                            stats.reports_by_bus.insert(key.to_string(), count);
                        }
                        BY_STATUS_PREFIX => {
                            stats.reports_by_status.insert(key.to_string(), count);
                        }
                        BY_HOUR_PREFIX => {
                            let hour = key.parse::<u32>().map_err(|e| {
                                StoreError::InvalidData(format!("Bad hour field '{}': {}", field, e))
                            })?;
                            stats.reports_by_hour.insert(hour, count);
                        }
                        _ => {}
                    }
                }
            }
        }

        Ok(stats)
    }

    /// Remove every key under this store's prefix (useful for testing)
    pub async fn clear_all(&self) -> StorageResult<()> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}*", self.key_prefix);
        let keys: Vec<String> = self.run("KEYS", conn.keys(pattern)).await?;

        if !keys.is_empty() {
            let _: () = self.run("DEL", conn.del(keys)).await?;
        }
        Ok(())
    }
}

fn parse_counter(field: &str, value: &str) -> StorageResult<u64> {
    value
        .parse::<u64>()
        .map_err(|e| StoreError::InvalidData(format!("Bad counter '{}' = '{}': {}", field, value, e)))
}

#[async_trait]
impl DocumentStore for RedisDocumentStore {
    async fn put_bus(&self, bus_id: &str, record: &BusRecord) -> StorageResult<()> {
        let serialized = serde_json::to_string(record)
            .map_err(|e| StoreError::Serialization(format!("Serialization error: {}", e)))?;
        let mut conn = self.connection.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(self.bus_key(bus_id), serialized)
            .ignore()
            .zadd(self.timestamp_index_key(), bus_id, record.timestamp)
            .ignore();

        self.run("PUT bus", pipe.query_async::<()>(&mut conn)).await
    }

    async fn get_bus(&self, bus_id: &str) -> StorageResult<Option<BusRecord>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = self.run("GET", conn.get(self.bus_key(bus_id))).await?;

        raw.as_deref().map(Self::decode_bus).transpose()
    }

    async fn delete_bus(&self, bus_id: &str) -> StorageResult<bool> {
        let mut conn = self.connection.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(self.bus_key(bus_id))
            .zrem(self.timestamp_index_key(), bus_id)
            .ignore();

        let (deleted,): (u64,) = self
            .run("DELETE bus", pipe.query_async(&mut conn))
            .await?;
        Ok(deleted > 0)
    }

    async fn list_buses(&self) -> StorageResult<Vec<BusDocument>> {
        let mut conn = self.connection.clone();
        let ids: Vec<String> = self
            .run("ZRANGE", conn.zrange(self.timestamp_index_key(), 0, -1))
            .await?;

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| self.bus_key(id)).collect();
        let values: Vec<Option<String>> = self
            .run(
                "MGET",
                redis::cmd("MGET").arg(&keys).query_async(&mut conn),
            )
            .await?;

        // Index members whose record vanished between the two reads are skipped
        ids.into_iter()
            .zip(values)
            .filter_map(|(id, raw)| raw.map(|raw| (id, raw)))
            .map(|(id, raw)| Self::decode_bus(&raw).map(|record| BusDocument { id, record }))
            .collect()
    }

    async fn find_buses_older_than(&self, cutoff_ms: i64) -> StorageResult<Vec<String>> {
        let mut conn = self.connection.clone();
        let exclusive_max = format!("({}", cutoff_ms);

        self.run(
            "ZRANGEBYSCORE",
            conn.zrangebyscore(self.timestamp_index_key(), "-inf", exclusive_max),
        )
        .await
    }

    async fn delete_buses(&self, bus_ids: &[String]) -> StorageResult<Vec<String>> {
        if bus_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection.clone();

        // One DEL per key so the reply says which records existed
        let mut pipe = redis::pipe();
        pipe.atomic();
        for bus_id in bus_ids {
            pipe.del(self.bus_key(bus_id));
        }
        pipe.zrem(self.timestamp_index_key(), bus_ids).ignore();

        let deleted: Vec<u64> = self
            .run("batch DELETE", pipe.query_async(&mut conn))
            .await?;

        Ok(bus_ids
            .iter()
            .zip(deleted)
            .filter(|(_, count)| *count > 0)
            .map(|(bus_id, _)| bus_id.clone())
            .collect())
    }

    async fn merge_daily_stats(&self, increment: &StatsIncrement) -> StorageResult<()> {
        let mut conn = self.connection.clone();
        let key = self.daily_key(increment.day);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset(&key, DATE_FIELD, increment.day.date_string())
            .ignore()
            .hset(&key, LAST_UPDATED_FIELD, Utc::now().to_rfc3339())
            .ignore()
            .hincr(&key, TOTAL_REPORTS_FIELD, 1)
            .ignore()
            .hincr(&key, format!("{}.{}", BY_BUS_PREFIX, increment.bus_id), 1)
            .ignore()
            .hincr(
                &key,
                format!("{}.{}", BY_STATUS_PREFIX, increment.status_key),
                1,
            )
            .ignore()
            .hincr(&key, format!("{}.{}", BY_HOUR_PREFIX, increment.hour), 1)
            .ignore();

        self.run("MERGE stats", pipe.query_async::<()>(&mut conn))
            .await
    }

    async fn get_daily_stats(&self, day: DayKey) -> StorageResult<Option<DailyStats>> {
        let mut conn = self.connection.clone();
        let fields: HashMap<String, String> =
            self.run("HGETALL", conn.hgetall(self.daily_key(day))).await?;

        if fields.is_empty() {
            return Ok(None);
        }
        Self::decode_daily_stats(fields).map(Some)
    }

    async fn health_check(&self) -> StorageResult<()> {
        let mut conn = self.connection.clone();
        let _: String = self
            .run("PING", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
