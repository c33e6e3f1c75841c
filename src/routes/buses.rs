use crate::{
    error::AppError,
    storage::{BusRecord, DocumentStore},
};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::put,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

/// Status report sent by a bus
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusReport {
    #[serde(default)]
    pub status: serde_json::Value,
    #[serde(default)]
    pub status_text: Option<String>,
    /// Epoch milliseconds; defaults to the time the report is received
    #[serde(default)]
    pub timestamp: Option<i64>,
}

pub fn create_bus_routes() -> Router<Arc<dyn DocumentStore>> {
    Router::new().route(
        "/buses/{bus_id}",
        put(put_bus).get(get_bus).delete(delete_bus),
    )
}

async fn put_bus(
    State(store): State<Arc<dyn DocumentStore>>,
    Path(bus_id): Path<String>,
    Json(report): Json<BusReport>,
) -> Result<Json<BusRecord>, AppError> {
    if bus_id.trim().is_empty() {
        return Err(AppError::BadRequest("Bus id must not be blank".to_string()));
    }

    let record = BusRecord {
        status: report.status,
        status_text: report.status_text,
        timestamp: report
            .timestamp
            .unwrap_or_else(|| Utc::now().timestamp_millis()),
    };

    store.put_bus(&bus_id, &record).await?;
    Ok(Json(record))
}

async fn get_bus(
    State(store): State<Arc<dyn DocumentStore>>,
    Path(bus_id): Path<String>,
) -> Result<Json<BusRecord>, AppError> {
    store
        .get_bus(&bus_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Bus {}", bus_id)))
}

async fn delete_bus(
    State(store): State<Arc<dyn DocumentStore>>,
    Path(bus_id): Path<String>,
) -> Result<StatusCode, AppError> {
    if store.delete_bus(&bus_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Bus {}", bus_id)))
    }
}
