use crate::reporting::{StatsQueryService, StatsSnapshot};
use axum::{
    Json, Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::any,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    snapshot: StatsSnapshot,
    success: bool,
}

/// `/stats` accepts any method; preflight requests are answered by the CORS layer
pub fn create_stats_routes() -> Router<Arc<StatsQueryService>> {
    Router::new()
        .route("/stats", any(get_stats))
        .layer(middleware::from_fn(cors))
}

async fn get_stats(State(stats_service): State<Arc<StatsQueryService>>) -> Response {
    match stats_service.snapshot().await {
        Ok(snapshot) => Json(StatsResponse {
            snapshot,
            success: true,
        })
        .into_response(),
        Err(e) => {
            error!("Error getting stats: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to get statistics",
                    "success": false
                })),
            )
                .into_response()
        }
    }
}

/// Open CORS headers on every response; OPTIONS gets an empty 204
async fn cors(req: Request<Body>, next: Next) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );

    response
}
