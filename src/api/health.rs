use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::time::Instant;

use crate::api::AppState;
use crate::error::Result;
use crate::services::members;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub mode: String,
    pub timestamp: String,
    pub version: String,
    pub dependencies: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub ledger: ServiceHealth,
    pub bot_api: ServiceHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    pub response_time_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn mode(state: &AppState) -> &'static str {
    if state.ledger_ready() {
        "full"
    } else {
        "limited"
    }
}

pub async fn banner(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "mode": mode(&state),
    }))
}

async fn timed<T, E, F>(check: F) -> ServiceHealth
where
    F: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let result = check.await;
    let response_time_ms = start.elapsed().as_millis();

    match result {
        Ok(_) => ServiceHealth {
            status: "healthy".to_string(),
            response_time_ms,
            error: None,
        },
        Err(e) => ServiceHealth {
            status: "unhealthy".to_string(),
            response_time_ms,
            error: Some(e.to_string()),
        },
    }
}

/// Returns 200 if the ledger and the Bot API both answer, 503 otherwise.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = Instant::now();

    let ledger = timed(state.ledger.ping()).await;
    let bot_api = timed(state.notifier.transport().probe()).await;

    let all_healthy = ledger.status == "healthy" && bot_api.status == "healthy";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "unhealthy" }.to_string(),
        mode: mode(&state).to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dependencies: DependencyStatus { ledger, bot_api },
    };

    tracing::info!(
        status = %response.status,
        duration_ms = start.elapsed().as_millis(),
        "Health check completed"
    );

    (status_code, Json(response))
}

/// Membership and payment counters, or 503 while the bot runs in limited mode.
pub async fn status(State(state): State<AppState>) -> Result<Response> {
    if !state.ledger_ready() {
        return Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "mode": "limited" })),
        )
            .into_response());
    }

    let stats = members::stats(&state).await?;
    Ok(Json(stats).into_response())
}

#[cfg(test)]
mod tests {
    use crate::api::router;
    use crate::ledger::SETTINGS_SHEET;
    use crate::testing::{register, test_context};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_dependencies() {
        let (ctx, _store, _transport) = test_context().await;

        let (status, body) = get(router(ctx), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["mode"], "full");
        assert_eq!(body["dependencies"]["ledger"]["status"], "healthy");
        assert_eq!(body["dependencies"]["bot_api"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_status_and_limited_mode() {
        let (ctx, _store, _transport) = test_context().await;
        register(&ctx, 7, "Aida").await;

        let (status, body) = get(router(ctx.clone()), "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_members"], 1);
        assert_eq!(body["active_members"], 1);

        ctx.set_ledger_ready(false);
        let (status, body) = get(router(ctx.clone()), "/status").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["mode"], "limited");

        let (_, body) = get(router(ctx), "/").await;
        assert_eq!(body["service"], "gymkeeper");
        assert_eq!(body["mode"], "limited");
    }

    #[tokio::test]
    async fn test_unhealthy_ledger() {
        let (ctx, store, _transport) = test_context().await;
        store.drop_sheet(SETTINGS_SHEET);

        let (status, body) = get(router(ctx), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["dependencies"]["ledger"]["status"], "unhealthy");
    }
}
