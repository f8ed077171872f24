//! HTTP ingress surface.
//!
//! Exposes the wire methods under `/v1/<method>` plus /health and /metrics.
//! Errors leave as a stable `{code, reason, message}` triple.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use eyre::Result;
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use sqlx::postgres::PgPool;

use crate::auth;
use crate::config::Config;
use crate::error::AppError;
use crate::poller::ChainPoller;

mod handlers;

/// Rows per page on all list endpoints.
const PAGE_SIZE: i64 = 20;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub poller: Arc<ChainPoller>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "code": self.code(),
            "reason": self.reason(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Resolve the bearer token on a request to a user id.
fn bearer_user(state: &AppState, headers: &HeaderMap) -> Result<i64, AppError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Forbidden("missing bearer token".to_string()))?;
    let claims = auth::verify_token(token, &state.config.auth.jwt_secret)?;
    Ok(claims.user_id)
}

/// The scheduler-only guard on the deposit trigger.
fn require_scheduler(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let secret = headers
        .get("x-scheduler-secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if secret != state.config.auth.scheduler_secret {
        return Err(AppError::Forbidden("scheduler secret required".to_string()));
    }
    Ok(())
}

fn page_bounds(page: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    (PAGE_SIZE, (page - 1) * PAGE_SIZE)
}

/// User-visible timestamps are shifted +8h from stored UTC.
fn display_time(t: DateTime<Utc>) -> String {
    (t + Duration::hours(8)).format("%Y-%m-%d %H:%M:%S").to_string()
}

async fn health() -> &'static str {
    "OK"
}

async fn metrics_text() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let _ = encoder.encode(&metric_families, &mut buffer);
    (
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .route("/v1/eth_authorize", post(handlers::eth_authorize))
        .route("/v1/deposit", post(handlers::deposit))
        .route("/v1/user_info", post(handlers::user_info))
        .route("/v1/reward_list", post(handlers::reward_list))
        .route(
            "/v1/recommend_reward_list",
            post(handlers::recommend_reward_list),
        )
        .route("/v1/fee_reward_list", post(handlers::fee_reward_list))
        .route("/v1/withdraw_list", post(handlers::withdraw_list))
        .route("/v1/withdraw", post(handlers::withdraw))
        .with_state(state)
}

/// Serve the API until the process shuts down.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server started");
    crate::metrics::UP.set(1.0);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(None), (PAGE_SIZE, 0));
        assert_eq!(page_bounds(Some(1)), (PAGE_SIZE, 0));
        assert_eq!(page_bounds(Some(3)), (PAGE_SIZE, 40));
        assert_eq!(page_bounds(Some(0)), (PAGE_SIZE, 0));
        assert_eq!(page_bounds(Some(-5)), (PAGE_SIZE, 0));
    }

    #[test]
    fn test_display_time_shifts_eight_hours() {
        let t = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 3, 1, 20, 30, 0).unwrap();
        assert_eq!(display_time(t), "2026-03-02 04:30:00");
    }
}
