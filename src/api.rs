use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::engine::Monitor;
use crate::error::MonitorError;
use crate::models::{AlertEntry, SiteStatus, Summary};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<MonitorError> for ApiError {
    fn from(err: MonitorError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct SiteRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct UrlQuery {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct SettingsRequest {
    pub check_interval: Option<u64>,
    pub timeout: Option<u64>,
}

type AppState = State<Arc<Monitor>>;

pub async fn list_sites(State(monitor): AppState) -> Json<Vec<SiteStatus>> {
    Json(monitor.list().await)
}

pub async fn add_site(
    State(monitor): AppState,
    Json(req): Json<SiteRequest>,
) -> Result<(StatusCode, Json<SiteStatus>), ApiError> {
    let status = monitor.register(&req.url).await?;
    Ok((StatusCode::CREATED, Json(status)))
}

pub async fn remove_site(
    State(monitor): AppState,
    Query(query): Query<UrlQuery>,
) -> Result<StatusCode, ApiError> {
    if monitor.deregister(&query.url).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("{} is not monitored", query.url)))
    }
}

pub async fn get_site(
    State(monitor): AppState,
    Query(query): Query<UrlQuery>,
) -> Result<Json<SiteStatus>, ApiError> {
    monitor
        .get(&query.url)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("{} is not monitored", query.url)))
}

pub async fn check_site(
    State(monitor): AppState,
    Query(query): Query<UrlQuery>,
) -> Result<StatusCode, ApiError> {
    if monitor.get(&query.url).await.is_none() {
        return Err(ApiError::NotFound(format!("{} is not monitored", query.url)));
    }
    monitor.force_check(&query.url);
    Ok(StatusCode::ACCEPTED)
}

pub async fn list_alerts(State(monitor): AppState) -> Json<Vec<AlertEntry>> {
    Json(monitor.list_alerts().await)
}

pub async fn clear_alerts(State(monitor): AppState) -> StatusCode {
    monitor.clear_alerts().await;
    StatusCode::NO_CONTENT
}

pub async fn get_summary(State(monitor): AppState) -> Json<Summary> {
    Json(monitor.summary().await)
}

pub async fn start_monitor(State(monitor): AppState) -> Json<Summary> {
    monitor.start();
    Json(monitor.summary().await)
}

pub async fn stop_monitor(State(monitor): AppState) -> Json<Summary> {
    monitor.stop().await;
    Json(monitor.summary().await)
}

pub async fn update_settings(
    State(monitor): AppState,
    Json(req): Json<SettingsRequest>,
) -> Result<Json<Summary>, ApiError> {
    if let Some(secs) = req.check_interval {
        monitor.set_interval(secs)?;
    }
    if let Some(secs) = req.timeout {
        monitor.set_timeout(secs)?;
    }
    Ok(Json(monitor.summary().await))
}

pub fn create_router(monitor: Arc<Monitor>) -> Router {
    Router::new()
        .route("/api/sites", get(list_sites).post(add_site).delete(remove_site))
        .route("/api/site", get(get_site))
        .route("/api/sites/check", post(check_site))
        .route("/api/alerts", get(list_alerts).delete(clear_alerts))
        .route("/api/monitor", get(get_summary))
        .route("/api/monitor/start", post(start_monitor))
        .route("/api/monitor/stop", post(stop_monitor))
        .route("/api/monitor/settings", put(update_settings))
        .with_state(monitor)
}

pub async fn start_server(port: u16, monitor: Arc<Monitor>) -> anyhow::Result<()> {
    let app = create_router(monitor);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API port {}", port))?;
    info!("Command API: http://localhost:{}/api/monitor", addr.port());
    axum::serve(listener, app).await.context("API server failed")?;
    Ok(())
}
