//! HTTP handlers

use super::error::ApiError;
use super::ws::WsTransport;
use super::AppState;
use crate::events::RequestEnvelope;
use crate::relay::Completion;
use crate::session::Session;
use crate::store::{Item, ItemStore, NewItem, StoreError};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Page size used when `limit` is omitted
pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: String,
    pub llm_configured: bool,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// Run a store call on the blocking pool
async fn with_store<T, F>(store: &ItemStore, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ItemStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = store.clone();
    Ok(tokio::task::spawn_blocking(move || op(&store)).await??)
}

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": state.settings.app_name,
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_ok = with_store(&state.store, |store| Ok(store.ping()))
        .await
        .unwrap_or(false);

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "capstack-api".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if database_ok { "ok" } else { "unavailable" }.to_string(),
        llm_configured: state.settings.llm_configured(),
    })
}

pub async fn list_items(
    State(state): State<AppState>,
    page: Result<Query<Pagination>, QueryRejection>,
) -> Result<Json<Vec<Item>>, ApiError> {
    let Query(page) = page?;
    let items = with_store(&state.store, move |store| store.list(page.skip, page.limit)).await?;
    Ok(Json(items))
}

pub async fn create_item(
    State(state): State<AppState>,
    item: Result<Json<NewItem>, JsonRejection>,
) -> Result<(StatusCode, Json<Item>), ApiError> {
    let Json(item) = item?;
    let created = with_store(&state.store, move |store| store.create(item)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_item(
    State(state): State<AppState>,
    item_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Item>, ApiError> {
    let Path(item_id) = item_id?;
    let item = with_store(&state.store, move |store| store.get(item_id)).await?;
    Ok(Json(item))
}

pub async fn delete_item(
    State(state): State<AppState>,
    item_id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(item_id) = item_id?;
    with_store(&state.store, move |store| store.delete(item_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn complete(
    State(state): State<AppState>,
    envelope: Result<Json<RequestEnvelope>, JsonRejection>,
) -> Result<Json<Completion>, ApiError> {
    let Json(envelope) = envelope?;
    let request = envelope.into_request()?;
    let completion = state.relay.complete(&request).await?;
    tracing::info!(
        model = %completion.model,
        response_len = completion.content.len(),
        "Completion served"
    );
    Ok(Json(completion))
}

/// Upgrade to a WebSocket and hand the connection to a session
pub async fn stream(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        Session::new(state.relay.clone(), WsTransport::new(socket))
            .run()
            .await;
    })
    .into_response()
}
