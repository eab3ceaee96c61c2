//! HTTP and WebSocket surface
//!
//! Routes:
//! - `GET /` and `GET /health`
//! - `/api/items` CRUD
//! - `POST /api/llm/complete`
//! - `GET /api/llm/stream` (WebSocket, one session per connection)

mod error;
mod handlers;
mod ws;

pub use error::ApiError;
pub use handlers::{HealthResponse, DEFAULT_PAGE_SIZE};
pub use ws::WsTransport;

use crate::auth::{ApiKeyGuard, API_KEY_HEADER};
use crate::config::Settings;
use crate::provider::ProviderAdapter;
use crate::relay::CompletionRelay;
use crate::store::ItemStore;
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub relay: Arc<CompletionRelay>,
    pub store: ItemStore,
    pub guard: ApiKeyGuard,
}

impl AppState {
    pub fn new(settings: Arc<Settings>, adapter: Arc<dyn ProviderAdapter>, store: ItemStore) -> Self {
        Self {
            relay: Arc::new(CompletionRelay::new(settings.clone(), adapter)),
            guard: ApiKeyGuard::new(settings.api_key.clone()),
            settings,
            store,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/items", get(handlers::list_items).post(handlers::create_item))
        .route(
            "/items/:item_id",
            get(handlers::get_item).delete(handlers::delete_item),
        )
        .route("/llm/complete", post(handlers::complete))
        .route("/llm/stream", get(handlers::stream))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.settings.cors_origins))
        .with_state(state)
}

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    state.guard.check(header, request.uri())?;
    Ok(next.run(request).await)
}

/// CORS for the configured origins, with credentials. `*` mirrors the caller.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::mirror_request()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Serve until `shutdown` is cancelled
pub async fn serve(
    state: AppState,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(
        %addr,
        env = state.settings.app_env.as_str(),
        auth = state.guard.enabled(),
        llm_configured = state.settings.llm_configured(),
        "Listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
