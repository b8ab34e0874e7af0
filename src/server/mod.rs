//! Server-side code for VoIP Relay
//!
//! This module contains all backend functionality:
//! - User directory (JSON file)
//! - Catapult API integration (calls, bridges, provisioning)
//! - Call-event orchestration
//! - API routes

pub mod bridging;
pub mod catapult;
pub mod config;
pub mod directory;
pub mod provisioning;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::models::{CallEvent, CreateUserRequest};
use bridging::{DispatchError, EventDispatcher};
use catapult::{CatapultClient, Domain};
use config::{user_url, Config};
use directory::{DirectoryError, UserDirectory};
use provisioning::ProvisioningApi;

/// Application state shared across all routes
pub struct AppState {
    pub config: Config,
    pub directory: Arc<UserDirectory>,
    pub dispatcher: Arc<EventDispatcher>,
    pub provisioning: Arc<dyn ProvisioningApi>,
    /// SIP domain new endpoints are registered under
    pub domain: Domain,
}

/// Create the Axum router with all API routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health_check))

        // User routes
        .route("/users", post(create_user))
        .route("/users/{user_name}", get(get_user).put(update_user).delete(delete_user))

        // Provider call events
        .route("/users/{user_name}/callback", post(handle_callback))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

// Health check
async fn health_check() -> &'static str {
    "OK"
}

// ============== User Routes ==============

async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if let Err(e) = req.validate() {
        tracing::warn!("Rejected user creation: {}", e);
        return Err(StatusCode::BAD_REQUEST);
    }
    if state.directory.contains(&req.user_name).await {
        return Err(StatusCode::CONFLICT);
    }

    tracing::info!("Creating user {}", req.user_name);
    let user = provisioning::provision_user(
        state.provisioning.as_ref(),
        &req,
        &state.domain,
        &state.config.callback_url(&req.user_name),
        &state.config.number_search_state,
    )
    .await
    .map_err(|e| {
        tracing::error!("Failed to provision user {}: {}", req.user_name, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let view = user.to_view();
    match state.directory.insert(user).await {
        Ok(()) => {}
        Err(DirectoryError::AlreadyExists(name)) => {
            tracing::warn!("User {} was created concurrently", name);
            return Err(StatusCode::CONFLICT);
        }
        Err(e) => {
            tracing::error!("Failed to save user {}: {}", req.user_name, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    let location = user_url(&state.config.base_url, &req.user_name, None);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(view)))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_name): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    state
        .directory
        .get(&user_name)
        .await
        .map(|user| Json(user.to_view()))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(user_name): Path<String>,
    Json(patch): Json<Map<String, Value>>,
) -> StatusCode {
    match state.directory.update(&user_name, patch).await {
        Ok(_) => StatusCode::OK,
        Err(DirectoryError::NotFound(_)) => StatusCode::NOT_FOUND,
        Err(DirectoryError::Json(e)) => {
            tracing::warn!("Rejected update of {}: {}", user_name, e);
            StatusCode::BAD_REQUEST
        }
        Err(e) => {
            tracing::error!("Failed to update user {}: {}", user_name, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(user_name): Path<String>,
) -> StatusCode {
    let user = match state.directory.remove(&user_name).await {
        Ok(user) => user,
        Err(DirectoryError::NotFound(_)) => return StatusCode::NOT_FOUND,
        Err(e) => {
            tracing::error!("Failed to delete user {}: {}", user_name, e);
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    match provisioning::release_number(state.provisioning.as_ref(), &user.phone_number).await {
        Ok(true) => {
            tracing::info!("Released number {} of {}", user.phone_number, user_name);
            StatusCode::OK
        }
        Ok(false) => StatusCode::OK,
        Err(e) => {
            tracing::error!("Failed to release number {}: {}", user.phone_number, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// ============== Provider Webhook ==============

async fn handle_callback(
    State(state): State<Arc<AppState>>,
    Path(user_name): Path<String>,
    body: Bytes,
) -> StatusCode {
    let Some(user) = state.directory.get(&user_name).await else {
        tracing::warn!("Callback error: {}", DispatchError::UnresolvedUser(user_name));
        return StatusCode::NOT_FOUND;
    };

    // Acknowledge malformed events too, so the provider does not retry them
    let event: CallEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Ignoring malformed callback for {}: {}", user_name, e);
            return StatusCode::OK;
        }
    };

    tracing::info!(
        "Received {} event for {} on {}",
        event.event_type, user_name, event.call_id
    );
    state.dispatcher.spawn(event, user);

    StatusCode::OK
}

/// Run the server
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let client = CatapultClient::new(
        &config.api_base_url,
        config.user_id.clone(),
        config.api_token.clone(),
        config.api_secret.clone(),
        config.gateway_timeout,
    )?;

    let directory = UserDirectory::load(&config.users_path).await?;
    let domain = provisioning::ensure_domain(&client, &config.domain).await?;

    let dispatcher = EventDispatcher::new(
        Arc::new(client.clone()),
        config.base_url.clone(),
        config.gateway_timeout,
    );

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState {
        config,
        directory: Arc::new(directory),
        dispatcher: Arc::new(dispatcher),
        provisioning: Arc::new(client),
        domain,
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
