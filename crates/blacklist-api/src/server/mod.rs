use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use axum::extract::{Path, Request, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::Method;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use contracts::{
    ApiError, BlacklistConfig, BlacklistSnapshot, EntityId, EntityRef, ErrorCode, ResourceDef,
    ResourceHash, RosterEntry, SessionStatus, StepReport, Tick, SCHEMA_VERSION_V1,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::{PersistenceError, SessionApi};

const MAX_STEPS_PER_REQUEST: u64 = 100_000;

include!("error.rs");
include!("state.rs");
include!("routes/world.rs");
include!("routes/blacklist.rs");
include!("routes/session.rs");
include!("util.rs");

/// Serves one session over HTTP. With `sqlite_path` set the session is
/// resumed from that file when it already holds `config.session_id`.
pub async fn serve(
    addr: SocketAddr,
    config: BlacklistConfig,
    sqlite_path: Option<PathBuf>,
) -> Result<(), ServerError> {
    let session = open_session(config, sqlite_path)?;
    let state = AppState::new(session);
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "blacklist server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/blacklist", get(get_blacklist).post(add_blacklist))
        .route("/api/v1/blacklist/debug", get(get_blacklist_debug))
        .route(
            "/api/v1/blacklist/{entity_id}/{resource_hash}",
            delete(remove_blacklist),
        )
        .route("/api/v1/entities", post(spawn_entity))
        .route("/api/v1/entities/{entity_id}/kill", post(kill_entity))
        .route("/api/v1/resources", post(define_resource))
        .route("/api/v1/step", post(step_session))
        .route("/api/v1/save", post(save_session))
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}
