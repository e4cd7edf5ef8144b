//! Control endpoint for replacing the tracked entities.
//!
//! `POST /a` takes a JSON array of strings and swaps it into the
//! [`TrackedEntityStore`]. `GET /a` returns the current list; every other
//! method on `/a` is treated as an update, like `POST`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::tracked::{TrackedEntities, TrackedEntityStore};

/// Route of the control operation.
pub const CONTROL_PATH: &str = "/a";

/// Body returned after a successful update.
pub const ACKNOWLEDGEMENT: &str = "gg fam";

/// Build the control router over `store`.
pub fn router(store: Arc<TrackedEntityStore>) -> Router {
    Router::new()
        .route(CONTROL_PATH, get(list_tracked).fallback(update_tracked))
        .layer(middleware::from_fn(log_requests))
        .with_state(store)
}

/// Serve the control router until the listener fails.
pub async fn serve(listener: TcpListener, store: Arc<TrackedEntityStore>) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr().ok(), "Control endpoint listening");
    axum::serve(
        listener,
        router(store).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

async fn log_requests(request: Request, next: Next) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    info!(
        %client,
        method = %request.method(),
        path = %request.uri().path(),
        "Control request"
    );
    next.run(request).await
}

async fn update_tracked(State(store): State<Arc<TrackedEntityStore>>, body: Bytes) -> Response {
    let names: Vec<String> = match serde_json::from_slice(&body) {
        Ok(names) => names,
        Err(e) => {
            warn!(error = %e, "Cannot decode tracked entity list");
            return (
                StatusCode::BAD_REQUEST,
                format!("expected a JSON array of strings: {e}"),
            )
                .into_response();
        }
    };

    info!(entities = ?names, "Updating tracked entities");
    store.replace(names);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        ACKNOWLEDGEMENT,
    )
        .into_response()
}

async fn list_tracked(State(store): State<Arc<TrackedEntityStore>>) -> Json<TrackedEntities> {
    Json(store.snapshot())
}
