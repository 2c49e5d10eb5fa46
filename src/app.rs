use std::net::SocketAddr;

use anyhow::Context;
use axum::{http::Request, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, info_span};

use crate::{auth, state::AppState};

/// `/api` routes over the selected user store. Request spans carry the
/// backend so logs show which store served them.
pub fn build_app(state: AppState) -> Router {
    let backend = state.store.backend();
    let api = Router::new()
        .route("/health", get(health))
        .merge(auth::router());

    Router::new()
        .nest("/api", api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(move |req: &Request<_>| {
            info_span!("http_request", method = %req.method(), uri = %req.uri(), store = %backend)
        }))
}

async fn health() -> &'static str {
    "ok"
}

pub async fn serve(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
