// jukebot-core/src/liveness.rs
//
// Unauthenticated keep-alive endpoint polled by the uptime monitor.

use std::net::SocketAddr;

use axum::{Router, http::StatusCode, routing::get};
use axum_server::{Handle, Server};
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::Error;

pub const ALIVE_BODY: &str = "alive";

pub fn liveness_router() -> Router {
    Router::new()
        .route("/", get(alive))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

async fn alive() -> (StatusCode, &'static str) {
    (StatusCode::OK, ALIVE_BODY)
}

/// Serves the liveness router on `0.0.0.0:port`. Send on the returned
/// sender (or drop it) to shut the server down gracefully.
pub async fn start_liveness_server(port: u16) -> Result<oneshot::Sender<()>, Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = liveness_router();

    let (shutdown_send, shutdown_recv) = oneshot::channel::<()>();
    let handle = Handle::new();
    let handle_clone = handle.clone();

    tokio::spawn(async move {
        let _ = shutdown_recv.await;
        handle_clone.graceful_shutdown(None);
    });

    let server = Server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service());

    info!("(Liveness) listening on http://{}", addr);
    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("(Liveness) server error: {}", e);
        }
        info!("(Liveness) server shut down.");
    });

    Ok(shutdown_send)
}
