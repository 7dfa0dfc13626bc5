//! HTTP server bootstrap.

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::router::build_router;
use crate::state::AppState;

/// Bind and serve the API until the process is stopped.
///
/// # Errors
///
/// Returns an [`std::io::Error`] if binding or serving fails.
pub async fn serve(bind_addr: &str, state: Arc<AppState>) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "gridcast API listening");
    axum::serve(listener, build_router(state)).await
}
