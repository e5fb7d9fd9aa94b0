use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use omis_core::{Clock, CoreError, SqliteRequestStore};
use tokio::net::TcpListener;

mod handlers;
mod html;

pub use html::escape_html;

/// Shared handler state. Every request opens its own short-lived store
/// connection on a blocking thread.
#[derive(Clone)]
pub struct WebState {
    store_path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl WebState {
    pub fn new(store_path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store_path: store_path.into(),
            clock,
        }
    }

    pub(crate) async fn with_store<T, F>(&self, operation: F) -> Result<T, CoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteRequestStore) -> Result<T, CoreError> + Send + 'static,
    {
        let path = self.store_path.clone();
        let clock = Arc::clone(&self.clock);
        tokio::task::spawn_blocking(move || {
            let mut store = SqliteRequestStore::open_with_clock(&path, clock)?;
            operation(&mut store)
        })
        .await
        .map_err(|error| CoreError::Persistence(format!("store task failed: {error}")))?
    }
}

pub fn build_router(state: WebState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/requests", get(handlers::list_requests))
        .route("/new", get(handlers::new_request))
        .route("/add_request", post(handlers::add_request))
        .with_state(state)
}

pub async fn serve(
    listener: TcpListener,
    state: WebState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(address) = listener.local_addr() {
        tracing::info!(%address, "web interface listening");
    }
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
