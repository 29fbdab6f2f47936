//! fouracc-srv library - FourAcc web service
//!
//! Clients upload acceleration recordings, get back the spectrum plots of
//! every axis and can download the coefficient tables until their identity
//! expires.

use axum::extract::DefaultBodyLimit;
use axum::Router;
use fouracc_common::dispatch::Dispatcher;
use fouracc_common::session::SessionStore;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Identity and job store
    pub store: SessionStore,
    /// Per-axis processing
    pub dispatcher: Dispatcher,
    /// Request body limit in bytes
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Create new application state
    pub fn new(store: SessionStore, dispatcher: Dispatcher, max_upload_bytes: usize) -> Self {
        Self {
            store,
            dispatcher,
            max_upload_bytes,
        }
    }
}

/// Build application router
///
/// Every route passes through the identity middleware.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;

    Router::new()
        .merge(api::ui_routes())
        .merge(api::run_routes())
        .merge(api::download_routes())
        .merge(api::remove_routes())
        .merge(api::health_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::identity_middleware,
        ))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
