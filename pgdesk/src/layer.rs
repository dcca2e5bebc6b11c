//! PgDeskLayer - Main Axum integration layer
//!
//! This module provides the entry point for mounting pgdesk into an Axum
//! application or serving it from the desktop shell.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::api::{create_api_router, AppState, SharedState};
use crate::database::{PostgresFactory, ProviderFactory};
use crate::frontend::create_frontend_router;
use crate::options::ViewerOptions;
use crate::store::Stores;

/// Main layer for mounting pgdesk into an Axum application
///
/// # Example
///
/// ```rust,no_run
/// use axum::Router;
/// use pgdesk::{PgDeskLayer, Stores, ViewerOptions};
///
/// # async fn example() {
/// let options = ViewerOptions {
///     base_path: "/pgdesk".to_string(),
///     ..ViewerOptions::default()
/// };
/// let viewer = PgDeskLayer::postgres(options, Stores::in_memory(500));
/// let app: Router = Router::new().merge(viewer.into_router());
/// # }
/// ```
pub struct PgDeskLayer<F: ProviderFactory> {
    state: SharedState<F>,
}

impl<F: ProviderFactory> PgDeskLayer<F> {
    /// Create a new layer from options, a provider factory and the stores
    pub fn new(options: ViewerOptions, factory: F, stores: Stores) -> Self {
        Self {
            state: Arc::new(AppState::new(options, factory, stores)),
        }
    }

    /// Shared handler state
    pub fn state(&self) -> SharedState<F> {
        self.state.clone()
    }

    /// Convert into an Axum Router that can be merged
    ///
    /// The returned router includes:
    /// - API endpoints at `{base_path}/api/*`
    /// - Front-end serving at `{base_path}/`
    /// - Permissive CORS middleware
    pub fn into_router(self) -> Router {
        let base_path = self.state.options.normalized_base_path();
        let frontend_dir = self.state.options.frontend_dir.clone();

        let api_router = create_api_router(self.state);
        let frontend_router = create_frontend_router(base_path.clone(), frontend_dir);

        let router = Router::new().nest(&format!("{}/api", base_path), api_router);

        // Axum refuses to nest at the root, so an empty base path merges instead
        let router = if base_path.is_empty() {
            router.merge(frontend_router)
        } else {
            router.nest(&base_path, frontend_router)
        };

        router.layer(CorsLayer::permissive())
    }
}

impl PgDeskLayer<PostgresFactory> {
    /// Create a layer backed by PostgreSQL
    pub fn postgres(options: ViewerOptions, stores: Stores) -> Self {
        let factory = PostgresFactory::new(&options);
        Self::new(options, factory, stores)
    }

    /// Create a PostgreSQL layer whose stores live in `data_dir`
    ///
    /// Without a data directory everything is kept in memory.
    pub async fn postgres_with_storage(
        options: ViewerOptions,
        data_dir: Option<&Path>,
        history_limit: usize,
    ) -> crate::Result<Self> {
        let stores = match data_dir {
            Some(directory) => {
                info!(data_dir = %directory.display(), "Opening pgdesk stores");
                Stores::open(directory, history_limit).await?
            }
            None => {
                info!("No data directory configured, keeping stores in memory");
                Stores::in_memory(history_limit)
            }
        };
        Ok(Self::postgres(options, stores))
    }
}
