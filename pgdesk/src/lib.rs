//! # pgdesk
//!
//! A PostgreSQL administration API, mountable as an Axum router and served on
//! a local address by the `pgdesk-server` shell.
//!
//! ## Features
//!
//! - Saved connections with connection testing
//! - Live schema discovery: schemas, tables, columns, keys, indexes and relationships
//! - Row browsing with validated filters and sorts, plus row insert, update and delete
//! - Raw SQL execution with `:name`, `$name` and `?` parameters
//! - Query builder, SQL formatter and column value pattern detection
//! - Saved queries, query history, export and index recommendations
//!
//! ## Security Warning
//!
//! **This is a local tool!**
//!
//! - No authentication/authorization built-in
//! - Raw query execution allows full database access
//! - Should never be exposed on a public network
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use pgdesk::{PgDeskLayer, Stores, ViewerOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = ViewerOptions {
//!         base_path: "/pgdesk".to_string(),
//!         ..ViewerOptions::default()
//!     };
//!
//!     let app: Router = Router::new()
//!         .route("/", get(|| async { "Hello, World!" }))
//!         .merge(PgDeskLayer::postgres(options, Stores::in_memory(500)).into_router());
//!
//!     // Serve the application...
//! }
//! ```

// Public modules
pub mod api;
pub mod cache;
pub mod connections;
pub mod database;
pub mod error;
pub mod export;
pub mod frontend;
pub mod layer;
pub mod options;
pub mod patterns;
pub mod recommendations;
pub mod schema;
pub mod sql;
pub mod store;

// Public exports
pub use error::ApiError;
pub use layer::PgDeskLayer;
pub use options::ViewerOptions;
pub use schema::{ColumnInfo, ForeignKey, IndexInfo, TableInfo, TableSchema};
pub use store::{StoreError, Stores};

// Re-export database providers
pub use database::{DatabaseError, DatabaseProvider, PostgresFactory, PostgresProvider, ProviderFactory};

// Error type
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
