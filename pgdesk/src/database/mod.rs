//! Database abstraction layer
//!
//! Handlers only talk to [`DatabaseProvider`]; the PostgreSQL implementation
//! lives in [`postgres`].

pub mod arguments;
pub mod postgres;
pub mod traits;

pub use postgres::{PostgresFactory, PostgresProvider};
pub use traits::{DatabaseError, DatabaseProvider, ProviderFactory};
