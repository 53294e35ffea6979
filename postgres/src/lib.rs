//! `PostgreSQL` entity store for the RSVP capacity registry.
//!
//! This crate provides a production [`EntityStore`](rsvp_core::EntityStore)
//! backed by a single `events` table. It uses sqlx with:
//!
//! - One conditional `UPDATE ... RETURNING` per state transition
//! - `CHECK` constraints mirroring the occupancy invariants
//! - A GIN index on `participants` for the relevance predicate
//! - Connection pooling
//!
//! # Example
//!
//! ```no_run
//! use rsvp_postgres::{PostgresConfig, PostgresEntityStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PostgresConfig::new("postgres://localhost/rsvp").max_connections(20);
//!     let store = PostgresEntityStore::connect(&config).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod store;

pub use config::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_CONNECTIONS, DEFAULT_MIN_CONNECTIONS,
    DEFAULT_WATERMARK_LAG, PostgresConfig,
};
pub use store::PostgresEntityStore;
