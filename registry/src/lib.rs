//! # RSVP Registry
//!
//! Services on top of `rsvp-core`:
//!
//! - [`CapacityService`]: register, unregister, resize and cancel-or-delete,
//!   plus create, get and paginated listing
//! - [`DeltaSyncEngine`]: watermark + known-id delta synchronisation
//! - [`LocalReplica`]: a client cache that consumes sync responses
//!
//! Both services take an `Arc<dyn EntityStore>` and an `Arc<dyn Clock>`;
//! [`open_store`] builds the store selected by [`Config`].
//!
//! ## Example
//!
//! ```
//! use rsvp_registry::{CapacityService, DeltaSyncEngine, LocalReplica};
//! use rsvp_core::environment::SystemClock;
//! use rsvp_core::types::NewEvent;
//! use rsvp_testing::InMemoryEntityStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryEntityStore::new());
//! let clock = Arc::new(SystemClock);
//! let capacity = CapacityService::new(store.clone(), clock.clone());
//! let sync = DeltaSyncEngine::new(store, clock);
//!
//! let event = capacity.create(NewEvent::new("Climbing", 4)).await?;
//! capacity.register(&event.id, &"zoe".into()).await?;
//!
//! let mut replica = LocalReplica::new();
//! let response = sync.sync(&"zoe".into(), replica.sync_request()).await?;
//! replica.apply(response);
//! assert!(replica.get(&event.id).is_some());
//! # Ok(())
//! # }
//! ```

pub mod capacity;
pub mod config;
pub mod metrics;
pub mod replica;
pub mod sync;

pub use capacity::{CapacityService, MAX_ATTEMPTS};
pub use config::{Config, ConfigError, StoreBackend};
pub use replica::{ApplyReport, LocalReplica, PendingUnregister};
pub use sync::DeltaSyncEngine;

use rsvp_core::entity_store::{EntityStore, StoreError};
use rsvp_postgres::PostgresEntityStore;
use rsvp_testing::InMemoryEntityStore;
use std::sync::Arc;

/// Open the store selected by `config`, running migrations for `PostgreSQL`.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the database is unreachable, a
/// migration fails, or the postgres backend has no connection settings.
pub async fn open_store(config: &Config) -> Result<Arc<dyn EntityStore>, StoreError> {
    match config.store {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory entity store");
            Ok(Arc::new(InMemoryEntityStore::new()))
        },
        StoreBackend::Postgres => {
            let pg = config.postgres.as_ref().ok_or_else(|| {
                StoreError::Database(ConfigError::MissingDatabaseUrl.to_string())
            })?;
            let store = PostgresEntityStore::connect(pg).await?;
            store.migrate().await?;
            tracing::info!("Using PostgreSQL entity store");
            Ok(Arc::new(store))
        },
    }
}
