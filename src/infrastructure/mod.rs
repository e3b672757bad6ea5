//! Infrastructure: storage backends, gateway client, event bus and shared primitives.
pub mod cache;
pub mod events;
pub mod gateway;
pub mod locks;
pub mod memory;
pub mod postgres;

pub use cache::ReadThroughCache;
pub use events::EventBus;
pub use gateway::{HttpGateway, UnconfiguredGateway};
pub use locks::{KeyGuard, KeyedLocks};
pub use memory::{MemoryCatalog, MemorySeed, MemoryStore};
pub use postgres::PgStore;
