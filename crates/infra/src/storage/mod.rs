//! Transactional storage boundary.
//!
//! Every workflow step receives an explicit transaction handle from
//! [`Storage::begin`]; there is no ambient session. Two backends are provided:
//! an in-memory store for tests/dev and a Postgres store for production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{FaultPoint, InMemoryStorage, InMemoryTx};
pub use postgres::{PostgresStorage, PostgresTx};
pub use r#trait::{StockDecrement, Storage, StorageError, StorageTx};
