//! Durable persistence of saga execution state.
//!
//! A [`SagaRecord`] is the unit of truth for one saga execution: which
//! orchestrator produced it, which business entity it concerns, its current
//! state, a JSON snapshot of its input and intermediate results, and its
//! lifecycle timestamps. The [`SagaStore`] trait is the only write path;
//! orchestrators never keep authoritative state in process memory.
//!
//! Two implementations are provided: [`InMemorySagaStore`] for tests and the
//! self-contained demo server, and [`PostgresSagaStore`] for production.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use common::{EntityId, SagaId};
pub use error::{Result, SagaStoreError};
pub use memory::InMemorySagaStore;
pub use postgres::PostgresSagaStore;
pub use record::SagaRecord;
pub use store::SagaStore;
