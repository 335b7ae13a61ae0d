pub mod types;

pub use types::{EntityId, SagaId};
