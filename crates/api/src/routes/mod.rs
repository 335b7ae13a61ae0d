pub mod ops;
pub mod sagas;
pub mod workflows;
