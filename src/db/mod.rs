//! Durable store access (MongoDB)

pub mod mongo;

pub use mongo::{BulkInsertOutcome, DurableStore};
