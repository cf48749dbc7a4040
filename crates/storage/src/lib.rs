//! Persistence for the progress and certification engine.
//!
//! [`repository`] holds the contracts and the [`repository::Storage`] bundle;
//! [`memory`] and [`sqlite`] are the two backends.

pub mod memory;
pub mod repository;
pub mod sqlite;

pub use repository::{Storage, StorageError};
