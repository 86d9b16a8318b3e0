//! Embedded entry point of the persistence core.
//!
//! [`CorePersistence`] owns every component: the column store, the entity and graph managers, the
//! search index and the background pool they share.

mod config;
mod error;
mod persistence;

pub use config::CorePersistenceConfig;
pub use error::{Error, Result};
pub use persistence::CorePersistence;
