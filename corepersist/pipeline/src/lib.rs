//! Lazy, cursor-aware read pipelines.
//!
//! A pipeline is a chain of [`stage::ReadStage`]s pulled by a terminal collector. Nothing is read
//! from storage until the collector pulls. Every result carries the [`result::EdgePath`] that led
//! to it, from which the collector builds the cursor of the next page.

pub mod collect;
pub mod config;
pub mod context;
pub mod cursor;
pub mod error;
pub mod index;
pub mod result;
pub mod stage;
