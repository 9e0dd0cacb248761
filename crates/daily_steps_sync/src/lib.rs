//! Garmin Connect to Notion daily step synchronization.
//!
//! [`sync::StepSync`] drives one pass: [`auth`] produces a Garmin session,
//! the configured date window is fetched, and [`reconcile`] brings each
//! day's Notion row in line with at most one write.

pub mod auth;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod schema;
pub mod sync;
mod test_utils;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use sync::{StepSync, SyncReport};
