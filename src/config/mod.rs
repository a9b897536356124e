//! Session configuration
//!
//! Serde-backed settings with per-section defaults, loaded from an optional
//! JSON file.

mod schema;
mod store;

pub use schema::*;
pub use store::{load_config, load_or_default};
