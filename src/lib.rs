//! Playlist duplicate finder - shared modules for the CLI and tests.
//!
//! The comparison core (`normalize`, `variation`, `matcher`, `selection`) is
//! pure; `spotify`, `cache` and `service` carry the I/O around it.

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod selection;
pub mod service;
pub mod spotify;
pub mod variation;

pub use matcher::find_duplicates;
pub use normalize::normalize_signature;
pub use selection::{group_by_variation, Selection};
pub use variation::classify_variation;
