//! Utility functions shared by the index, cache and search modules.
//!
//! ## Modules
//!
//! - [`app_data`] - Configuration file and index directory management
//! - [`encoding`] - Little-endian offset table encoding
//! - [`io`] - Positional reads and writes on shared file handles
//! - [`progress`] - Progress bar shim (no-op without the `progress` feature)

pub mod app_data;
pub mod encoding;
pub mod io;
pub mod progress;

pub use app_data::*;
pub use encoding::*;
