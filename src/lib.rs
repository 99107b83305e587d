//! # HFR - Huge File Reader
//!
//! HFR gives random access to the lines of text files too large to load
//! into memory. The first open of a file streams it once and persists a
//! table of line start offsets; later opens validate that table against a
//! fingerprint of the file and reuse it.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`index`] - Encoding detection, offset table building/persistence and the [`LineIndex`] façade
//! - [`cache`] - Bounded recency cache of decoded lines
//! - [`search`] - Cancellable background text search
//! - [`events`] - Last-value-wins event channel between the engine and its consumer
//! - [`utils`] - Configuration, positional I/O and offset encoding
//!
//! ## Quick Start
//!
//! ```ignore
//! use hfr::index::{LineIndex, LineIndexConfig};
//! use hfr::utils::AppConfig;
//!
//! let index = LineIndex::new(LineIndexConfig::from(&AppConfig::load()?));
//! index.open("/var/log/huge.log")?;
//!
//! // Rows become readable as soon as they are indexed
//! if let Some(text) = index.line(0) {
//!     println!("{}", text);
//! }
//!
//! index.wait();
//! println!("{} rows", index.rows());
//! ```
//!
//! ## Persistence
//!
//! Each source file gets two files in the index directory, named by a hash
//! of its lower-cased absolute path:
//!
//! 1. **Offset table** - one little-endian u64 per line
//! 2. **Sidecar** - JSON record with row/column counts, encoding and fingerprints
//!
//! A fast sampled fingerprint rejects stale tables at open time; a full
//! SHA-512 of the content is checked in the background afterwards.

pub mod cache;
pub mod error;
pub mod events;
pub mod index;
pub mod search;
pub mod utils;

pub use error::{HfrError, Result};
pub use index::LineIndex;
