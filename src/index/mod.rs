pub mod builder;
pub mod fingerprint;
pub mod lines;
pub mod sniff;
pub mod stats;
pub mod store;
pub mod types;

pub use builder::{BuildSummary, IndexBuilder, LiveCounters};
pub use lines::LineIndex;
pub use store::{IndexPaths, IndexStore};
pub use types::*;
