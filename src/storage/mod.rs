//! Storage layer for visitrack - JSONL collections with in-memory caching.
//!
//! Provides the generic record storage used by the local site registry and visit
//! store. Each collection is one `<name>.jsonl` file under the data directory.

mod jsonl;
mod traits;

pub use jsonl::JsonlStorage;
pub use traits::{Filter, FilterOp, HasId, Storage};
