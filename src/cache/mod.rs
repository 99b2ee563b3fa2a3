//! Cache module - prepared statement reuse

pub mod statement_cache;

pub use statement_cache::{CacheStats, CachedStatement, Checkout, StatementCache};
