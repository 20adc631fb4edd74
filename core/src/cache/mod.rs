//! Named caches and windowed fetch
//!
//! This module provides the cache indirection layer: a shared
//! position→key table that decouples a view's ordering from the backing
//! table's physical storage, plus the sparse in-memory window that serves
//! repeated paged reads without re-querying.

mod view_cache;
mod window;

pub use view_cache::ViewCache;
