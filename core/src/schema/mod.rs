//! Schema binding and versioning
//!
//! This module turns static record declarations into live tables and
//! keeps their schema versions in step with the code.

mod binder;
mod version;

pub use binder::RecordStore;
pub use version::VersionTracker;
