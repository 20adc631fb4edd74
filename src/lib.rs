/// Viewcache - a windowed, cache-backed relational view engine for SQLite
///
/// This is the root crate that provides workspace-level documentation.
/// Actual implementation is in the subcrates:
/// - `viewcache-core`: record binding, schema versioning, cache indirection,
///   windowed fetch, and incremental view synchronization

/// Returns the version of the package.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
