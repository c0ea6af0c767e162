//! Tracing/logging setup shared by the three service binaries.

/// Initialize process-wide observability (tracing/logging) for the
/// named service.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init(service: &str) {
    tracing::init(service);
}

/// Tracing configuration (filters, layers).
pub mod tracing;
