//! Metrics hook for connector submissions.

/// Records blockchain submissions made by a connector.
pub trait Metrics: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// A transaction was sent to `location` invoking `method`.
    fn blockchain_transaction(&self, location: &str, method: &str);

    /// A read-only query was sent to `location` for `method`.
    fn blockchain_query(&self, location: &str, method: &str);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn is_enabled(&self) -> bool {
        false
    }

    fn blockchain_transaction(&self, _location: &str, _method: &str) {}

    fn blockchain_query(&self, _location: &str, _method: &str) {}
}
