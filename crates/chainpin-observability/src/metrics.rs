//! OpenTelemetry implementation of the connector [`Metrics`] hook.
//!
//! Instruments are created on the global meter provider; without an
//! installed SDK they are no-ops.

use opentelemetry::{
    global,
    metrics::{Counter, Meter},
    KeyValue,
};

use chainpin_core::Metrics;

/// Counters for blockchain submissions.
#[derive(Clone)]
pub struct OtelMetrics {
    enabled: bool,
    transactions: Counter<u64>,
    queries: Counter<u64>,
}

impl OtelMetrics {
    pub fn new(meter: &Meter, enabled: bool) -> Self {
        Self {
            enabled,
            transactions: meter
                .u64_counter("chainpin.blockchain_transactions")
                .with_description("Transactions submitted to a blockchain connector")
                .init(),
            queries: meter
                .u64_counter("chainpin.blockchain_queries")
                .with_description("Read-only queries sent to a blockchain connector")
                .init(),
        }
    }

    /// Instruments on the global `chainpin` meter.
    pub fn global(enabled: bool) -> Self {
        Self::new(&global::meter("chainpin"), enabled)
    }
}

fn attributes(location: &str, method: &str) -> [KeyValue; 2] {
    [
        KeyValue::new("location", location.to_string()),
        KeyValue::new("method", method.to_string()),
    ]
}

impl Metrics for OtelMetrics {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn blockchain_transaction(&self, location: &str, method: &str) {
        self.transactions.add(1, &attributes(location, method));
    }

    fn blockchain_query(&self, location: &str, method: &str) {
        self.queries.add(1, &attributes(location, method));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_enabled_flag() {
        assert!(OtelMetrics::global(true).is_enabled());
        assert!(!OtelMetrics::global(false).is_enabled());
    }

    #[test]
    fn records_without_sdk() {
        let metrics = OtelMetrics::global(true);
        metrics.blockchain_transaction("0x1234", "pinBatch");
        metrics.blockchain_query("firefly", "NetworkVersion");
    }

    #[test]
    fn tags_location_and_method() {
        let [location, method] = attributes("firefly", "PinBatch");
        assert_eq!(location.key.as_str(), "location");
        assert_eq!(method.value.as_str(), "PinBatch");
    }
}
