//! Link lifecycle metrics
//!
//! Monotonic counters for connection opens, closes, reads and writes, keyed
//! by AMS net id so several links in one process aggregate per device. The
//! registry is an explicit object injected into each connection rather than
//! process-global state, which keeps it mockable in tests.

use std::sync::Arc;

use prometheus::{IntCounterVec, Registry};

/// Counter registry shared by all device links in a process
#[derive(Clone)]
pub struct LinkMetrics {
    registry: Arc<Registry>,
    open_events: IntCounterVec,
    close_events: IntCounterVec,
    read_events: IntCounterVec,
    write_events: IntCounterVec,
}

impl LinkMetrics {
    /// Create a metrics registry with all link counters registered
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        let open_events = IntCounterVec::new(
            prometheus::opts!(
                "ads_client_connection_open_events",
                "Number of times the connection was opened"
            ),
            &["ams_net_id"],
        )
        .expect("Failed to create open_events metric");

        let close_events = IntCounterVec::new(
            prometheus::opts!(
                "ads_client_connection_close_events",
                "Number of times the connection was closed"
            ),
            &["ams_net_id"],
        )
        .expect("Failed to create close_events metric");

        let read_events = IntCounterVec::new(
            prometheus::opts!(
                "ads_client_connection_read_events",
                "Number of times a variable was read"
            ),
            &["ams_net_id"],
        )
        .expect("Failed to create read_events metric");

        let write_events = IntCounterVec::new(
            prometheus::opts!(
                "ads_client_connection_write_events",
                "Number of times a variable was written"
            ),
            &["ams_net_id"],
        )
        .expect("Failed to create write_events metric");

        registry
            .register(Box::new(open_events.clone()))
            .expect("Failed to register open_events");
        registry
            .register(Box::new(close_events.clone()))
            .expect("Failed to register close_events");
        registry
            .register(Box::new(read_events.clone()))
            .expect("Failed to register read_events");
        registry
            .register(Box::new(write_events.clone()))
            .expect("Failed to register write_events");

        Self {
            registry,
            open_events,
            close_events,
            read_events,
            write_events,
        }
    }

    pub fn record_open(&self, ams_net_id: &str) {
        self.open_events.with_label_values(&[ams_net_id]).inc();
    }

    pub fn record_close(&self, ams_net_id: &str) {
        self.close_events.with_label_values(&[ams_net_id]).inc();
    }

    pub fn record_read(&self, ams_net_id: &str) {
        self.read_events.with_label_values(&[ams_net_id]).inc();
    }

    pub fn record_write(&self, ams_net_id: &str) {
        self.write_events.with_label_values(&[ams_net_id]).inc();
    }

    pub fn opens(&self, ams_net_id: &str) -> u64 {
        self.open_events.with_label_values(&[ams_net_id]).get()
    }

    pub fn closes(&self, ams_net_id: &str) -> u64 {
        self.close_events.with_label_values(&[ams_net_id]).get()
    }

    pub fn reads(&self, ams_net_id: &str) -> u64 {
        self.read_events.with_label_values(&[ams_net_id]).get()
    }

    pub fn writes(&self, ams_net_id: &str) -> u64 {
        self.write_events.with_label_values(&[ams_net_id]).get()
    }

    /// Underlying registry, for an exporter to gather from
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for LinkMetrics {
    fn default() -> Self {
        Self::new()
    }
}
