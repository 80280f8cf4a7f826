//! Resilient cyclic ADS client service for Beckhoff-style PLCs
//!
//! Polls and writes PLC variables over device links that survive transient
//! faults: bounded retries with a fatal-exit policy on exhaustion, optional
//! connection retention, write verification by read-back, and bounded
//! exchange buffers between reader and writer workers. The wire protocol
//! itself lives behind the [`transport::AdsTransport`] seam; this crate
//! supplies the lifecycle, resilience and scheduling around it.

pub mod address;
pub mod buffer;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod service;
pub mod simulator;
pub mod transport;

pub use address::AmsNetId;
pub use buffer::{DataBuffer, OverflowPolicy};
pub use client::{AdsReaderClient, AdsWriterClient, ProcessDataFn};
pub use config::{AppConfig, WorkerConfig, WorkerRole};
pub use connection::{AdsConnection, LinkOptions};
pub use error::{AdsClientError, Result};
pub use metrics::LinkMetrics;
pub use retry::{ExitHandler, RetryExecutor};
pub use service::{build_group, GroupBuildOptions, TransportFactory, WorkerGroup};
pub use simulator::{SimulatedLink, SimulatedPlc};
pub use transport::{
    AdsTransport, DeviceInfo, PlcValue, SymbolInfo, VariableSet, PORT_TC3_PLC1,
};
