//! Device-link provider seam
//!
//! The wire-level ADS protocol (name resolution, marshaling, framing) is an
//! external capability. This module defines the trait that capability must
//! expose plus the value types exchanged through it. The service never
//! implements protocol framing itself; it composes over an [`AdsTransport`]
//! object (see `connection.rs`).

use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default ADS port of the first TwinCAT 3 PLC runtime
pub const PORT_TC3_PLC1: u16 = 851;

/// A single PLC-resident value of a primitive or homogeneous array type.
///
/// Equality is exact; any numeric rounding is the provider's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlcValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    BoolArray(Vec<bool>),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
}

impl PlcValue {
    /// Element count for array variants, 1 otherwise
    pub fn len(&self) -> usize {
        match self {
            Self::BoolArray(v) => v.len(),
            Self::IntArray(v) => v.len(),
            Self::FloatArray(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            Self::BoolArray(_) | Self::IntArray(_) | Self::FloatArray(_)
        )
    }
}

impl From<bool> for PlcValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PlcValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PlcValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PlcValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Named collection of device-resident values exchanged in one read or
/// write call. Insertion order is preserved for batch reporting; equality
/// is order-independent (set semantics), which is what batch verification
/// compares with.
pub type VariableSet = IndexMap<String, PlcValue>;

/// Device identity returned by the introspection query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_name: String,
    pub major: u8,
    pub minor: u8,
    pub build: u16,
}

/// One entry of the device symbol table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub symbol_type: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Capability surface of the external device-link provider.
///
/// Implementations own the physical transport to one device. Errors must
/// use the service taxonomy so the retry layer can tell transient failures
/// (timeout, busy, unreachable) from permanent ones (unknown symbol).
#[async_trait]
pub trait AdsTransport: Send + Sync {
    /// Whether the underlying transport is currently open
    fn is_open(&self) -> bool;

    /// Open the transport; implementations may treat this as idempotent
    async fn open(&mut self) -> Result<()>;

    /// Physically close the transport
    async fn close(&mut self) -> Result<()>;

    /// Set the per-operation timeout governing how long a single attempt
    /// may block
    fn set_timeout(&mut self, timeout: Duration);

    async fn read_by_name(&mut self, name: &str) -> Result<PlcValue>;

    async fn write_by_name(&mut self, name: &str, value: PlcValue) -> Result<()>;

    /// Read several variables in one round trip; fails as a whole
    async fn read_list_by_name(&mut self, names: &[String]) -> Result<VariableSet>;

    /// Write several variables in one round trip; fails as a whole
    async fn write_list_by_name(&mut self, variables: &VariableSet) -> Result<()>;

    /// Read a fixed-length homogeneous array variable
    async fn read_array_by_name(&mut self, name: &str, count: usize) -> Result<PlcValue>;

    /// Write a homogeneous array variable; length is taken from the value
    async fn write_array_by_name(&mut self, name: &str, values: PlcValue) -> Result<()>;

    async fn read_device_info(&mut self) -> Result<DeviceInfo>;

    async fn get_all_symbols(&mut self) -> Result<Vec<SymbolInfo>>;
}
