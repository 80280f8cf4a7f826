//! Device link lifecycle and variable access
//!
//! `AdsConnection` owns one transport handle to one device. It composes over
//! the provider rather than extending it: every public accessor follows
//! ensure-open, perform, conditionally-close, with the retain branch made
//! explicit in the release step. Lifecycle counters (opens, closes, reads,
//! writes) are recorded against the injected metrics registry, keyed by AMS
//! net id.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::address::AmsNetId;
use crate::error::{AdsClientError, Result};
use crate::metrics::LinkMetrics;
use crate::transport::{AdsTransport, DeviceInfo, PlcValue, SymbolInfo, VariableSet};

static CONNECTION_SEQ: AtomicU64 = AtomicU64::new(0);

/// Issue a unique `prefix-N` instance name from a monotonic counter
pub(crate) fn auto_name(prefix: &str, seq: &AtomicU64) -> String {
    format!("{}-{}", prefix, seq.fetch_add(1, Ordering::Relaxed) + 1)
}

/// Construction options for a device link
#[derive(Default)]
pub struct LinkOptions {
    /// Human-readable link name; auto-generated when omitted
    pub name: Option<String>,
    /// Honor logical close requests as no-ops, keeping the socket open
    /// until a forced close
    pub retain: bool,
    /// Per-operation transport timeout
    pub timeout: Option<Duration>,
}

/// One connection to one ADS device
pub struct AdsConnection {
    name: String,
    net_id: AmsNetId,
    net_id_label: String,
    ip_address: String,
    port: u16,
    retain: bool,
    retain_warned: AtomicBool,
    transport: Mutex<Box<dyn AdsTransport>>,
    metrics: LinkMetrics,
}

impl AdsConnection {
    /// Build a link over a provider transport. The AMS net id is validated
    /// here, before any network action; construction fails on a malformed
    /// id.
    pub fn new(
        mut transport: Box<dyn AdsTransport>,
        ams_net_id: &str,
        ip_address: impl Into<String>,
        port: u16,
        options: LinkOptions,
        metrics: LinkMetrics,
    ) -> Result<Self> {
        let net_id = AmsNetId::parse(ams_net_id)?;
        let name = options
            .name
            .unwrap_or_else(|| auto_name("connection", &CONNECTION_SEQ));

        info!("Creating ADS connection '{name}' to {net_id}:{port}");

        if let Some(timeout) = options.timeout {
            transport.set_timeout(timeout);
        }
        if options.retain {
            warn!(
                "'retain' is set. Connection {name} will remain open until explicitly force-closed."
            );
        }

        let net_id_label = net_id.to_string();
        Ok(Self {
            name,
            net_id,
            net_id_label,
            ip_address: ip_address.into(),
            port,
            retain: options.retain,
            retain_warned: AtomicBool::new(false),
            transport: Mutex::new(transport),
            metrics,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn net_id(&self) -> &AmsNetId {
        &self.net_id
    }

    pub fn retain(&self) -> bool {
        self.retain
    }

    /// Transport endpoint as `ip:port`
    pub fn connection_address(&self) -> String {
        format!("{}:{}", self.ip_address, self.port)
    }

    pub async fn is_open(&self) -> bool {
        self.transport.lock().await.is_open()
    }

    /// Set the per-operation timeout on the underlying transport
    pub async fn set_timeout(&self, timeout: Duration) {
        self.transport.lock().await.set_timeout(timeout);
    }

    /// Open the link. Idempotent; a no-op when already open.
    pub async fn open(&self) -> Result<()> {
        let mut transport = self.transport.lock().await;
        self.open_locked(&mut transport).await
    }

    /// Logically close the link. Under retain this is a no-op apart from a
    /// warning emitted at most once per link instance.
    pub async fn close(&self) -> Result<()> {
        let mut transport = self.transport.lock().await;
        self.close_locked(&mut transport).await
    }

    /// Physically close the link regardless of the retain policy. Used on
    /// the process shutdown path.
    pub async fn force_close(&self) -> Result<()> {
        let mut transport = self.transport.lock().await;
        self.physical_close_locked(&mut transport).await
    }

    /// Read a single variable by name
    pub async fn read_by_name(&self, name: &str) -> Result<PlcValue> {
        let mut transport = self.transport.lock().await;
        self.open_locked(&mut transport).await?;
        let result = transport.read_by_name(name).await;
        if result.is_ok() {
            self.metrics.record_read(&self.net_id_label);
        }
        self.release_locked(&mut transport).await;
        result
    }

    /// Write a single variable by name, optionally reading it back and
    /// failing on inequality
    pub async fn write_by_name(&self, name: &str, value: PlcValue, verify: bool) -> Result<()> {
        let mut transport = self.transport.lock().await;
        self.open_locked(&mut transport).await?;
        let result = Self::perform_write(&mut transport, name, value, verify).await;
        if result.is_ok() {
            self.metrics.record_write(&self.net_id_label);
        }
        self.release_locked(&mut transport).await;
        result
    }

    /// Read several variables in one round trip
    pub async fn read_list_by_name(&self, names: &[String]) -> Result<VariableSet> {
        let mut transport = self.transport.lock().await;
        self.open_locked(&mut transport).await?;
        let result = transport.read_list_by_name(names).await;
        if result.is_ok() {
            self.metrics.record_read(&self.net_id_label);
        }
        self.release_locked(&mut transport).await;
        result
    }

    /// Write several variables in one round trip; with `verify`, the whole
    /// batch is re-read and compared as a set
    pub async fn write_list_by_name(&self, variables: &VariableSet, verify: bool) -> Result<()> {
        let mut transport = self.transport.lock().await;
        self.open_locked(&mut transport).await?;
        let result = Self::perform_write_list(&mut transport, variables, verify).await;
        if result.is_ok() {
            self.metrics.record_write(&self.net_id_label);
        }
        self.release_locked(&mut transport).await;
        result
    }

    /// Read a fixed-length homogeneous array variable
    pub async fn read_array_by_name(&self, name: &str, count: usize) -> Result<PlcValue> {
        let mut transport = self.transport.lock().await;
        self.open_locked(&mut transport).await?;
        let result = transport.read_array_by_name(name, count).await;
        if result.is_ok() {
            self.metrics.record_read(&self.net_id_label);
        }
        self.release_locked(&mut transport).await;
        result
    }

    /// Write a homogeneous array variable; the element count is taken from
    /// the value itself
    pub async fn write_array_by_name(
        &self,
        name: &str,
        values: PlcValue,
        verify: bool,
    ) -> Result<()> {
        if !values.is_array() {
            return Err(AdsClientError::data(format!(
                "'{name}': array write requires an array value, got {values:?}"
            )));
        }
        let count = values.len();
        let mut transport = self.transport.lock().await;
        self.open_locked(&mut transport).await?;
        let result = Self::perform_write_array(&mut transport, name, values, count, verify).await;
        if result.is_ok() {
            self.metrics.record_write(&self.net_id_label);
        }
        self.release_locked(&mut transport).await;
        result
    }

    /// Query device identity
    pub async fn read_device_info(&self) -> Result<DeviceInfo> {
        let mut transport = self.transport.lock().await;
        self.open_locked(&mut transport).await?;
        let result = transport.read_device_info().await;
        self.release_locked(&mut transport).await;
        result
    }

    /// Query the full device symbol table
    pub async fn get_all_symbols(&self) -> Result<Vec<SymbolInfo>> {
        let mut transport = self.transport.lock().await;
        self.open_locked(&mut transport).await?;
        let result = transport.get_all_symbols().await;
        self.release_locked(&mut transport).await;
        result
    }

    async fn perform_write(
        transport: &mut Box<dyn AdsTransport>,
        name: &str,
        value: PlcValue,
        verify: bool,
    ) -> Result<()> {
        transport.write_by_name(name, value.clone()).await?;
        if verify {
            let echoed = transport.read_by_name(name).await?;
            if echoed != value {
                return Err(AdsClientError::verification(format!(
                    "'{name}': wrote {value:?}, read back {echoed:?}"
                )));
            }
        }
        Ok(())
    }

    async fn perform_write_list(
        transport: &mut Box<dyn AdsTransport>,
        variables: &VariableSet,
        verify: bool,
    ) -> Result<()> {
        transport.write_list_by_name(variables).await?;
        if verify {
            let names: Vec<String> = variables.keys().cloned().collect();
            let echoed = transport.read_list_by_name(&names).await?;
            if &echoed != variables {
                return Err(AdsClientError::verification(format!(
                    "batch of {} variables: read-back differs from written set",
                    variables.len()
                )));
            }
        }
        Ok(())
    }

    async fn perform_write_array(
        transport: &mut Box<dyn AdsTransport>,
        name: &str,
        values: PlcValue,
        count: usize,
        verify: bool,
    ) -> Result<()> {
        transport.write_array_by_name(name, values.clone()).await?;
        if verify {
            let echoed = transport.read_array_by_name(name, count).await?;
            if echoed != values {
                return Err(AdsClientError::verification(format!(
                    "'{name}': wrote {values:?}, read back {echoed:?}"
                )));
            }
        }
        Ok(())
    }

    async fn open_locked(&self, transport: &mut Box<dyn AdsTransport>) -> Result<()> {
        if transport.is_open() {
            return Ok(());
        }
        debug!("Opening connection to {}", self.connection_address());
        transport.open().await?;
        debug!("Connection to {} opened", self.connection_address());
        self.metrics.record_open(&self.net_id_label);
        Ok(())
    }

    async fn close_locked(&self, transport: &mut Box<dyn AdsTransport>) -> Result<()> {
        if self.retain {
            if !self.retain_warned.swap(true, Ordering::Relaxed) {
                warn!(
                    "close() called on connection {} with 'retain' set; the link stays open \
                     until force-closed. This warning will not be shown again.",
                    self.name
                );
            }
            return Ok(());
        }
        self.physical_close_locked(transport).await
    }

    async fn physical_close_locked(&self, transport: &mut Box<dyn AdsTransport>) -> Result<()> {
        if !transport.is_open() {
            return Ok(());
        }
        debug!("Closing connection to {}", self.connection_address());
        transport.close().await?;
        info!("Connection to {} closed", self.connection_address());
        self.metrics.record_close(&self.net_id_label);
        Ok(())
    }

    /// Release step of every accessor: conditionally close, never mask the
    /// operation's own result with a close failure.
    async fn release_locked(&self, transport: &mut Box<dyn AdsTransport>) {
        if let Err(e) = self.close_locked(transport).await {
            warn!("Failed to close connection {}: {e}", self.name);
        }
    }
}

impl std::fmt::Debug for AdsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdsConnection")
            .field("name", &self.name)
            .field("net_id", &self.net_id_label)
            .field("endpoint", &self.connection_address())
            .field("retain", &self.retain)
            .finish()
    }
}
