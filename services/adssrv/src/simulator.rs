//! In-process device simulator
//!
//! `SimulatedPlc` is a shared variable store standing in for one device;
//! each [`SimulatedPlc::link`] hands out an independent transport handle
//! backed by the same store, so a reader link and a writer link observe one
//! device the way two AMS routes to one PLC would. Fault injection covers
//! the failure classes the retry layer cares about: timed-out operations
//! and corrupted writes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use crate::error::{AdsClientError, Result};
use crate::transport::{AdsTransport, DeviceInfo, PlcValue, SymbolInfo, VariableSet};

#[derive(Default)]
struct FaultState {
    /// Remaining operations to fail with a timeout
    fail_next: u32,
    /// Perturb every stored write so read-back verification fails
    corrupt_writes: bool,
}

/// Shared state of one simulated device
#[derive(Clone)]
pub struct SimulatedPlc {
    store: Arc<RwLock<HashMap<String, PlcValue>>>,
    faults: Arc<Mutex<FaultState>>,
    device_name: String,
}

impl SimulatedPlc {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            faults: Arc::new(Mutex::new(FaultState::default())),
            device_name: "SimulatedPlc".to_string(),
        }
    }

    /// Declare a variable and its initial value
    pub fn seed(&self, name: &str, value: PlcValue) {
        self.store
            .write()
            .expect("simulator store poisoned")
            .insert(name.to_string(), value);
    }

    /// Current value of a variable, if declared
    pub fn get(&self, name: &str) -> Option<PlcValue> {
        self.store
            .read()
            .expect("simulator store poisoned")
            .get(name)
            .cloned()
    }

    /// Fail the next `n` transport operations with a timeout
    pub fn fail_next(&self, n: u32) {
        self.faults.lock().expect("simulator faults poisoned").fail_next = n;
    }

    /// Toggle write corruption, which makes verified writes mismatch
    pub fn corrupt_writes(&self, enabled: bool) {
        self.faults
            .lock()
            .expect("simulator faults poisoned")
            .corrupt_writes = enabled;
    }

    /// New transport handle onto this device
    pub fn link(&self) -> SimulatedLink {
        SimulatedLink {
            plc: self.clone(),
            open: false,
            timeout: Duration::from_secs(5),
        }
    }

    fn consume_fault(&self) -> Result<()> {
        let mut faults = self.faults.lock().expect("simulator faults poisoned");
        if faults.fail_next > 0 {
            faults.fail_next -= 1;
            return Err(AdsClientError::timeout(format!(
                "{}: injected operation timeout",
                self.device_name
            )));
        }
        Ok(())
    }

    fn corrupting(&self) -> bool {
        self.faults
            .lock()
            .expect("simulator faults poisoned")
            .corrupt_writes
    }

    fn read(&self, name: &str) -> Result<PlcValue> {
        self.get(name)
            .ok_or_else(|| AdsClientError::symbol_not_found(name))
    }

    fn write(&self, name: &str, value: PlcValue) -> Result<()> {
        let mut store = self.store.write().expect("simulator store poisoned");
        if !store.contains_key(name) {
            return Err(AdsClientError::symbol_not_found(name));
        }
        let stored = if self.corrupting() {
            perturb(&value)
        } else {
            value
        };
        store.insert(name.to_string(), stored);
        Ok(())
    }
}

impl Default for SimulatedPlc {
    fn default() -> Self {
        Self::new()
    }
}

/// Make a value unequal to itself under exact comparison
fn perturb(value: &PlcValue) -> PlcValue {
    match value {
        PlcValue::Bool(b) => PlcValue::Bool(!b),
        PlcValue::Int(i) => PlcValue::Int(i.wrapping_add(1)),
        PlcValue::Float(f) => PlcValue::Float(f + 1.0),
        PlcValue::String(s) => PlcValue::String(format!("{s}?")),
        PlcValue::BoolArray(v) => PlcValue::BoolArray(v.iter().map(|b| !b).collect()),
        PlcValue::IntArray(v) => {
            PlcValue::IntArray(v.iter().map(|i| i.wrapping_add(1)).collect())
        },
        PlcValue::FloatArray(v) => PlcValue::FloatArray(v.iter().map(|f| f + 1.0).collect()),
    }
}

/// One transport handle onto a [`SimulatedPlc`]
pub struct SimulatedLink {
    plc: SimulatedPlc,
    open: bool,
    timeout: Duration,
}

impl SimulatedLink {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(AdsClientError::connection(format!(
                "{}: link not open",
                self.plc.device_name
            )))
        }
    }
}

#[async_trait]
impl AdsTransport for SimulatedLink {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn open(&mut self) -> Result<()> {
        self.plc.consume_fault()?;
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    async fn read_by_name(&mut self, name: &str) -> Result<PlcValue> {
        self.ensure_open()?;
        self.plc.consume_fault()?;
        trace!("sim read {name}");
        self.plc.read(name)
    }

    async fn write_by_name(&mut self, name: &str, value: PlcValue) -> Result<()> {
        self.ensure_open()?;
        self.plc.consume_fault()?;
        trace!("sim write {name}");
        self.plc.write(name, value)
    }

    async fn read_list_by_name(&mut self, names: &[String]) -> Result<VariableSet> {
        self.ensure_open()?;
        self.plc.consume_fault()?;
        let mut set = VariableSet::with_capacity(names.len());
        for name in names {
            set.insert(name.clone(), self.plc.read(name)?);
        }
        Ok(set)
    }

    async fn write_list_by_name(&mut self, variables: &VariableSet) -> Result<()> {
        self.ensure_open()?;
        self.plc.consume_fault()?;
        // Whole-batch semantics: reject before writing anything
        for name in variables.keys() {
            if self.plc.get(name).is_none() {
                return Err(AdsClientError::symbol_not_found(name));
            }
        }
        for (name, value) in variables {
            self.plc.write(name, value.clone())?;
        }
        Ok(())
    }

    async fn read_array_by_name(&mut self, name: &str, count: usize) -> Result<PlcValue> {
        self.ensure_open()?;
        self.plc.consume_fault()?;
        let value = self.plc.read(name)?;
        if !value.is_array() {
            return Err(AdsClientError::data(format!(
                "'{name}' is not an array variable"
            )));
        }
        if value.len() != count {
            return Err(AdsClientError::data(format!(
                "'{name}': requested {count} elements, variable has {}",
                value.len()
            )));
        }
        Ok(value)
    }

    async fn write_array_by_name(&mut self, name: &str, values: PlcValue) -> Result<()> {
        self.ensure_open()?;
        self.plc.consume_fault()?;
        if !values.is_array() {
            return Err(AdsClientError::data(format!(
                "'{name}': expected an array value"
            )));
        }
        self.plc.write(name, values)
    }

    async fn read_device_info(&mut self) -> Result<DeviceInfo> {
        self.ensure_open()?;
        self.plc.consume_fault()?;
        Ok(DeviceInfo {
            device_name: self.plc.device_name.clone(),
            major: 3,
            minor: 1,
            build: 4024,
        })
    }

    async fn get_all_symbols(&mut self) -> Result<Vec<SymbolInfo>> {
        self.ensure_open()?;
        self.plc.consume_fault()?;
        let store = self.plc.store.read().expect("simulator store poisoned");
        let mut symbols: Vec<SymbolInfo> = store
            .iter()
            .map(|(name, value)| SymbolInfo {
                name: name.clone(),
                symbol_type: type_name(value).to_string(),
                comment: None,
            })
            .collect();
        symbols.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(symbols)
    }
}

fn type_name(value: &PlcValue) -> &'static str {
    match value {
        PlcValue::Bool(_) => "BOOL",
        PlcValue::Int(_) => "LINT",
        PlcValue::Float(_) => "LREAL",
        PlcValue::String(_) => "STRING",
        PlcValue::BoolArray(_) => "ARRAY OF BOOL",
        PlcValue::IntArray(_) => "ARRAY OF LINT",
        PlcValue::FloatArray(_) => "ARRAY OF LREAL",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn links_share_one_store() {
        let plc = SimulatedPlc::new();
        plc.seed("MAIN.x", PlcValue::Int(1));

        let mut writer = plc.link();
        let mut reader = plc.link();
        writer.open().await.unwrap();
        reader.open().await.unwrap();

        writer
            .write_by_name("MAIN.x", PlcValue::Int(9))
            .await
            .unwrap();
        assert_eq!(
            reader.read_by_name("MAIN.x").await.unwrap(),
            PlcValue::Int(9)
        );
    }

    #[tokio::test]
    async fn operations_require_an_open_link() {
        let plc = SimulatedPlc::new();
        plc.seed("MAIN.x", PlcValue::Int(1));
        let mut link = plc.link();

        let err = link.read_by_name("MAIN.x").await.unwrap_err();
        assert!(matches!(err, AdsClientError::ConnectionError(_)));
    }

    #[tokio::test]
    async fn fail_next_injects_exactly_n_timeouts() {
        let plc = SimulatedPlc::new();
        plc.seed("MAIN.x", PlcValue::Int(1));
        let mut link = plc.link();
        link.open().await.unwrap();

        plc.fail_next(2);
        for _ in 0..2 {
            let err = link.read_by_name("MAIN.x").await.unwrap_err();
            assert!(matches!(err, AdsClientError::TimeoutError(_)));
        }
        assert!(link.read_by_name("MAIN.x").await.is_ok());
    }

    #[tokio::test]
    async fn batch_read_fails_whole_on_unknown_name() {
        let plc = SimulatedPlc::new();
        plc.seed("MAIN.x", PlcValue::Int(1));
        let mut link = plc.link();
        link.open().await.unwrap();

        let names = vec!["MAIN.x".to_string(), "MAIN.missing".to_string()];
        let err = link.read_list_by_name(&names).await.unwrap_err();
        assert!(matches!(err, AdsClientError::SymbolNotFound(_)));
    }

    #[tokio::test]
    async fn array_read_checks_length() {
        let plc = SimulatedPlc::new();
        plc.seed("MAIN.a", PlcValue::IntArray(vec![1, 2, 3]));
        let mut link = plc.link();
        link.open().await.unwrap();

        assert!(link.read_array_by_name("MAIN.a", 3).await.is_ok());
        let err = link.read_array_by_name("MAIN.a", 4).await.unwrap_err();
        assert!(matches!(err, AdsClientError::DataError(_)));
    }

    #[tokio::test]
    async fn symbol_table_reflects_seeded_variables() {
        let plc = SimulatedPlc::new();
        plc.seed("MAIN.b", PlcValue::Bool(false));
        plc.seed("MAIN.a", PlcValue::FloatArray(vec![0.0; 2]));
        let mut link = plc.link();
        link.open().await.unwrap();

        let symbols = link.get_all_symbols().await.unwrap();
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].name, "MAIN.a");
        assert_eq!(symbols[0].symbol_type, "ARRAY OF LREAL");
        assert_eq!(symbols[1].symbol_type, "BOOL");
    }
}
