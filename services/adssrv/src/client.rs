//! Cyclic reader and writer workers
//!
//! A reader polls a fixed variable list from its own device link every
//! interval and appends the snapshot to its buffer; a writer drains its
//! buffer back to the device, either one record per cycle or as a coalesced
//! batch. Each worker owns exactly one link and one buffer end. Device I/O
//! inside a cycle runs under the retry executor; a cycle that still fails
//! with a transient error after retries has already triggered the exit
//! policy, while any other cycle error is logged and the worker moves on to
//! the next tick.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::buffer::DataBuffer;
use crate::connection::{auto_name, AdsConnection};
use crate::error::{AdsClientError, Result};
use crate::retry::RetryExecutor;
use crate::transport::VariableSet;

static READER_SEQ: AtomicU64 = AtomicU64::new(0);
static WRITER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Per-record hook applied between device read and buffer append. Returning
/// `None` discards the record for this cycle.
pub type ProcessDataFn = Arc<dyn Fn(VariableSet) -> Option<VariableSet> + Send + Sync>;

/// Cyclic polling worker feeding a buffer
pub struct AdsReaderClient {
    name: String,
    connection: Arc<AdsConnection>,
    buffer: Arc<DataBuffer>,
    data_names: Arc<[String]>,
    interval: Duration,
    retry: RetryExecutor,
    transform: Option<ProcessDataFn>,
}

impl AdsReaderClient {
    pub fn new(
        connection: Arc<AdsConnection>,
        buffer: Arc<DataBuffer>,
        data_names: Vec<String>,
        interval: Duration,
        retry: RetryExecutor,
    ) -> Self {
        Self {
            name: auto_name("reader_client", &READER_SEQ),
            connection,
            buffer,
            data_names: data_names.into(),
            interval,
            retry,
            transform: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_transform(mut self, transform: ProcessDataFn) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Poll until cancelled. The worker's own link is force-closed on the
    /// way out regardless of its retain policy.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!(
            "Reader {} started: {} variables from {} every {:?}",
            self.name,
            self.data_names.len(),
            self.connection.net_id(),
            self.interval
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                _ = ticker.tick() => {
                    if let Err(e) = self.cycle().await {
                        if matches!(e, AdsClientError::RetryExhausted { .. }) {
                            break Err(e);
                        }
                        warn!("Reader {}: cycle failed, skipping: {e}", self.name);
                    }
                }
            }
        };

        if let Err(e) = self.connection.force_close().await {
            warn!("Reader {}: failed to close link on shutdown: {e}", self.name);
        }
        info!("Reader {} stopped", self.name);
        result
    }

    async fn cycle(&self) -> Result<()> {
        let context = format!("reader {}", self.name);
        let connection = Arc::clone(&self.connection);
        let names = Arc::clone(&self.data_names);
        let record = self
            .retry
            .execute(&context, move || {
                let connection = Arc::clone(&connection);
                let names = Arc::clone(&names);
                async move { connection.read_list_by_name(&names).await }
            })
            .await?;

        let record = match &self.transform {
            Some(transform) => match transform(record) {
                Some(processed) => processed,
                None => {
                    // Deliberate per-record veto, not a device failure
                    error!("Reader {}: processing returned no data, record skipped", self.name);
                    return Ok(());
                },
            },
            None => record,
        };

        debug!("Reader {}: appending {} variables", self.name, record.len());
        self.buffer.append(record).await;
        Ok(())
    }
}

/// Cyclic draining worker flushing a buffer to its device
pub struct AdsWriterClient {
    name: String,
    connection: Arc<AdsConnection>,
    buffer: Arc<DataBuffer>,
    interval: Duration,
    retry: RetryExecutor,
    /// Records coalesced per cycle; 0 writes one record variable-by-variable
    batch_size: usize,
    verify: bool,
}

impl AdsWriterClient {
    pub fn new(
        connection: Arc<AdsConnection>,
        buffer: Arc<DataBuffer>,
        interval: Duration,
        retry: RetryExecutor,
    ) -> Self {
        Self {
            name: auto_name("writer_client", &WRITER_SEQ),
            connection,
            buffer,
            interval,
            retry,
            batch_size: 0,
            verify: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Coalesce up to `batch_size` buffered records into one batch write
    /// per cycle
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!(
            "Writer {} started: draining to {} every {:?} (batch size {})",
            self.name,
            self.connection.net_id(),
            self.interval,
            self.batch_size
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                _ = ticker.tick() => {
                    if let Err(e) = self.cycle().await {
                        if matches!(e, AdsClientError::RetryExhausted { .. }) {
                            break Err(e);
                        }
                        warn!("Writer {}: cycle failed, skipping: {e}", self.name);
                    }
                }
            }
        };

        if let Err(e) = self.connection.force_close().await {
            warn!("Writer {}: failed to close link on shutdown: {e}", self.name);
        }
        info!("Writer {} stopped", self.name);
        result
    }

    async fn cycle(&self) -> Result<()> {
        if self.batch_size > 0 {
            self.flush_batch().await
        } else {
            self.flush_one().await
        }
    }

    /// Coalesce up to `batch_size` records and push them in one batch write
    async fn flush_batch(&self) -> Result<()> {
        let batch = self.buffer.dump(self.batch_size).await;
        if batch.is_empty() {
            return Ok(());
        }
        debug!(
            "Writer {}: flushing batch of {} variables",
            self.name,
            batch.len()
        );
        let context = format!("writer {}", self.name);
        let connection = Arc::clone(&self.connection);
        let verify = self.verify;
        let batch = Arc::new(batch);
        self.retry
            .execute(&context, move || {
                let connection = Arc::clone(&connection);
                let batch = Arc::clone(&batch);
                async move { connection.write_list_by_name(&batch, verify).await }
            })
            .await
    }

    /// Take the oldest record and write its variables one by one, in
    /// record order
    async fn flush_one(&self) -> Result<()> {
        let Some(record) = self.buffer.pop_front().await else {
            return Ok(());
        };
        debug!(
            "Writer {}: flushing record of {} variables",
            self.name,
            record.len()
        );
        let context = format!("writer {}", self.name);
        for (name, value) in record {
            let connection = Arc::clone(&self.connection);
            let name = Arc::new(name);
            let verify = self.verify;
            self.retry
                .execute(&context, move || {
                    let connection = Arc::clone(&connection);
                    let name = Arc::clone(&name);
                    let value = value.clone();
                    async move { connection.write_by_name(&name, value, verify).await }
                })
                .await?;
        }
        Ok(())
    }
}
