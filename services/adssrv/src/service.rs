//! Worker group assembly and lifecycle
//!
//! Builds connections, buffers and workers from the validated config, runs
//! every worker as its own tokio task and supervises them as one unit.
//! Workers are not isolated from each other: a fatal failure in any worker
//! cancels the whole group. On ctrl-c or SIGTERM the group cancels its
//! token and each worker force-closes its own link, retained links
//! included.

use std::sync::Arc;

use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::buffer::DataBuffer;
use crate::client::{AdsReaderClient, AdsWriterClient, ProcessDataFn};
use crate::config::{AppConfig, WorkerConfig, WorkerRole};
use crate::connection::{AdsConnection, LinkOptions};
use crate::error::{AdsClientError, Result};
use crate::metrics::LinkMetrics;
use crate::retry::{ExitHandler, RetryExecutor};
use crate::transport::AdsTransport;

/// Produces the transport for one worker's device link
pub type TransportFactory = Arc<dyn Fn(&str, &WorkerConfig) -> Box<dyn AdsTransport> + Send + Sync>;

/// Optional hooks applied while building a group from config
#[derive(Default)]
pub struct GroupBuildOptions {
    /// Per-record transform for readers with `process_data_enabled`
    pub transform: Option<ProcessDataFn>,
    /// Replacement for the process-exit retry exhaustion policy
    pub exit_handler: Option<ExitHandler>,
}

/// A set of workers supervised as one unit
pub struct WorkerGroup {
    cancel: CancellationToken,
    tasks: JoinSet<(String, Result<()>)>,
}

impl WorkerGroup {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Token cancelled when the group shuts down
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn_reader(&mut self, reader: AdsReaderClient) {
        let name = reader.name().to_string();
        let cancel = self.cancel.clone();
        self.tasks
            .spawn(async move { (name, reader.run(cancel).await) });
    }

    pub fn spawn_writer(&mut self, writer: AdsWriterClient) {
        let name = writer.name().to_string();
        let cancel = self.cancel.clone();
        self.tasks
            .spawn(async move { (name, writer.run(cancel).await) });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Request shutdown of every worker
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for every worker. The first failure cancels the rest and is
    /// returned once all tasks have stopped.
    pub async fn join(mut self) -> Result<()> {
        let mut result = Ok(());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => info!("Worker {name} finished"),
                Ok((name, Err(e))) => {
                    error!("Worker {name} failed: {e}");
                    self.cancel.cancel();
                    if result.is_ok() {
                        result = Err(e);
                    }
                },
                Err(e) => {
                    error!("Worker task panicked: {e}");
                    self.cancel.cancel();
                    if result.is_ok() {
                        result = Err(AdsClientError::internal(format!("worker panicked: {e}")));
                    }
                },
            }
        }
        result
    }

    /// Run until a shutdown signal arrives or a worker fails fatally
    pub async fn run_until_shutdown(self) -> Result<()> {
        let cancel = self.cancel.clone();
        let signal_task = tokio::spawn(async move {
            wait_for_shutdown().await;
            info!("Shutdown signal received, stopping workers");
            cancel.cancel();
        });
        let result = self.join().await;
        signal_task.abort();
        result
    }
}

impl Default for WorkerGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve on ctrl-c or, on unix, SIGTERM
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install ctrl-c handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Assemble buffers, links and workers from a validated config
pub fn build_group(
    config: &AppConfig,
    metrics: &LinkMetrics,
    factory: &TransportFactory,
    options: GroupBuildOptions,
) -> Result<WorkerGroup> {
    let mut buffers = indexmap::IndexMap::new();
    for (name, buffer_config) in &config.buffers {
        let buffer = if buffer_config.no_drop {
            DataBuffer::no_drop(buffer_config.capacity)
        } else {
            DataBuffer::drop_oldest(buffer_config.capacity)
        };
        buffers.insert(name.clone(), Arc::new(buffer));
    }

    let mut group = WorkerGroup::new();
    for (name, worker) in &config.workers {
        let transport = factory(name, worker);
        let connection = Arc::new(AdsConnection::new(
            transport,
            &worker.ams_net_id,
            worker.ip_address.clone(),
            worker.ams_net_port,
            LinkOptions {
                name: Some(format!("{name}-link")),
                retain: worker.retain_connection,
                timeout: worker.timeout(),
            },
            metrics.clone(),
        )?);

        let retry = match &options.exit_handler {
            Some(handler) => {
                RetryExecutor::with_exit_handler(worker.retry_attempts, Arc::clone(handler))
            },
            None => RetryExecutor::new(worker.retry_attempts),
        };

        // Validated upfront, so the lookup cannot fail here
        let buffer = buffers
            .get(&worker.buffer)
            .cloned()
            .ok_or_else(|| AdsClientError::config(format!("unknown buffer '{}'", worker.buffer)))?;

        match worker.role {
            WorkerRole::Reader => {
                let mut reader = AdsReaderClient::new(
                    connection,
                    buffer,
                    worker.data_names.clone(),
                    worker.update_interval(),
                    retry,
                )
                .with_name(name.clone());
                if worker.process_data_enabled {
                    if let Some(transform) = &options.transform {
                        reader = reader.with_transform(Arc::clone(transform));
                    }
                }
                group.spawn_reader(reader);
            },
            WorkerRole::Writer => {
                let writer = AdsWriterClient::new(
                    connection,
                    buffer,
                    worker.update_interval(),
                    retry,
                )
                .with_name(name.clone())
                .with_batch_size(worker.write_batch_size)
                .with_verify(worker.verify_write_operations);
                group.spawn_writer(writer);
            },
        }
    }

    info!("Worker group assembled: {} workers", group.len());
    Ok(group)
}
