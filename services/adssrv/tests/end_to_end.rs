//! End-to-end service scenarios against the in-process simulator

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;

use adssrv::config::{BufferConfig, ServiceConfig};
use adssrv::{
    build_group, AdsClientError, AppConfig, ExitHandler, GroupBuildOptions, LinkMetrics,
    PlcValue, SimulatedPlc, TransportFactory, WorkerConfig, WorkerRole,
};

const SOURCE_NET_ID: &str = "192.168.0.10.1.1";
const SINK_NET_ID: &str = "192.168.0.11.1.1";

fn worker(role: WorkerRole, net_id: &str, interval_ms: u64, retries: u32) -> WorkerConfig {
    WorkerConfig {
        role,
        ams_net_id: net_id.to_string(),
        ip_address: "127.0.0.1".to_string(),
        ams_net_port: 851,
        update_interval_ms: interval_ms,
        retry_attempts: retries,
        retain_connection: true,
        timeout_ms: None,
        buffer: "exchange".to_string(),
        data_names: vec![],
        process_data_enabled: false,
        write_batch_size: 0,
        verify_write_operations: true,
    }
}

fn pipeline_config(reader: WorkerConfig, writer: WorkerConfig) -> AppConfig {
    let mut buffers = IndexMap::new();
    buffers.insert("exchange".to_string(), BufferConfig::default());
    let mut workers = IndexMap::new();
    workers.insert("source_reader".to_string(), reader);
    workers.insert("sink_writer".to_string(), writer);
    let config = AppConfig {
        service: ServiceConfig::default(),
        buffers,
        workers,
    };
    config.validate().expect("test config must validate");
    config
}

fn sim_factory(source: &SimulatedPlc, sink: &SimulatedPlc) -> TransportFactory {
    let source = source.clone();
    let sink = sink.clone();
    Arc::new(move |_name, worker| {
        if worker.ams_net_id == SOURCE_NET_ID {
            Box::new(source.link())
        } else {
            Box::new(sink.link())
        }
    })
}

fn recording_exit() -> (ExitHandler, Arc<AtomicU32>) {
    let exits = Arc::new(AtomicU32::new(0));
    let hook_exits = Arc::clone(&exits);
    let handler: ExitHandler = Arc::new(move |_| {
        hook_exits.fetch_add(1, Ordering::SeqCst);
    });
    (handler, exits)
}

fn seeded_source() -> SimulatedPlc {
    let plc = SimulatedPlc::new();
    plc.seed("MAIN.x", PlcValue::Int(0));
    plc.seed("MAIN.y", PlcValue::Float(0.0));
    plc
}

fn seeded_sink() -> SimulatedPlc {
    let plc = SimulatedPlc::new();
    plc.seed("MAIN.x", PlcValue::Int(99));
    plc.seed("MAIN.y", PlcValue::Float(99.0));
    plc
}

#[tokio::test]
async fn two_worker_pipeline_transfers_cyclic_snapshots() {
    let source = seeded_source();
    let sink = seeded_sink();

    let mut reader = worker(WorkerRole::Reader, SOURCE_NET_ID, 100, 3);
    reader.data_names = vec!["MAIN.x".to_string(), "MAIN.y".to_string()];
    let writer = worker(WorkerRole::Writer, SINK_NET_ID, 100, 3);

    let metrics = LinkMetrics::new();
    let (exit_handler, exits) = recording_exit();
    let group = build_group(
        &pipeline_config(reader, writer),
        &metrics,
        &sim_factory(&source, &sink),
        GroupBuildOptions {
            exit_handler: Some(exit_handler),
            ..Default::default()
        },
    )
    .unwrap();

    let shutdown = group.cancellation_token();
    let handle = tokio::spawn(group.join());
    tokio::time::sleep(Duration::from_millis(650)).await;
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    // Snapshots made it across: the sink now mirrors the source
    assert_eq!(sink.get("MAIN.x"), Some(PlcValue::Int(0)));
    assert_eq!(sink.get("MAIN.y"), Some(PlcValue::Float(0.0)));

    // At least five full cycles in 650ms at a 100ms interval
    assert!(metrics.reads(SOURCE_NET_ID) >= 5);
    assert!(metrics.writes(SINK_NET_ID) >= 5);
    assert_eq!(exits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn retained_links_open_once_for_the_whole_run() {
    let source = seeded_source();
    let sink = seeded_sink();

    let mut reader = worker(WorkerRole::Reader, SOURCE_NET_ID, 50, 3);
    reader.data_names = vec!["MAIN.x".to_string()];
    let writer = worker(WorkerRole::Writer, SINK_NET_ID, 50, 3);

    let metrics = LinkMetrics::new();
    let (exit_handler, _) = recording_exit();
    let group = build_group(
        &pipeline_config(reader, writer),
        &metrics,
        &sim_factory(&source, &sink),
        GroupBuildOptions {
            exit_handler: Some(exit_handler),
            ..Default::default()
        },
    )
    .unwrap();

    let shutdown = group.cancellation_token();
    let handle = tokio::spawn(group.join());
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    // Many cycles, one open; the shutdown force-close is the only close
    assert!(metrics.reads(SOURCE_NET_ID) >= 3);
    assert_eq!(metrics.opens(SOURCE_NET_ID), 1);
    assert_eq!(metrics.closes(SOURCE_NET_ID), 1);
}

#[tokio::test]
async fn non_retained_links_cycle_open_and_close() {
    let source = seeded_source();
    let sink = seeded_sink();

    let mut reader = worker(WorkerRole::Reader, SOURCE_NET_ID, 50, 3);
    reader.data_names = vec!["MAIN.x".to_string()];
    reader.retain_connection = false;
    let writer = worker(WorkerRole::Writer, SINK_NET_ID, 50, 3);

    let metrics = LinkMetrics::new();
    let (exit_handler, _) = recording_exit();
    let group = build_group(
        &pipeline_config(reader, writer),
        &metrics,
        &sim_factory(&source, &sink),
        GroupBuildOptions {
            exit_handler: Some(exit_handler),
            ..Default::default()
        },
    )
    .unwrap();

    let shutdown = group.cancellation_token();
    let handle = tokio::spawn(group.join());
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    let opens = metrics.opens(SOURCE_NET_ID);
    assert!(opens >= 3);
    assert_eq!(opens, metrics.closes(SOURCE_NET_ID));
}

#[tokio::test]
async fn retry_exhaustion_signals_process_exit_and_stops_the_group() {
    let source = seeded_source();
    source.fail_next(u32::MAX);
    let sink = seeded_sink();

    let mut reader = worker(WorkerRole::Reader, SOURCE_NET_ID, 20, 3);
    reader.data_names = vec!["MAIN.x".to_string()];
    let writer = worker(WorkerRole::Writer, SINK_NET_ID, 20, 3);

    let (exit_handler, exits) = recording_exit();
    let group = build_group(
        &pipeline_config(reader, writer),
        &LinkMetrics::new(),
        &sim_factory(&source, &sink),
        GroupBuildOptions {
            exit_handler: Some(exit_handler),
            ..Default::default()
        },
    )
    .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), group.join())
        .await
        .expect("group must stop after the fatal failure");
    assert!(matches!(
        result,
        Err(AdsClientError::RetryExhausted { attempts: 3, .. })
    ));
    assert_eq!(exits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn batch_writer_coalesces_buffered_records() {
    let source = seeded_source();
    let sink = seeded_sink();

    let mut reader = worker(WorkerRole::Reader, SOURCE_NET_ID, 20, 3);
    reader.data_names = vec!["MAIN.x".to_string(), "MAIN.y".to_string()];
    // Writer wakes rarely and flushes the backlog as one batch write
    let mut writer = worker(WorkerRole::Writer, SINK_NET_ID, 150, 3);
    writer.write_batch_size = 16;

    let metrics = LinkMetrics::new();
    let (exit_handler, _) = recording_exit();
    let group = build_group(
        &pipeline_config(reader, writer),
        &metrics,
        &sim_factory(&source, &sink),
        GroupBuildOptions {
            exit_handler: Some(exit_handler),
            ..Default::default()
        },
    )
    .unwrap();

    let shutdown = group.cancellation_token();
    let handle = tokio::spawn(group.join());
    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(sink.get("MAIN.x"), Some(PlcValue::Int(0)));
    assert_eq!(sink.get("MAIN.y"), Some(PlcValue::Float(0.0)));
    // Far fewer writes than reads: records were coalesced
    assert!(metrics.writes(SINK_NET_ID) < metrics.reads(SOURCE_NET_ID));
}

#[tokio::test]
async fn unknown_variable_skips_cycles_without_stopping_the_group() {
    let source = seeded_source();
    let sink = seeded_sink();

    let mut reader = worker(WorkerRole::Reader, SOURCE_NET_ID, 20, 3);
    reader.data_names = vec!["MAIN.ghost".to_string()];
    let writer = worker(WorkerRole::Writer, SINK_NET_ID, 20, 3);

    let (exit_handler, exits) = recording_exit();
    let group = build_group(
        &pipeline_config(reader, writer),
        &LinkMetrics::new(),
        &sim_factory(&source, &sink),
        GroupBuildOptions {
            exit_handler: Some(exit_handler),
            ..Default::default()
        },
    )
    .unwrap();

    let shutdown = group.cancellation_token();
    let handle = tokio::spawn(group.join());
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.cancel();
    // The group is still healthy enough to shut down cleanly
    handle.await.unwrap().unwrap();

    assert_eq!(exits.load(Ordering::SeqCst), 0);
    assert_eq!(sink.get("MAIN.x"), Some(PlcValue::Int(99)));
}

#[tokio::test]
async fn process_data_transform_is_applied_when_enabled() {
    let source = seeded_source();
    let sink = seeded_sink();
    sink.seed("derived.flag", PlcValue::Bool(false));

    let mut reader = worker(WorkerRole::Reader, SOURCE_NET_ID, 20, 3);
    reader.data_names = vec!["MAIN.x".to_string()];
    reader.process_data_enabled = true;
    let writer = worker(WorkerRole::Writer, SINK_NET_ID, 20, 3);

    let (exit_handler, _) = recording_exit();
    let group = build_group(
        &pipeline_config(reader, writer),
        &LinkMetrics::new(),
        &sim_factory(&source, &sink),
        GroupBuildOptions {
            transform: Some(Arc::new(|mut record| {
                record.insert("derived.flag".to_string(), PlcValue::Bool(true));
                Some(record)
            })),
            exit_handler: Some(exit_handler),
        },
    )
    .unwrap();

    let shutdown = group.cancellation_token();
    let handle = tokio::spawn(group.join());
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(sink.get("derived.flag"), Some(PlcValue::Bool(true)));
}
