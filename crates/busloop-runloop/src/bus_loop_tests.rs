use super::*;
use crate::error::RunLoopError;
use crate::memory_bus::{BUS_DAEMON_NAME, BUS_DAEMON_PATH, MemoryBus};
use async_trait::async_trait;
use busloop_protocols::BusError;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Connector that fails, leaving a task parked on the loop until the loop is dropped.
struct FailingConnector {
    sentinel: Arc<()>,
}

#[async_trait]
impl BusConnector for FailingConnector {
    async fn connect(
        &self,
        bus_name: &BusName,
        _object_path: &ObjectPath,
    ) -> Result<Arc<dyn BusConnection>, BusError> {
        let sentinel = Arc::clone(&self.sentinel);
        tokio::spawn(async move {
            let _sentinel = sentinel;
            std::future::pending::<()>().await;
        });
        Err(BusError::ServiceUnknown(bus_name.to_string()))
    }
}

/// Sets its flag when the thread holding it exits.
struct ExitFlag(Arc<AtomicBool>);

impl Drop for ExitFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

thread_local! {
    static ON_EXIT: RefCell<Option<ExitFlag>> = const { RefCell::new(None) };
}

fn start() -> BusLoop {
    BusLoop::start(&LoopConfig::default()).unwrap()
}

#[test]
fn test_start_returns_live_loop() {
    let bus_loop = start();
    assert!(bus_loop.is_running());
    assert_eq!(bus_loop.pending_operations(), 0);

    let handle = bus_loop.loop_handle().unwrap();
    assert!(handle.is_running());
    assert_eq!(Some(handle.thread_id()), bus_loop.loop_thread_id());
    assert_ne!(handle.thread_id(), std::thread::current().id());
    assert!(bus_loop.metrics().started_at.is_some());
    assert!(bus_loop.connection().is_none());
}

#[test]
fn test_work_scheduled_right_after_construction_runs() {
    for _ in 0..20 {
        let bus_loop = start();
        let (tx, rx) = mpsc::channel();
        bus_loop
            .spawn(async move {
                tx.send(std::thread::current().id()).unwrap();
            })
            .unwrap();

        let ran_on = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(Some(ran_on), bus_loop.loop_thread_id());
    }
}

#[test]
fn test_loop_thread_is_named() {
    let config = LoopConfig::default().with_thread_name("bus-worker");
    let bus_loop = BusLoop::start(&config).unwrap();

    let (tx, rx) = mpsc::channel();
    bus_loop
        .spawn(async move {
            tx.send(std::thread::current().name().map(str::to_string))
                .unwrap();
        })
        .unwrap();
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(2)).unwrap().as_deref(),
        Some("bus-worker")
    );
}

#[test]
fn test_connect_to_reachable_service() {
    let bus = Arc::new(MemoryBus::new());
    let bus_loop = BusLoop::connect(bus, BUS_DAEMON_NAME, BUS_DAEMON_PATH).unwrap();

    assert!(bus_loop.is_running());
    assert_eq!(bus_loop.bus_name().unwrap().as_str(), BUS_DAEMON_NAME);
    assert_eq!(bus_loop.object_path().unwrap().as_str(), BUS_DAEMON_PATH);
    assert!(bus_loop.connection().is_some());
    // The connection attempt was an accounted operation.
    assert_eq!(bus_loop.metrics().operations_started, 1);
}

#[test]
fn test_connect_to_unreachable_service_fails() {
    let bus = Arc::new(MemoryBus::new());
    let err = BusLoop::connect(bus, "invalid.bus.name", "/invalid/object/path").unwrap_err();

    match err {
        InitializationError::Connection { bus_name, source } => {
            assert_eq!(bus_name, "invalid.bus.name");
            assert!(matches!(source, BusError::ServiceUnknown(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_failed_connect_leaves_no_loop_behind() {
    let sentinel = Arc::new(());
    let connector = Arc::new(FailingConnector {
        sentinel: Arc::clone(&sentinel),
    });

    let result = BusLoop::connect(connector, "net.connman", "/");
    assert!(matches!(result, Err(InitializationError::Connection { .. })));

    // The parked task only goes away with the loop, which only goes away
    // when the loop thread finishes.
    assert_eq!(Arc::strong_count(&sentinel), 1);
}

#[test]
fn test_loop_build_failure_joins_thread() {
    let exited = Arc::new(AtomicBool::new(false));
    let flag = ExitFlag(Arc::clone(&exited));
    let config = LoopConfig::default().with_thread_name("busloop-broken");

    let result = BusLoop::start_with(&config, move || {
        ON_EXIT.with(|slot| *slot.borrow_mut() = Some(flag));
        Err(io::Error::other("no io driver"))
    });

    match result {
        Err(InitializationError::LoopStartup(reason)) => assert_eq!(reason, "no io driver"),
        other => panic!("unexpected result: {other:?}"),
    }
    // The loop thread has already exited when the error reaches us.
    assert!(exited.load(Ordering::SeqCst));
}

#[test]
fn test_custom_loop_builder_is_used_on_loop_thread() {
    let (tx, rx) = mpsc::channel();
    let bus_loop = BusLoop::start_with(&LoopConfig::default(), move || {
        tx.send(std::thread::current().id()).unwrap();
        EventLoop::new()
    })
    .unwrap();

    let built_on = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(Some(built_on), bus_loop.loop_thread_id());
    assert!(bus_loop.is_running());
}

#[test]
fn test_malformed_names_fail_before_starting() {
    let bus = Arc::new(MemoryBus::new());

    let err = BusLoop::connect(bus.clone(), "nodots", "/").unwrap_err();
    assert!(matches!(err, InitializationError::InvalidBusName(_)));

    let err = BusLoop::connect(bus, "net.connman", "relative/path").unwrap_err();
    assert!(matches!(err, InitializationError::InvalidObjectPath(_)));
}

#[test]
fn test_shutdown_waits_for_pending_operations() {
    let bus_loop = start();
    let hooks = bus_loop.hooks();
    bus_loop.operation_started();
    bus_loop.operation_started();

    let (done_tx, done_rx) = mpsc::channel();
    let teardown = std::thread::spawn(move || {
        bus_loop.shutdown();
        done_tx.send(()).unwrap();
    });

    assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert!(!hooks.is_running());
    assert_eq!(hooks.pending_operations(), 2);
    assert!(!hooks.loop_handle().unwrap().is_quit_requested());

    hooks.operation_completed();
    assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());

    hooks.operation_completed();
    done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    teardown.join().unwrap();

    assert_eq!(hooks.pending_operations(), 0);
    assert!(hooks.loop_handle().is_none());
}

#[test]
fn test_drop_with_nothing_pending_is_prompt() {
    let bus_loop = start();
    let hooks = bus_loop.hooks();

    let begin = Instant::now();
    drop(bus_loop);
    assert!(begin.elapsed() < Duration::from_secs(2));

    assert!(hooks.loop_handle().is_none());
    assert!(!hooks.is_running());
    assert_eq!(hooks.metrics().quit_requests, 1);
}

#[test]
fn test_spawned_work_holds_shutdown_open() {
    let bus_loop = start();
    let hooks = bus_loop.hooks();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let finished = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&finished);
    bus_loop
        .spawn(async move {
            let _ = release_rx.await;
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();
    assert_eq!(bus_loop.pending_operations(), 1);

    let teardown = std::thread::spawn(move || bus_loop.shutdown());
    std::thread::sleep(Duration::from_millis(100));
    assert!(!teardown.is_finished());
    assert!(!finished.load(Ordering::SeqCst));

    release_tx.send(()).unwrap();
    teardown.join().unwrap();
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(hooks.pending_operations(), 0);
}

#[test]
fn test_panicking_work_is_still_accounted() {
    let bus_loop = start();
    let handle = bus_loop
        .spawn(async {
            panic!("completion handler failed");
        })
        .unwrap();

    let hooks = bus_loop.hooks();
    let deadline = Instant::now() + Duration::from_secs(2);
    while !handle.is_finished() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(handle.is_finished());
    assert_eq!(hooks.pending_operations(), 0);
    drop(bus_loop);
    assert!(hooks.loop_handle().is_none());
}

#[test]
fn test_guard_pairs_accounting() {
    let bus_loop = start();

    for _ in 0..3 {
        let guard = bus_loop.guard();
        assert_eq!(bus_loop.pending_operations(), 1);
        drop(guard);
        assert_eq!(bus_loop.pending_operations(), 0);
    }
    // Being idle is not a reason to stop.
    assert!(bus_loop.is_running());
    assert!(!bus_loop.loop_handle().unwrap().is_quit_requested());
}

#[test]
fn test_spawn_after_shutdown_fails() {
    let bus_loop = start();
    let hooks = bus_loop.hooks();
    bus_loop.shutdown();

    let result = hooks.spawn(async {});
    assert!(matches!(result, Err(RunLoopError::LoopStopped)));
    assert_eq!(hooks.pending_operations(), 0);
}

#[test]
fn test_shutdown_releases_connection() {
    let bus = Arc::new(MemoryBus::new());
    let bus_loop = BusLoop::connect(bus, BUS_DAEMON_NAME, BUS_DAEMON_PATH).unwrap();
    let connection = Arc::clone(bus_loop.connection().unwrap());
    bus_loop.shutdown();

    let target = busloop_protocols::ObjectAddress::new(
        BusName::new(BUS_DAEMON_NAME).unwrap(),
        ObjectPath::new(BUS_DAEMON_PATH).unwrap(),
        busloop_protocols::InterfaceName::new(BUS_DAEMON_NAME).unwrap(),
    );
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let result = runtime.block_on(connection.get_all_properties(&target));
    assert_eq!(result.unwrap_err(), BusError::Disconnected);
}

#[test]
fn test_debug_format() {
    let bus_loop = start();
    let debug = format!("{:?}", bus_loop);
    assert!(debug.contains("BusLoop"));
    assert!(debug.contains("running: true"));
    assert!(debug.contains("connected: false"));
}
