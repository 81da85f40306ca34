//! Background heartbeat task.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{HeartbeatCallback, HeartbeatConfig, HeartbeatEvent, HeartbeatStrategy};
use crate::device::Device;
use crate::error::{VdlError, VdlResult};

/// Worker control state carried on the watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Paused,
    Stopping,
}

#[derive(Default)]
struct Inner {
    config: HeartbeatConfig,
    strategy: Option<Arc<dyn HeartbeatStrategy>>,
    callback: Option<HeartbeatCallback>,
    last_error: Option<VdlError>,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
}

/// State shared between the runner handle, suspend guards and the worker.
struct Shared {
    inner: Mutex<Inner>,
    control: watch::Sender<RunState>,
    failure_count: AtomicU32,
    success_count: AtomicU64,
    total_failures: AtomicU64,
}

impl Shared {
    fn new(config: HeartbeatConfig) -> Self {
        let (control, _) = watch::channel(RunState::Idle);
        Self {
            inner: Mutex::new(Inner {
                config,
                ..Inner::default()
            }),
            control,
            failure_count: AtomicU32::new(0),
            success_count: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Callbacks run outside the lock, so poisoning can only come from a
        // panic in our own bookkeeping; the data is still consistent
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> RunState {
        *self.control.borrow()
    }

    fn strategy_name(&self) -> &'static str {
        self.lock().strategy.as_ref().map_or("none", |s| s.name())
    }

    fn pause(&self) -> bool {
        let paused = self.control.send_if_modified(|state| {
            if *state == RunState::Running {
                *state = RunState::Paused;
                true
            } else {
                false
            }
        });
        if paused {
            info!("Heartbeat paused (strategy: {})", self.strategy_name());
            self.emit(HeartbeatEvent::Paused, None);
        }
        paused
    }

    fn resume(&self) -> bool {
        let resumed = self.control.send_if_modified(|state| {
            if *state == RunState::Paused {
                *state = RunState::Running;
                true
            } else {
                false
            }
        });
        if resumed {
            info!("Heartbeat resumed (strategy: {})", self.strategy_name());
            self.emit(HeartbeatEvent::Resumed, None);
        }
        resumed
    }

    fn emit(&self, event: HeartbeatEvent, error: Option<&VdlError>) {
        let callback = self.lock().callback.clone();
        let Some(callback) = callback else {
            return;
        };
        let failures = self.failure_count.load(Ordering::Relaxed);
        if catch_unwind(AssertUnwindSafe(|| callback(event, failures, error))).is_err() {
            warn!("Heartbeat callback panicked on {} event", event);
        }
    }

    fn record_success(&self, config: &HeartbeatConfig) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        if config.auto_reset_failures {
            self.failure_count.store(0, Ordering::Relaxed);
        }
        self.lock().last_success = Some(Utc::now());
        trace!("Heartbeat ok");
        self.emit(HeartbeatEvent::Success, None);
    }

    fn record_failure(&self, config: &HeartbeatConfig, error: VdlError) {
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        {
            let mut inner = self.lock();
            inner.last_error = Some(error.clone());
            inner.last_failure = Some(Utc::now());
        }
        debug!("Heartbeat failure {}/{}: {}", failures, config.max_failures, error);
        self.emit(HeartbeatEvent::Failure, Some(&error));

        if failures >= config.max_failures {
            warn!(
                "Heartbeat reached {} consecutive failures: {}",
                failures, error
            );
            self.emit(HeartbeatEvent::MaxFailures, Some(&error));
            if config.auto_reset_failures {
                self.failure_count.store(0, Ordering::Relaxed);
            }
        }
    }
}

/// Periodic liveness probe over a shared device.
///
/// The device is shared as `Arc<tokio::sync::Mutex<D>>`; foreground code locks
/// the same mutex, so probes and commands never interleave mid-exchange.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tokio::sync::Mutex;
/// use vdl::{
///     BinaryCodec, GenericDevice, HeartbeatConfig, HeartbeatEvent, HeartbeatRunner,
///     PingHeartbeat, TcpTransport, VdlError, VdlResult,
/// };
///
/// # async fn example() -> VdlResult<()> {
/// let device = Arc::new(Mutex::new(GenericDevice::new(
///     TcpTransport::new("192.168.1.50:5025"),
///     Box::new(BinaryCodec::new()),
/// )));
///
/// let config = HeartbeatConfig::new().with_interval(Duration::from_secs(2));
/// let mut runner = HeartbeatRunner::new(device.clone(), config)
///     .with_strategy(Arc::new(PingHeartbeat::new(0x00)));
/// runner.set_callback(Some(Arc::new(|event: HeartbeatEvent, failures: u32, _err: Option<&VdlError>| {
///     if event == HeartbeatEvent::MaxFailures {
///         eprintln!("device unresponsive after {} probes", failures);
///     }
/// })));
/// runner.start()?;
///
/// {
///     // keep probes out of a multi-command sequence
///     let _quiet = runner.suspend();
///     let mut dev = device.lock().await;
///     // ... exclusive traffic on `dev` ...
/// #   let _ = &mut dev;
/// }
///
/// runner.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct HeartbeatRunner<D: Device + 'static> {
    device: Arc<tokio::sync::Mutex<D>>,
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl<D: Device + 'static> HeartbeatRunner<D> {
    /// Create an idle runner. A strategy must be set before [`start`](Self::start).
    pub fn new(device: Arc<tokio::sync::Mutex<D>>, config: HeartbeatConfig) -> Self {
        Self {
            device,
            shared: Arc::new(Shared::new(config)),
            task: None,
        }
    }

    pub fn with_strategy(self, strategy: Arc<dyn HeartbeatStrategy>) -> Self {
        self.set_strategy(strategy);
        self
    }

    pub fn device(&self) -> &Arc<tokio::sync::Mutex<D>> {
        &self.device
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawn the worker on the current tokio runtime.
    ///
    /// Fails with `invalid_state` when already running, when no strategy is
    /// set, or outside a runtime; with `invalid_argument` for a bad config.
    pub fn start(&mut self) -> VdlResult<()> {
        if self.is_running() {
            return Err(VdlError::invalid_state("Heartbeat already running"));
        }
        let strategy_name = {
            let inner = self.shared.lock();
            inner.config.validate()?;
            match &inner.strategy {
                Some(strategy) => strategy.name(),
                None => {
                    return Err(VdlError::invalid_state("No heartbeat strategy configured"));
                }
            }
        };
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| VdlError::invalid_state("Heartbeat requires a tokio runtime"))?;

        // a previous worker that died on its own is reaped here
        if let Some(old) = self.task.take() {
            old.abort();
        }

        self.shared.control.send_replace(RunState::Running);
        let receiver = self.shared.control.subscribe();
        self.task = Some(handle.spawn(run_loop(
            self.device.clone(),
            self.shared.clone(),
            receiver,
        )));

        info!("Heartbeat started with strategy: {}", strategy_name);
        Ok(())
    }

    /// Signal the worker to stop and wait for it to exit.
    ///
    /// Returns once any in-flight probe has finished. No-op when not running.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        self.shared.control.send_replace(RunState::Stopping);
        if let Err(e) = task.await {
            if e.is_panic() {
                warn!("Heartbeat task panicked");
            }
        }
        self.shared.control.send_replace(RunState::Idle);

        info!("Heartbeat stopped (strategy: {})", self.shared.strategy_name());
        self.shared.emit(HeartbeatEvent::Stopped, None);
    }

    /// Skip probes until [`resume`](Self::resume). No-op unless running.
    pub fn pause(&self) {
        self.shared.pause();
    }

    pub fn resume(&self) {
        self.shared.resume();
    }

    /// Pause for the lifetime of the returned guard.
    ///
    /// Only pauses when `pause_during_lock` is set and the runner is actively
    /// probing; the guard resumes exactly what it paused, so nesting is safe.
    pub fn suspend(&self) -> HeartbeatSuspend {
        let pause_during_lock = self.shared.lock().config.pause_during_lock;
        let paused = pause_during_lock && self.shared.pause();
        HeartbeatSuspend {
            shared: self.shared.clone(),
            paused,
        }
    }

    /// Worker alive and not stopping (paused counts as running).
    pub fn is_running(&self) -> bool {
        let alive = self.task.as_ref().is_some_and(|task| !task.is_finished());
        alive && matches!(self.shared.state(), RunState::Running | RunState::Paused)
    }

    pub fn is_paused(&self) -> bool {
        self.shared.state() == RunState::Paused
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Settings take effect from the next cycle.
    pub fn set_config(&self, config: HeartbeatConfig) {
        self.shared.lock().config = config;
    }

    pub fn config(&self) -> HeartbeatConfig {
        self.shared.lock().config.clone()
    }

    pub fn set_interval(&self, interval: Duration) {
        self.shared.lock().config.interval = interval;
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.shared.lock().config.timeout = timeout;
    }

    pub fn set_max_failures(&self, max_failures: u32) {
        self.shared.lock().config.max_failures = max_failures;
    }

    pub fn set_strategy(&self, strategy: Arc<dyn HeartbeatStrategy>) {
        self.shared.lock().strategy = Some(strategy);
    }

    pub fn strategy_name(&self) -> &'static str {
        self.shared.strategy_name()
    }

    pub fn set_callback(&self, callback: Option<HeartbeatCallback>) {
        self.shared.lock().callback = callback;
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Consecutive failures since the last success or reset.
    pub fn failure_count(&self) -> u32 {
        self.shared.failure_count.load(Ordering::Relaxed)
    }

    pub fn success_count(&self) -> u64 {
        self.shared.success_count.load(Ordering::Relaxed)
    }

    pub fn total_failures(&self) -> u64 {
        self.shared.total_failures.load(Ordering::Relaxed)
    }

    pub fn reset_failure_count(&self) {
        self.shared.failure_count.store(0, Ordering::Relaxed);
    }

    pub fn reset_counters(&self) {
        self.shared.failure_count.store(0, Ordering::Relaxed);
        self.shared.success_count.store(0, Ordering::Relaxed);
        self.shared.total_failures.store(0, Ordering::Relaxed);
    }

    pub fn last_error(&self) -> Option<VdlError> {
        self.shared.lock().last_error.clone()
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.shared.lock().last_success
    }

    pub fn last_failure(&self) -> Option<DateTime<Utc>> {
        self.shared.lock().last_failure
    }
}

impl<D: Device + 'static> Drop for HeartbeatRunner<D> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.shared.control.send_replace(RunState::Stopping);
            task.abort();
        }
    }
}

/// Guard returned by [`HeartbeatRunner::suspend`].
#[must_use = "the heartbeat resumes as soon as the guard is dropped"]
pub struct HeartbeatSuspend {
    shared: Arc<Shared>,
    paused: bool,
}

impl HeartbeatSuspend {
    /// True when this guard paused the heartbeat and will resume it.
    pub fn is_active(&self) -> bool {
        self.paused
    }
}

impl Drop for HeartbeatSuspend {
    fn drop(&mut self) {
        if self.paused {
            self.shared.resume();
        }
    }
}

enum Cycle {
    Passed,
    Failed(VdlError),
    Skipped,
}

async fn run_loop<D: Device>(
    device: Arc<tokio::sync::Mutex<D>>,
    shared: Arc<Shared>,
    mut control: watch::Receiver<RunState>,
) {
    loop {
        let state = match control.wait_for(|s| *s != RunState::Paused).await {
            Ok(state) => *state,
            Err(_) => break,
        };
        if state != RunState::Running {
            break;
        }

        let (config, strategy) = {
            let inner = shared.lock();
            (inner.config.clone(), inner.strategy.clone())
        };

        match run_cycle(&device, strategy.as_deref(), &config, &control).await {
            Cycle::Passed => shared.record_success(&config),
            Cycle::Failed(error) => shared.record_failure(&config, error),
            Cycle::Skipped => continue,
        }

        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            _ = control.wait_for(|s| *s == RunState::Stopping) => break,
        }
    }

    debug!("Heartbeat task exiting (strategy: {})", shared.strategy_name());
}

async fn run_cycle<D: Device>(
    device: &tokio::sync::Mutex<D>,
    strategy: Option<&dyn HeartbeatStrategy>,
    config: &HeartbeatConfig,
    control: &watch::Receiver<RunState>,
) -> Cycle {
    let Some(strategy) = strategy else {
        return Cycle::Failed(VdlError::invalid_state("No heartbeat strategy configured"));
    };

    let mut device = device.lock().await;

    // paused or stopped while waiting for the device
    let state = *control.borrow();
    if state != RunState::Running {
        return Cycle::Skipped;
    }

    if !device.is_connected() {
        return Cycle::Failed(VdlError::not_connected());
    }
    let command = match strategy.make_command() {
        Ok(command) => command,
        Err(e) => return Cycle::Failed(e),
    };

    match device.execute_with_timeout(&command, config.timeout).await {
        Ok(response) if strategy.validate_response(&response) => Cycle::Passed,
        Ok(response) => Cycle::Failed(VdlError::device_error(format!(
            "Heartbeat response validation failed (status={:?})",
            response.status()
        ))),
        Err(e) => Cycle::Failed(e),
    }
}

// ============================================================================
// Tests
// ============================================================================
