use crate::errors::{MeterError, Result};
use crate::meter::{CumulativeCounter, MeterConfig, MeterSnapshot, RollingWindow};
use derive_more::Display;
use fx_callback::{Callback, MultiThreadedCallback, Subscriber, Subscription};
use fx_handle::Handle;
use log::{debug, trace, warn};
use std::fmt::{Debug, Display, Formatter};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle as RuntimeHandle;
use tokio::select;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// The unique identifier of a meter.
pub type MeterHandle = Handle;

/// The callback which is invoked each time the lifecycle of a meter elapses.
pub type LifecycleCallback = Arc<dyn Fn(&Meter) + Send + Sync>;

/// The states of the meter clock.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum MeterState {
    /// The meter has been created, but the clock has not been started yet.
    #[display("created")]
    Created,
    /// The clock of the meter is advancing the rolling window.
    #[display("running")]
    Running,
    /// The clock of the meter has been stopped and will no longer advance the rolling window.
    #[display("stopped")]
    Stopped,
}

/// The events published by a meter to its subscribers.
#[derive(Debug, Display, Clone, PartialEq)]
pub enum MeterEvent {
    /// Invoked when the state of the meter clock has changed.
    #[display("meter state changed to {_0}")]
    StateChanged(MeterState),
    /// Invoked each time the lifecycle of the meter has elapsed.
    /// It contains the values of the meter at the moment the lifecycle ended.
    #[display("meter lifecycle elapsed, {_0}")]
    LifecycleElapsed(MeterSnapshot),
}

/// A concurrent event-rate meter.
///
/// The meter counts events through [Meter::incr] and derives the following rates from them:
/// * **rate** - the cumulative total of events, see [Meter::rate]
/// * **cps** - the events of the most recently completed second, see [Meter::cps]
/// * **cpm** - the events within the rolling window of 60 seconds, see [Meter::cpm]
/// * **max cpm** - the highest cpm that has been observed, see [Meter::max_cpm]
///
/// The rolling window is advanced by a clock which runs as a task on the tokio runtime.
/// The clock keeps running until the meter is stopped, or until all references to the meter have been dropped.
///
/// Each time the configured number of ticks has elapsed, the registered [LifecycleCallback] is invoked.
/// The callback is invoked outside any lock of the meter, which means it's allowed to call back into the meter.
#[derive(Debug, Clone)]
pub struct Meter {
    inner: Arc<InnerMeter>,
}

impl Meter {
    /// Create a new meter with the default configuration.
    /// The clock of the meter is started on the current tokio runtime.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a new meter builder.
    pub fn builder() -> MeterBuilder {
        MeterBuilder::builder()
    }

    /// Get the unique handle of this meter.
    pub fn handle(&self) -> MeterHandle {
        self.inner.handle
    }

    /// Get the configuration of this meter.
    pub fn config(&self) -> &MeterConfig {
        &self.inner.config
    }

    /// Get the current state of the meter clock.
    pub fn state(&self) -> MeterState {
        *self.inner.state()
    }

    /// Record the given amount of events.
    ///
    /// The delta is added to the cumulative total and to the open slot of the rolling window.
    /// The sign of the delta is not validated.
    pub fn incr(&self, delta: i64) {
        self.inner.counter.incr(delta);
        self.inner.window().window.add(delta);
    }

    /// Get the cumulative total of events since the creation of the meter, or since the last [Meter::reset].
    pub fn rate(&self) -> i64 {
        self.inner.counter.value()
    }

    /// Get the number of events within the rolling window.
    pub fn cpm(&self) -> i64 {
        self.inner.window().window.cpm()
    }

    /// Get the highest number of events that has been observed within the rolling window.
    pub fn max_cpm(&self) -> i64 {
        self.inner.window().window.max_cpm()
    }

    /// Get the number of events of the most recently completed second.
    ///
    /// This value lags behind on the live events, as the second that is currently in progress is never included.
    pub fn cps(&self) -> i64 {
        self.inner.cps.load(Ordering::SeqCst)
    }

    /// Reset the cumulative total of events back to zero.
    /// The rolling window is not affected by a reset.
    pub fn reset(&self) {
        self.inner.counter.reset();
    }

    /// Lower the max cpm back to the current cpm of the rolling window.
    pub fn reset_max_cpm(&self) {
        self.inner.window().window.reset_max_cpm();
    }

    /// Get an immutable snapshot of the current values of the meter.
    pub fn snapshot(&self) -> MeterSnapshot {
        let window = self.inner.window();
        MeterSnapshot {
            rate: self.inner.counter.value(),
            cps: self.inner.cps.load(Ordering::SeqCst),
            cpm: window.window.cpm(),
            max_cpm: window.window.max_cpm(),
        }
    }

    /// Register the callback that is invoked each time the lifecycle of the meter elapses.
    /// This replaces any previously registered callback.
    ///
    /// The callback should use the given [Meter] argument instead of capturing a clone of the meter,
    /// as a captured clone keeps the meter, and its clock, alive after all other references have been dropped.
    pub fn register_lifecycle_callback<F>(&self, callback: F)
    where
        F: Fn(&Meter) + Send + Sync + 'static,
    {
        *self.inner.lifecycle_callback() = Some(Arc::new(callback));
        trace!("Meter {} registered a new lifecycle callback", self.inner.handle);
    }

    /// Remove the registered lifecycle callback, if any.
    pub fn clear_lifecycle_callback(&self) {
        *self.inner.lifecycle_callback() = None;
        trace!("Meter {} cleared the lifecycle callback", self.inner.handle);
    }

    /// Start the clock of the meter.
    ///
    /// This is only required for meters which have been built without autostart.
    /// It returns an error when the meter has already been started or stopped.
    pub fn start(&self) -> Result<()> {
        let mut state = self.inner.state();
        if *state != MeterState::Created {
            return Err(MeterError::InvalidState(*state));
        }

        let runtime = self
            .inner
            .runtime
            .clone()
            .or_else(|| RuntimeHandle::try_current().ok())
            .ok_or(MeterError::RuntimeUnavailable)?;
        let period = self.inner.config.tick_interval;
        let start = {
            let _guard = runtime.enter();
            Instant::now() + period
        };

        let handle = self.inner.handle;
        let instance = Arc::downgrade(&self.inner);
        let cancellation_token = self.inner.cancellation_token.clone();
        runtime.spawn(async move {
            Self::run(handle, instance, cancellation_token, start, period).await;
        });

        *state = MeterState::Running;
        drop(state);

        debug!(
            "Meter {} clock has been started with interval {:?}",
            handle, period
        );
        self.inner
            .invoke_event(MeterEvent::StateChanged(MeterState::Running));
        Ok(())
    }

    /// Stop the clock of the meter.
    ///
    /// The meter keeps counting events after it has been stopped,
    /// but the rolling window will no longer be advanced.
    pub fn stop(&self) {
        let mut state = self.inner.state();
        if *state == MeterState::Stopped {
            return;
        }

        self.inner.cancellation_token.cancel();
        *state = MeterState::Stopped;
        drop(state);

        debug!("Meter {} clock has been stopped", self.inner.handle);
        self.inner
            .invoke_event(MeterEvent::StateChanged(MeterState::Stopped));
    }

    /// The main loop of the meter clock.
    /// The clock only holds a weak reference to the meter, so it doesn't keep the meter alive.
    async fn run(
        handle: MeterHandle,
        instance: Weak<InnerMeter>,
        cancellation_token: CancellationToken,
        start: Instant,
        period: Duration,
    ) {
        let mut ticker = time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            select! {
                _ = cancellation_token.cancelled() => break,
                _ = ticker.tick() => {
                    match instance.upgrade() {
                        Some(inner) => Self { inner }.tick(),
                        None => break,
                    }
                }
            }
        }

        trace!("Meter {} clock main loop ended", handle);
    }

    /// Advance the rolling window by one slot.
    fn tick(&self) {
        let snapshot = {
            let mut window = self.inner.window();
            let completed = window.window.advance();
            self.inner.cps.store(completed, Ordering::SeqCst);
            trace!(
                "Meter {} advanced to slot {}, cps {}, cpm {}",
                self.inner.handle,
                window.window.index(),
                completed,
                window.window.cpm()
            );

            window.ticks += 1;
            if window.ticks >= self.inner.config.lifecycle_ticks {
                window.ticks = 0;
                Some(MeterSnapshot {
                    rate: self.inner.counter.value(),
                    cps: completed,
                    cpm: window.window.cpm(),
                    max_cpm: window.window.max_cpm(),
                })
            } else {
                None
            }
        };

        if let Some(snapshot) = snapshot {
            debug!(
                "Meter {} lifecycle has elapsed, {}",
                self.inner.handle, snapshot
            );
            // copy the callback so the callback lock is released before invoking it
            let callback = self.inner.lifecycle_callback().clone();
            if let Some(callback) = callback {
                if panic::catch_unwind(AssertUnwindSafe(|| callback(self))).is_err() {
                    warn!(
                        "Meter {} lifecycle callback has panicked",
                        self.inner.handle
                    );
                }
            }

            self.inner
                .invoke_event(MeterEvent::LifecycleElapsed(snapshot));
        }
    }
}

impl Callback<MeterEvent> for Meter {
    fn subscribe(&self) -> Subscription<MeterEvent> {
        self.inner.callbacks.subscribe()
    }

    fn subscribe_with(&self, subscriber: Subscriber<MeterEvent>) {
        self.inner.callbacks.subscribe_with(subscriber)
    }
}

impl PartialEq for Meter {
    fn eq(&self, other: &Self) -> bool {
        self.inner.handle == other.inner.handle
    }
}

impl Display for Meter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner.counter)
    }
}

#[derive(Debug, Default)]
pub struct MeterBuilder {
    config: Option<MeterConfig>,
    runtime: Option<RuntimeHandle>,
    autostart: Option<bool>,
}

impl MeterBuilder {
    /// Create a new meter builder.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Set the configuration of the meter.
    pub fn config(&mut self, config: MeterConfig) -> &mut Self {
        self.config = Some(config);
        self
    }

    /// Set the runtime on which the clock of the meter should run.
    /// When not set, the runtime of the current context is used.
    pub fn runtime(&mut self, runtime: RuntimeHandle) -> &mut Self {
        self.runtime = Some(runtime);
        self
    }

    /// Set if the clock should be started when the meter is built.
    /// Defaults to `true`.
    pub fn autostart(&mut self, autostart: bool) -> &mut Self {
        self.autostart = Some(autostart);
        self
    }

    /// Build the meter.
    ///
    /// It returns an error when the configuration is invalid,
    /// or when the clock should be started while no runtime is available.
    pub fn build(&mut self) -> Result<Meter> {
        let config = self.config.take().unwrap_or_default();
        config.validate()?;

        let autostart = self.autostart.take().unwrap_or(true);
        let runtime = self
            .runtime
            .take()
            .or_else(|| RuntimeHandle::try_current().ok());
        if autostart && runtime.is_none() {
            return Err(MeterError::RuntimeUnavailable);
        }

        let meter = {
            let _guard = runtime.as_ref().map(|e| e.enter());
            Meter {
                inner: Arc::new(InnerMeter {
                    handle: MeterHandle::new(),
                    config,
                    counter: CumulativeCounter::new(),
                    window: Default::default(),
                    cps: Default::default(),
                    lifecycle_callback: Default::default(),
                    state: Mutex::new(MeterState::Created),
                    runtime,
                    callbacks: MultiThreadedCallback::new(),
                    cancellation_token: Default::default(),
                }),
            }
        };

        if autostart {
            meter.start()?;
        }

        Ok(meter)
    }
}

/// The window state of a meter, guarded by a single lock.
#[derive(Debug, Default)]
struct MeterWindow {
    window: RollingWindow,
    /// The number of ticks since the last time the lifecycle elapsed.
    ticks: u32,
}

struct InnerMeter {
    handle: MeterHandle,
    config: MeterConfig,
    counter: CumulativeCounter,
    window: Mutex<MeterWindow>,
    /// The events of the most recently completed second.
    cps: AtomicI64,
    lifecycle_callback: Mutex<Option<LifecycleCallback>>,
    state: Mutex<MeterState>,
    /// The runtime of the meter clock, if known at the time the meter was built.
    runtime: Option<RuntimeHandle>,
    callbacks: MultiThreadedCallback<MeterEvent>,
    cancellation_token: CancellationToken,
}

impl InnerMeter {
    fn window(&self) -> MutexGuard<'_, MeterWindow> {
        self.window.lock().unwrap_or_else(|e| {
            warn!("Meter {} window lock has been poisoned", self.handle);
            e.into_inner()
        })
    }

    fn state(&self) -> MutexGuard<'_, MeterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lifecycle_callback(&self) -> MutexGuard<'_, Option<LifecycleCallback>> {
        self.lifecycle_callback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn invoke_event(&self, event: MeterEvent) {
        let _guard = self.runtime.as_ref().map(|e| e.enter());
        self.callbacks.invoke(event);
    }
}

impl Debug for InnerMeter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InnerMeter")
            .field("handle", &self.handle)
            .field("config", &self.config)
            .field("counter", &self.counter)
            .field("cps", &self.cps)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for InnerMeter {
    fn drop(&mut self) {
        trace!("Meter {} is being dropped", self.handle);
        self.cancellation_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert_timeout_eq, init_logger, recv_timeout};
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use tokio::sync::mpsc::unbounded_channel;

    /// Wait for the given number of clock ticks of the default tick interval.
    async fn wait_ticks(ticks: u64) {
        time::sleep(Duration::from_secs(ticks)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_new() {
        init_logger!();
        let meter = Meter::new().unwrap();

        assert_eq!(MeterState::Running, meter.state());
        assert_eq!(&MeterConfig::default(), meter.config());
        assert_eq!(0, meter.rate());
        assert_eq!(0, meter.cps());
        assert_eq!(0, meter.cpm());
        assert_eq!(0, meter.max_cpm());
    }

    #[test]
    fn test_new_without_runtime() {
        let result = Meter::new();

        assert_eq!(Err(MeterError::RuntimeUnavailable), result.map(|_| ()));
    }

    #[test]
    fn test_builder_invalid_config() {
        let result = Meter::builder()
            .config(MeterConfig::builder().tick_interval(Duration::ZERO).build())
            .autostart(false)
            .build();

        assert!(
            matches!(result, Err(MeterError::InvalidConfig(_))),
            "expected the config to be rejected"
        );
    }

    #[test]
    fn test_builder_runtime() {
        init_logger!();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();

        let meter = Meter::builder()
            .runtime(runtime.handle().clone())
            .build()
            .unwrap();

        assert_eq!(MeterState::Running, meter.state());
        meter.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr() {
        init_logger!();
        let meter = Meter::new().unwrap();

        meter.incr(5);

        assert_eq!(5, meter.rate(), "expected the cumulative total to be updated");
        assert_eq!(5, meter.cpm(), "expected the window to be updated");
        assert_eq!(5, meter.max_cpm());
        assert_eq!(0, meter.cps(), "expected the cps to only update on a tick");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cps_after_tick() {
        init_logger!();
        let meter = Meter::new().unwrap();

        for _ in 0..10 {
            meter.incr(1);
        }
        assert_eq!(10, meter.rate());
        assert_eq!(10, meter.cpm());
        assert_eq!(0, meter.cps());

        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(10, meter.cps(), "expected the completed second to be the cps");
        assert_eq!(10, meter.cpm(), "expected the completed second to remain in the window");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cps_only_contains_last_second() {
        init_logger!();
        let meter = Meter::new().unwrap();

        meter.incr(3);
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(3, meter.cps());

        meter.incr(2);
        time::sleep(Duration::from_secs(1)).await;

        assert_eq!(2, meter.cps(), "expected only the last completed second");
        assert_eq!(5, meter.cpm(), "expected both seconds within the window");
        assert_eq!(5, meter.rate());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_meter() {
        init_logger!();
        let meter = Meter::new().unwrap();

        meter.incr(10);
        wait_ticks(61).await;
        time::sleep(Duration::from_millis(500)).await;

        assert_eq!(0, meter.cpm(), "expected the events to have left the window");
        assert_eq!(0, meter.cps());
        assert_eq!(10, meter.rate(), "expected the total to be unchanged");
        assert_eq!(10, meter.max_cpm(), "expected the max cpm to be unchanged");
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_cpm_is_non_decreasing() {
        init_logger!();
        let meter = Meter::new().unwrap();
        let mut last_max_cpm = 0;

        for second in 0..90 {
            meter.incr(second % 7);
            let snapshot = meter.snapshot();
            assert!(
                snapshot.max_cpm >= last_max_cpm,
                "expected the max cpm to never decrease"
            );
            assert!(snapshot.max_cpm >= snapshot.cpm);
            last_max_cpm = snapshot.max_cpm;

            time::sleep(Duration::from_secs(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_callback() {
        init_logger!();
        let start = Instant::now();
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let meter = Meter::new().unwrap();

        let callback_invocations = invocations.clone();
        meter.register_lifecycle_callback(move |_| {
            callback_invocations.lock().unwrap().push(Instant::now());
        });

        for _ in 0..65 {
            wait_ticks(1).await;
            assert_eq!(0, meter.cpm());
            assert_eq!(0, meter.max_cpm());
        }

        let invocations = invocations.lock().unwrap();
        assert_eq!(
            1,
            invocations.len(),
            "expected the callback to have been invoked once"
        );
        assert_eq!(
            60,
            invocations[0].duration_since(start).as_secs(),
            "expected the callback to have been invoked at tick 60"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_callback_replaced() {
        init_logger!();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let meter = Meter::builder()
            .config(MeterConfig::builder().lifecycle_ticks(2).build())
            .build()
            .unwrap();

        let first_invocations = first.clone();
        meter.register_lifecycle_callback(move |_| {
            first_invocations.fetch_add(1, Ordering::SeqCst);
        });
        let second_invocations = second.clone();
        meter.register_lifecycle_callback(move |_| {
            second_invocations.fetch_add(1, Ordering::SeqCst);
        });
        wait_ticks(2).await;
        time::sleep(Duration::from_millis(500)).await;

        assert_eq!(0, first.load(Ordering::SeqCst));
        assert_eq!(1, second.load(Ordering::SeqCst));

        meter.clear_lifecycle_callback();
        wait_ticks(2).await;
        assert_eq!(
            1,
            second.load(Ordering::SeqCst),
            "expected the callback to no longer be invoked"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_callback_reentrant() {
        init_logger!();
        let invocations = Arc::new(AtomicUsize::new(0));
        let meter = Meter::builder()
            .config(MeterConfig::builder().lifecycle_ticks(2).build())
            .build()
            .unwrap();

        let callback_invocations = invocations.clone();
        meter.register_lifecycle_callback(move |meter| {
            meter.incr(1);
            let _ = meter.cpm();
            meter.reset_max_cpm();
            callback_invocations.fetch_add(1, Ordering::SeqCst);
        });
        wait_ticks(6).await;
        time::sleep(Duration::from_millis(500)).await;

        assert_eq!(3, invocations.load(Ordering::SeqCst));
        assert_eq!(3, meter.rate());
        assert_eq!(3, meter.cpm());

        // the event of the last callback is only completed on the next tick
        wait_ticks(1).await;
        assert_eq!(1, meter.cps(), "expected the clock to keep advancing");
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_callback_panic() {
        init_logger!();
        let meter = Meter::builder()
            .config(MeterConfig::builder().lifecycle_ticks(1).build())
            .build()
            .unwrap();
        meter.register_lifecycle_callback(|_| panic!("lifecycle failure"));

        meter.incr(4);
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(4, meter.cps());

        meter.clear_lifecycle_callback();
        meter.incr(7);
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            7,
            meter.cps(),
            "expected the clock to keep advancing after a panicking callback"
        );
        assert_eq!(MeterState::Running, meter.state());

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(0, meter.cps());
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_overflow() {
        init_logger!();
        let meter = Meter::new().unwrap();

        meter.incr(i64::MAX);
        meter.incr(1);

        assert_eq!(i64::MIN, meter.rate());
        assert_eq!(
            meter.rate(),
            meter.cpm(),
            "expected the window to wrap the same way as the counter"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        init_logger!();
        let meter = Meter::new().unwrap();

        meter.incr(8);
        meter.reset();
        meter.incr(2);

        assert_eq!(2, meter.rate());
        assert_eq!(10, meter.cpm(), "expected the window to be unaffected");
        assert_eq!("2", meter.to_string());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_max_cpm() {
        init_logger!();
        let meter = Meter::new().unwrap();

        meter.incr(20);
        wait_ticks(60).await;
        time::sleep(Duration::from_millis(500)).await;
        meter.incr(4);
        assert_eq!(20, meter.max_cpm());

        meter.reset_max_cpm();

        assert_eq!(4, meter.max_cpm());
        assert_eq!(4, meter.cpm());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop() {
        init_logger!();
        let meter = Meter::new().unwrap();

        meter.incr(4);
        meter.stop();
        wait_ticks(3).await;

        assert_eq!(MeterState::Stopped, meter.state());
        assert_eq!(0, meter.cps(), "expected the window to no longer advance");

        meter.incr(1);
        assert_eq!(5, meter.rate());
        assert_eq!(5, meter.cpm());
        assert_eq!(
            Err(MeterError::InvalidState(MeterState::Stopped)),
            meter.start()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start() {
        init_logger!();
        let meter = Meter::builder().autostart(false).build().unwrap();
        assert_eq!(MeterState::Created, meter.state());

        meter.incr(6);
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(0, meter.cps(), "expected the clock to not be running");

        meter.start().unwrap();
        assert_eq!(MeterState::Running, meter.state());
        assert_timeout_eq!(Duration::from_secs(2), 6, meter.cps());

        assert_eq!(
            Err(MeterError::InvalidState(MeterState::Running)),
            meter.start()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe() {
        init_logger!();
        let (tx, mut rx) = unbounded_channel();
        let meter = Meter::builder()
            .config(MeterConfig::builder().lifecycle_ticks(1).build())
            .autostart(false)
            .build()
            .unwrap();

        let mut receiver = meter.subscribe();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                tx.send((*event).clone()).unwrap();
            }
        });

        meter.start().unwrap();
        let result = recv_timeout!(&mut rx, Duration::from_millis(200));
        assert_eq!(MeterEvent::StateChanged(MeterState::Running), result);

        meter.incr(3);
        let result = recv_timeout!(
            &mut rx,
            Duration::from_secs(2),
            "expected to receive a lifecycle event"
        );
        assert_eq!(
            MeterEvent::LifecycleElapsed(MeterSnapshot {
                rate: 3,
                cps: 3,
                cpm: 3,
                max_cpm: 3,
            }),
            result
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop() {
        init_logger!();
        let meter = Meter::new().unwrap();
        let instance = Arc::downgrade(&meter.inner);
        let cancellation_token = meter.inner.cancellation_token.clone();

        let clone = meter.clone();
        drop(meter);
        assert!(
            !cancellation_token.is_cancelled(),
            "expected the clock to keep running while a reference exists"
        );

        drop(clone);
        assert!(instance.upgrade().is_none(), "expected the meter to be dropped");
        assert!(cancellation_token.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_incr() {
        init_logger!();
        let meter = Meter::new().unwrap();
        let threads = 8;
        let events_per_thread = 5_000;

        thread::scope(|scope| {
            for _ in 0..threads {
                let meter = meter.clone();
                scope.spawn(move || {
                    for _ in 0..events_per_thread {
                        meter.incr(1);
                    }
                });
            }

            let total = threads * events_per_thread;
            for _ in 0..100 {
                assert!(meter.rate() <= total);
                thread::yield_now();
            }
        });

        assert_eq!(
            threads * events_per_thread,
            meter.rate(),
            "expected no lost updates"
        );
    }
}
