use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::validate_interval;
use crate::error::{SweepFault, TtlError};

/// Stand-in deadline for intervals too large to add to the clock (~100 years)
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Callback invoked on every tick. Returns the number of entries removed.
pub type SweepFn = Arc<dyn Fn() -> Result<usize, SweepFault> + Send + Sync>;

/// Point-in-time counters for a scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Sweeps that completed without a fault
    pub sweeps: u64,
    /// Sweeps that returned an error or panicked
    pub faults: u64,
    /// Total entries reported removed by completed sweeps
    pub removed: u64,
}

#[derive(Default)]
struct StatsInner {
    sweeps: AtomicU64,
    faults: AtomicU64,
    removed: AtomicU64,
}

impl StatsInner {
    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
        }
    }
}

/// Handle to a running sweep thread
struct Worker {
    /// Sender to signal shutdown to the sweep loop
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Periodic sweep engine owning one background thread.
///
/// The thread drives a single-threaded Tokio runtime whose only job is the
/// tick loop, so callers never need a runtime of their own. The sweep runs
/// inline on that loop: a sweep that overruns the interval makes the missed
/// ticks get skipped instead of stacking up. Intervals too large to add to
/// the clock (up to `Duration::MAX`) mean "practically never".
///
/// The scheduler knows nothing about what the callback does. Exclusion
/// against foreground mutation is the callback's job (the containers take
/// their store lock inside it).
///
/// # Example
///
/// ```rust
/// use lifespan_core::ExpiryScheduler;
/// use std::time::Duration;
///
/// let scheduler = ExpiryScheduler::new("demo", Duration::from_millis(10), || Ok(0)).unwrap();
/// scheduler.start().unwrap();
/// assert!(scheduler.is_running());
/// scheduler.stop();
/// assert!(!scheduler.is_running());
/// ```
pub struct ExpiryScheduler {
    name: String,
    sweep: SweepFn,
    /// Current interval; each worker subscribes to pick up changes
    interval_tx: watch::Sender<Duration>,
    worker: Mutex<Option<Worker>>,
    stats: Arc<StatsInner>,
}

impl ExpiryScheduler {
    /// Creates a stopped scheduler.
    ///
    /// Fails with [`TtlError::Configuration`] if `interval` is zero.
    pub fn new<F>(name: impl Into<String>, interval: Duration, sweep: F) -> Result<Self, TtlError>
    where
        F: Fn() -> Result<usize, SweepFault> + Send + Sync + 'static,
    {
        validate_interval(interval)?;
        let (interval_tx, _) = watch::channel(interval);

        Ok(Self {
            name: name.into(),
            sweep: Arc::new(sweep),
            interval_tx,
            worker: Mutex::new(None),
            stats: Arc::new(StatsInner::default()),
        })
    }

    /// Starts periodic sweeping. Does nothing if already running.
    ///
    /// The first sweep fires one interval after this call.
    pub fn start(&self) -> Result<(), TtlError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let interval_rx = self.interval_tx.subscribe();

        let name = self.name.clone();
        let sweep = Arc::clone(&self.sweep);
        let stats = Arc::clone(&self.stats);

        let handle = thread::Builder::new()
            .name(format!("{}-sweep", self.name))
            .spawn(move || sweep_loop(runtime, name, sweep, stats, interval_rx, shutdown_rx))?;

        info!(
            scheduler = %self.name,
            interval_ms = self.interval().as_millis() as u64,
            "sweep scheduler started"
        );
        *worker = Some(Worker { shutdown_tx, handle });
        Ok(())
    }

    /// Stops periodic sweeping and waits for the thread to exit.
    ///
    /// Once this returns, the callback will not be invoked again until the
    /// next [`start`](Self::start). Does nothing if already stopped.
    ///
    /// Called from inside the sweep callback, this only signals shutdown;
    /// the loop exits as soon as the callback returns.
    pub fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        let _ = worker.shutdown_tx.send(true);

        if worker.handle.thread().id() == thread::current().id() {
            debug!(scheduler = %self.name, "stop requested from sweep thread");
            return;
        }

        if worker.handle.join().is_err() {
            error!(scheduler = %self.name, "sweep thread terminated abnormally");
        }
        info!(scheduler = %self.name, "sweep scheduler stopped");
    }

    /// Returns `true` between [`start`](Self::start) and [`stop`](Self::stop)
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Returns the current sweep interval
    pub fn interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }

    /// Changes the sweep interval.
    ///
    /// Accepted whether running or stopped. A running loop keeps the tick it
    /// already scheduled unless one new interval from now comes sooner; the
    /// new period applies to every tick after that. Setting the current
    /// value again changes nothing.
    pub fn set_interval(&self, interval: Duration) -> Result<(), TtlError> {
        validate_interval(interval)?;
        self.interval_tx.send_replace(interval);
        debug!(
            scheduler = %self.name,
            interval_ms = interval.as_millis() as u64,
            "sweep interval changed"
        );
        Ok(())
    }

    /// Returns a snapshot of the sweep counters
    pub fn stats(&self) -> SchedulerStats {
        self.stats.snapshot()
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ExpiryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryScheduler")
            .field("name", &self.name)
            .field("interval", &self.interval())
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

fn sweep_loop(
    runtime: Runtime,
    name: String,
    sweep: SweepFn,
    stats: Arc<StatsInner>,
    mut interval_rx: watch::Receiver<Duration>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    runtime.block_on(async move {
        let mut period = *interval_rx.borrow_and_update();
        let next_tick = tokio::time::sleep_until(deadline_after(Instant::now(), period));
        tokio::pin!(next_tick);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    break;
                }
                changed = interval_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let requested = *interval_rx.borrow_and_update();
                    if requested != period {
                        period = requested;
                        // The pending tick may move earlier, never later
                        let sooner = deadline_after(Instant::now(), period);
                        if sooner < next_tick.deadline() {
                            next_tick.as_mut().reset(sooner);
                        }
                    }
                }
                _ = &mut next_tick => {
                    run_sweep(&name, &sweep, &stats);

                    let now = Instant::now();
                    let mut deadline = deadline_after(next_tick.deadline(), period);
                    if deadline <= now {
                        // Overran: drop the missed ticks
                        deadline = deadline_after(now, period);
                    }
                    next_tick.as_mut().reset(deadline);
                }
            }
        }
    });
}

/// `from + period`, clamped to a far-future instant instead of overflowing
fn deadline_after(from: Instant, period: Duration) -> Instant {
    from.checked_add(period).unwrap_or_else(|| from + FAR_FUTURE)
}

fn run_sweep(name: &str, sweep: &SweepFn, stats: &StatsInner) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| (**sweep)()))
        .unwrap_or_else(|payload| Err(SweepFault::Panicked(panic_message(payload.as_ref()))));

    match outcome {
        Ok(removed) => {
            stats.sweeps.fetch_add(1, Ordering::Relaxed);
            stats.removed.fetch_add(removed as u64, Ordering::Relaxed);
            if removed > 0 {
                debug!(scheduler = %name, removed, "swept expired entries");
            }
        }
        Err(fault) => {
            stats.faults.fetch_add(1, Ordering::Relaxed);
            error!(scheduler = %name, %fault, "sweep fault");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::{OnceLock, Weak};

    fn counting_scheduler(interval: Duration) -> (ExpiryScheduler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let ticks = Arc::clone(&count);
        let scheduler = ExpiryScheduler::new("test", interval, move || {
            ticks.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        })
        .unwrap();
        (scheduler, count)
    }

    #[test]
    fn test_new_scheduler_is_stopped() {
        let (scheduler, count) = counting_scheduler(Duration::from_millis(10));
        assert!(!scheduler.is_running());

        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = ExpiryScheduler::new("test", Duration::ZERO, || Ok(0));
        assert!(matches!(result, Err(TtlError::Configuration(_))));

        let (scheduler, _) = counting_scheduler(Duration::from_millis(10));
        assert!(scheduler.set_interval(Duration::ZERO).is_err());
        assert_eq!(scheduler.interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_ticks_fire_periodically() {
        let (scheduler, count) = counting_scheduler(Duration::from_millis(20));
        scheduler.start().unwrap();

        thread::sleep(Duration::from_millis(250));
        scheduler.stop();

        assert!(count.load(Ordering::SeqCst) >= 3);
        assert_eq!(scheduler.stats().sweeps as usize, count.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_halts_callbacks() {
        let (scheduler, count) = counting_scheduler(Duration::from_millis(10));
        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(60));

        scheduler.stop();
        let after_stop = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(60));

        assert_eq!(count.load(Ordering::SeqCst), after_stop);
        assert!(!scheduler.is_running());

        // Second stop is a no-op
        scheduler.stop();
    }

    #[test]
    fn test_start_is_idempotent() {
        let (scheduler, count) = counting_scheduler(Duration::from_millis(50));
        scheduler.start().unwrap();
        scheduler.start().unwrap();
        scheduler.start().unwrap();

        thread::sleep(Duration::from_millis(240));
        scheduler.stop();

        // One timer fires at most 4 times in 240ms; three would fire ~12
        assert!(count.load(Ordering::SeqCst) <= 5);
    }

    #[test]
    fn test_restart_after_stop() {
        let (scheduler, count) = counting_scheduler(Duration::from_millis(10));
        scheduler.start().unwrap();
        scheduler.stop();
        let before = count.load(Ordering::SeqCst);

        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(80));
        scheduler.stop();

        assert!(count.load(Ordering::SeqCst) > before);
    }

    #[test]
    fn test_interval_change_while_stopped_applies_on_start() {
        let (scheduler, count) = counting_scheduler(Duration::from_secs(60));
        scheduler.set_interval(Duration::from_millis(15)).unwrap();
        assert_eq!(scheduler.interval(), Duration::from_millis(15));

        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(150));
        scheduler.stop();

        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_interval_change_while_running() {
        let (scheduler, count) = counting_scheduler(Duration::from_secs(60));
        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        scheduler.set_interval(Duration::from_millis(15)).unwrap();
        thread::sleep(Duration::from_millis(150));
        scheduler.stop();

        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_repeated_interval_changes_keep_ticking() {
        let (scheduler, count) = counting_scheduler(Duration::from_millis(50));
        scheduler.start().unwrap();

        // Re-sending the same value, then flapping between two values, must
        // never push the pending tick back
        for _ in 0..15 {
            scheduler.set_interval(Duration::from_millis(50)).unwrap();
            thread::sleep(Duration::from_millis(20));
        }
        let after_same = count.load(Ordering::SeqCst);
        assert!(after_same >= 3, "only {} sweeps while re-setting", after_same);

        for i in 0..15 {
            let period = if i % 2 == 0 { 40 } else { 50 };
            scheduler.set_interval(Duration::from_millis(period)).unwrap();
            thread::sleep(Duration::from_millis(20));
        }
        scheduler.stop();

        assert!(count.load(Ordering::SeqCst) >= after_same + 3);
    }

    #[test]
    fn test_huge_interval_does_not_kill_thread() {
        let (scheduler, count) = counting_scheduler(Duration::MAX);
        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        scheduler.set_interval(Duration::MAX).unwrap();
        scheduler.set_interval(Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(150));

        assert!(scheduler.is_running());
        assert!(count.load(Ordering::SeqCst) >= 2);

        scheduler.stop();
        assert_eq!(scheduler.stats().faults, 0);
    }

    #[test]
    fn test_deadline_after_clamps_overflow() {
        let now = Instant::now();
        assert_eq!(deadline_after(now, Duration::from_millis(5)), now + Duration::from_millis(5));
        assert_eq!(deadline_after(now, Duration::MAX), now + FAR_FUTURE);
    }

    #[test]
    fn test_stop_waits_for_in_flight_sweep() {
        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let (started_cb, finished_cb) = (Arc::clone(&started), Arc::clone(&finished));

        let scheduler = ExpiryScheduler::new("slow-stop", Duration::from_millis(10), move || {
            started_cb.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(100));
            finished_cb.store(true, Ordering::SeqCst);
            Ok(0)
        })
        .unwrap();
        scheduler.start().unwrap();

        for _ in 0..1000 {
            if started.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert!(started.load(Ordering::SeqCst));
        assert!(!finished.load(Ordering::SeqCst));

        scheduler.stop();

        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(scheduler.stats().sweeps, 1);
    }

    #[test]
    fn test_panicking_sweep_does_not_stop_ticks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let scheduler = ExpiryScheduler::new("panicky", Duration::from_millis(15), move || {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first sweep blows up");
            }
            Ok(1)
        })
        .unwrap();

        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(200));
        scheduler.stop();

        let stats = scheduler.stats();
        assert_eq!(stats.faults, 1);
        assert!(stats.sweeps >= 2);
        assert_eq!(stats.removed, stats.sweeps);
    }

    #[test]
    fn test_failed_sweep_counted_as_fault() {
        let scheduler = ExpiryScheduler::new("failing", Duration::from_millis(15), || {
            Err(SweepFault::Failed("store unavailable".into()))
        })
        .unwrap();

        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(100));
        scheduler.stop();

        let stats = scheduler.stats();
        assert!(stats.faults >= 2);
        assert_eq!(stats.sweeps, 0);
    }

    #[test]
    fn test_slow_sweeps_never_overlap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let overlapped = Arc::new(AtomicBool::new(false));
        let (flight, overlap) = (Arc::clone(&in_flight), Arc::clone(&overlapped));

        let scheduler = ExpiryScheduler::new("slow", Duration::from_millis(5), move || {
            if flight.fetch_add(1, Ordering::SeqCst) > 0 {
                overlap.store(true, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(40));
            flight.fetch_sub(1, Ordering::SeqCst);
            Ok(0)
        })
        .unwrap();

        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(200));
        scheduler.stop();

        assert!(!overlapped.load(Ordering::SeqCst));
        // 40ms sweeps in 200ms leave room for at most ~5, not the 40 ticks requested
        assert!(scheduler.stats().sweeps <= 6);
    }

    #[test]
    fn test_stop_from_inside_sweep() {
        let slot: Arc<OnceLock<Weak<ExpiryScheduler>>> = Arc::new(OnceLock::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let (slot_cb, calls_cb) = (Arc::clone(&slot), Arc::clone(&calls));

        let scheduler = Arc::new(
            ExpiryScheduler::new("self-stop", Duration::from_millis(10), move || {
                calls_cb.fetch_add(1, Ordering::SeqCst);
                if let Some(me) = slot_cb.get().and_then(Weak::upgrade) {
                    me.stop();
                }
                Ok(0)
            })
            .unwrap(),
        );
        slot.set(Arc::downgrade(&scheduler)).unwrap();

        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(100));

        assert!(!scheduler.is_running());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_stops_thread() {
        let (scheduler, count) = counting_scheduler(Duration::from_millis(10));
        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(40));
        drop(scheduler);

        let after_drop = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), after_drop);
    }
}
