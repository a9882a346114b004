//! Single-threaded cooperative scheduler.
//!
//! [`start`] installs a runtime on the current thread, runs the given closure, then keeps running scheduled work until nothing is left.
//! Work is a FIFO queue of ticks: driver steps, gate continuations and due timer callbacks.
//! Exactly one tick runs at a time and a tick never preempts another.
//!
//! Whatever releases a gate only schedules the continuation, it never runs it inline.
//! Long rendezvous chains therefore don't grow the call stack,
//! and every operation returns before its downstream effects run.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

mod timer;
mod tls;

pub(crate) use timer::TimerHandle;

/// A unit of scheduled work.
pub(crate) type Task = Box<dyn FnOnce() -> crate::Result<()>>;

/// Runs `f` on a fresh runtime with the default [`Config`], then runs scheduled work until the runtime is quiescent.
///
/// Quiescent means no ready ticks and no pending timers.
/// Drivers still suspended at that point can never be woken, they're dropped along with the runtime.
///
/// # Panics
/// If a runtime is already running on this thread.
///
/// # Examples
/// ```
/// let output = aryn::runtime::start(|| 123).unwrap();
/// assert_eq!(output, 123);
/// ```
pub fn start<F: FnOnce() -> T, T>(f: F) -> crate::Result<T> {
    start_with(Config::default(), f)
}

/// Same as [`start`] with an explicit [`Config`].
pub fn start_with<F: FnOnce() -> T, T>(config: Config, f: F) -> crate::Result<T> {
    tls::exclusive_runtime(RuntimeState::new(config), || {
        let output = f();
        run_until_quiescent()?;
        Ok(output)
    })
}

fn run_until_quiescent() -> crate::Result<()> {
    loop {
        let batch = tls::runtime(|runtime| {
            let RuntimeState { ready, timers, .. } = runtime;
            timers.fire_due(Instant::now(), ready);
            ready.len()
        });

        if batch == 0 {
            match tls::runtime(|runtime| runtime.timers.next_deadline()) {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline > now {
                        log::trace!("idle for {:?}", deadline - now);
                        thread::sleep(deadline - now);
                    }
                    continue;
                }
                None => break Ok(()),
            }
        }

        // Ticks scheduled during this batch wait for the next pass, after due timers
        for _ in 0..batch {
            let Some(task) = tls::runtime(|runtime| runtime.ready.pop_front()) else {
                break;
            };
            task()?;
        }
    }
}

pub(super) struct RuntimeState {
    config: Config,
    ready: VecDeque<Task>,
    timers: timer::Timers,
    drivers: slab::Slab<Rc<dyn Any>>,
}

impl RuntimeState {
    fn new(config: Config) -> Self {
        RuntimeState {
            config,
            ready: VecDeque::with_capacity(1024),
            timers: timer::Timers::default(),
            drivers: slab::Slab::new(),
        }
    }
}

/// Runtime configuration.
///
/// ```
/// use aryn::runtime::Config;
///
/// let config = Config {
///     waiter_limit: Some(64),
///     ..Config::default()
/// };
/// # let _ = config;
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether drivers propagate routine failures instead of handing them to their failure handler.
    ///
    /// Propagated failures stop the runtime, [`start`] returns them as [`crate::Error::Failed`].
    /// Individual drivers may override this with [`crate::Driver::set_debug`].
    /// Defaults to on in debug builds.
    pub debug: bool,

    /// Maximum number of gates queued on either side of a single channel.
    ///
    /// Rendezvous channels and broadcast channels have no natural bound on their waiter queues.
    /// Operations that would exceed the limit fail with [`crate::Error::TooManyWaiters`].
    /// Unlimited by default.
    pub waiter_limit: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debug: cfg!(debug_assertions),
            waiter_limit: None,
        }
    }
}

/// Identity of a gate, driver or channel.
///
/// Unique among everything created by this process.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u64);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Used to generate unique identifiers in this process.
static ID_GENERATOR: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_id() -> Id {
    Id(ID_GENERATOR.fetch_add(1, Ordering::Relaxed))
}

/// Schedules `task` to run on a later tick.
///
/// # Panics
/// If called outside of [`start`].
pub(crate) fn defer(task: impl FnOnce() -> crate::Result<()> + 'static) {
    tls::runtime(|runtime| runtime.ready.push_back(Box::new(task)));
}

/// Schedules `task` to run on a tick at least `delay` from now.
///
/// # Panics
/// If called outside of [`start`].
pub(crate) fn schedule_timer(
    delay: Duration,
    task: impl FnOnce() -> crate::Result<()> + 'static,
) -> TimerHandle {
    let deadline = Instant::now() + delay;
    let handle = tls::runtime(|runtime| runtime.timers.insert(deadline, Box::new(task)));
    log::trace!("timer scheduled in {delay:?}");
    handle
}

/// Stops a pending timer, doesn't affect timers that already fired.
pub(crate) fn cancel_timer(handle: TimerHandle) {
    let cancelled = tls::try_runtime(|runtime| runtime.timers.remove(handle)).unwrap_or(false);
    if cancelled {
        log::trace!("timer cancelled");
    }
}

/// Keeps a started driver alive until it reaches a terminal state.
pub(crate) fn register(driver: Rc<dyn Any>) -> usize {
    tls::runtime(|runtime| runtime.drivers.insert(driver))
}

pub(crate) fn deregister(slot: usize) {
    // dropped outside of the borrow, the driver may be the last owner of channels and gates
    let driver = tls::try_runtime(|runtime| runtime.drivers.try_remove(slot)).flatten();
    drop(driver);
}

/// The configured [`Config::waiter_limit`], unlimited outside of a runtime.
pub(crate) fn waiter_limit() -> Option<usize> {
    tls::try_runtime(|runtime| runtime.config.waiter_limit).flatten()
}

/// The configured [`Config::debug`].
///
/// # Panics
/// If called outside of [`start`].
pub(crate) fn debug() -> bool {
    tls::runtime(|runtime| runtime.config.debug)
}

/// Number of started drivers that haven't completed or failed yet.
///
/// # Panics
/// If called outside of [`start`].
pub fn live_drivers() -> usize {
    tls::runtime(|runtime| runtime.drivers.len())
}

/// Number of timers that haven't fired or been cancelled yet.
///
/// # Panics
/// If called outside of [`start`].
pub fn pending_timers() -> usize {
    tls::runtime(|runtime| runtime.timers.len())
}
