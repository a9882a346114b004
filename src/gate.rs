//! One-shot release gate, the unit of suspension.
//!
//! A [`Gate`] is created by whoever may later release it: a channel operation that can't complete yet, a timer, or external code.
//! A routine suspends by yielding the gate to its driver, which binds itself as the gate's only resumer.
//! Releasing the gate schedules the resumer on the next tick with the released [`Wake`] value.
//!
//! # Examples
//!
//! ### External release
//! ```
//! use aryn::{runtime, Gate, Wake};
//!
//! runtime::start(|| {
//!     let gate = Gate::new();
//!     gate.bind(|wake| {
//!         assert_eq!(wake, Wake::Value(1));
//!         Ok(())
//!     })
//!     .unwrap();
//!
//!     gate.release(Wake::Value(1));
//!     gate.release(Wake::Value(2)); // no effect
//! })
//! .unwrap();
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::runtime::{self, Id, TimerHandle};

/// What a gate is released with, and what a routine is resumed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wake<T> {
    /// Released without a payload.
    ///
    /// A driver's first step, an unblocked sender, an elapsed timeout and a yielded tick all resume with this.
    Signal,

    /// Released with a value.
    Value(T),

    /// The channel waited on was closed.
    Closed,
}

impl<T> Wake<T> {
    /// The payload, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Wake::Value(value) => Some(value),
            Wake::Signal | Wake::Closed => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Wake::Closed)
    }
}

type Resumer<T> = Box<dyn FnOnce(Wake<T>) -> crate::Result<()>>;

/// Handle to a one-shot release gate.
///
/// Cloning the handle doesn't create a new gate.
pub struct Gate<T>(Rc<RefCell<GateState<T>>>);

struct GateState<T> {
    id: Id,
    resumer: Option<Resumer<T>>,
    released: bool,
    timeout: Option<Duration>,
    timer: Option<TimerHandle>,
}

impl<T: 'static> Gate<T> {
    /// Creates an unbound gate that waits until released.
    pub fn new() -> Self {
        Gate::create(None)
    }

    /// Creates an unbound gate that releases itself with [`Wake::Signal`] once `timeout` elapses after binding.
    pub fn with_timeout(timeout: Duration) -> Self {
        Gate::create(Some(timeout))
    }

    fn create(timeout: Option<Duration>) -> Self {
        Gate(Rc::new(RefCell::new(GateState {
            id: runtime::next_id(),
            resumer: None,
            released: false,
            timeout,
            timer: None,
        })))
    }

    /// Registers `resumer` as the exclusive owner of this gate's continuation.
    ///
    /// Starts the timeout, if the gate has one.
    /// Fails if the gate was bound before, even if it has since been released.
    pub fn bind(
        &self,
        resumer: impl FnOnce(Wake<T>) -> crate::Result<()> + 'static,
    ) -> crate::Result<()> {
        let mut state = self.0.borrow_mut();

        if state.resumer.is_some() || state.released {
            return Err(crate::Error::AlreadyBound(state.id));
        }

        state.resumer = Some(Box::new(resumer));
        log::trace!("gate {} bound", state.id);

        if let Some(timeout) = state.timeout {
            let gate = self.clone();
            state.timer = Some(runtime::schedule_timer(timeout, move || {
                gate.release(Wake::Signal);
                Ok(())
            }));
        }

        Ok(())
    }

    /// Releases the gate, scheduling its resumer on the next tick.
    ///
    /// Only the first release of a bound gate has an effect.
    /// Releasing a gate that was never bound does nothing.
    pub fn release(&self, wake: Wake<T>) {
        let (resumer, timer) = {
            let mut state = self.0.borrow_mut();
            let Some(resumer) = state.resumer.take() else {
                log::trace!("gate {} not bound, ignoring release", state.id);
                return;
            };

            state.released = true;
            log::trace!("gate {} released", state.id);

            (resumer, state.timer.take())
        };

        if let Some(timer) = timer {
            runtime::cancel_timer(timer);
        }

        runtime::defer(move || resumer(wake));
    }
}

impl<T> Gate<T> {
    pub fn id(&self) -> Id {
        self.0.borrow().id
    }

    pub fn is_bound(&self) -> bool {
        self.0.borrow().resumer.is_some()
    }

    pub fn is_released(&self) -> bool {
        self.0.borrow().released
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.0.borrow().timeout
    }
}

impl<T: 'static> Default for Gate<T> {
    fn default() -> Self {
        Gate::new()
    }
}

impl<T> Clone for Gate<T> {
    fn clone(&self) -> Self {
        Gate(self.0.clone())
    }
}

impl<T> fmt::Debug for Gate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.borrow();
        f.debug_struct("Gate")
            .field("id", &state.id)
            .field("bound", &state.resumer.is_some())
            .field("released", &state.released)
            .field("timeout", &state.timeout)
            .finish()
    }
}

/// Drains `queue` head first, releasing every gate with a clone of `wake`.
pub fn release_all<T: Clone + 'static>(queue: &mut VecDeque<Gate<T>>, wake: Wake<T>) {
    while let Some(gate) = queue.pop_front() {
        gate.release(wake.clone());
    }
}
