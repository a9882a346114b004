//! Coroutine driver.
//!
//! A [`Routine`] is a resumable computation: every call to [`Routine::resume`] runs it up to its next [`Step`].
//! A [`Driver`] owns a routine instance and runs it step by step:
//! intermediate values are fed straight back in, a yielded [`Gate`] suspends the driver until released,
//! and completion either finishes the driver or, in forever mode, starts a fresh instance from the original arguments.
//!
//! The driver keeps the routine's template, a `Fn(A) -> R`, so it can restart and [`Driver::fork`].
//!
//! # Examples
//! ```
//! use aryn::{routine, runtime, Driver, Step, Wake};
//!
//! runtime::start(|| {
//!     let driver = Driver::new(|name: &'static str| {
//!         let mut greeted = false;
//!         routine::from_fn(move |_: Wake<()>| {
//!             if greeted {
//!                 return Ok(Step::Complete(name.len()));
//!             }
//!             greeted = true;
//!             Ok(Step::Suspend(aryn::time::sleep(std::time::Duration::from_millis(1))))
//!         })
//!     });
//!     driver.on_done(|length| assert_eq!(length, 5));
//!     driver.start("world").unwrap();
//! })
//! .unwrap();
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::gate::{Gate, Wake};
use crate::runtime::{self, Id};
use crate::BoxError;

/// A computation that pauses at defined points and resumes with an externally supplied value.
pub trait Routine {
    /// Values flowing in and out of the routine between steps.
    type Message;

    /// Final value of the routine.
    type Output;

    /// Runs the routine up to its next step.
    ///
    /// `input` is [`Wake::Signal`] on the first step,
    /// the value of the previous [`Step::Yield`],
    /// or whatever the previously yielded gate was released with.
    fn resume(
        &mut self,
        input: Wake<Self::Message>,
    ) -> Result<Step<Self::Message, Self::Output>, BoxError>;
}

impl<R: Routine + ?Sized> Routine for Box<R> {
    type Message = R::Message;
    type Output = R::Output;

    fn resume(
        &mut self,
        input: Wake<Self::Message>,
    ) -> Result<Step<Self::Message, Self::Output>, BoxError> {
        (**self).resume(input)
    }
}

/// Where a routine stopped.
#[derive(Debug)]
pub enum Step<M, O> {
    /// Intermediate value, fed back into the routine right away.
    Yield(M),

    /// Wait until the gate is released.
    Suspend(Gate<M>),

    /// The routine finished.
    Complete(O),
}

/// Lifecycle of a [`Driver`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    /// Not started yet, or waiting on a gate.
    Suspended,
    Running,
    Done,
    Failed,
}

/// Handle to a coroutine driver.
///
/// Cloning the handle doesn't create a new driver, see [`Driver::fork`].
pub struct Driver<A, R: Routine>(Rc<RefCell<DriverState<A, R>>>);

struct DriverState<A, R: Routine> {
    id: Id,
    state: State,
    template: Rc<dyn Fn(A) -> R>,
    routine: Option<R>,
    waiting: Option<Gate<R::Message>>,
    forever: bool,
    debug: Option<bool>,
    args: Option<A>,
    slot: Option<usize>,
    on_failure: Option<Box<dyn FnMut(&BoxError)>>,
    on_done: Option<Box<dyn FnOnce(R::Output)>>,
}

impl<A, R: Routine> DriverState<A, R> {
    /// Waiting on a gate that hasn't been released yet.
    fn is_suspended(&self) -> bool {
        self.waiting
            .as_ref()
            .map_or(false, |gate| !gate.is_released())
    }

    fn set_state(&mut self, state: State) {
        if self.state != state {
            log::debug!("driver {} {:?} -> {:?}", self.id, self.state, state);
            self.state = state;
        }
    }
}

impl<A, R> Driver<A, R>
where
    A: Clone + 'static,
    R: Routine + 'static,
    R::Message: 'static,
    R::Output: 'static,
{
    /// Creates a driver over routines made by `template`.
    ///
    /// Nothing runs until [`Driver::start`].
    pub fn new(template: impl Fn(A) -> R + 'static) -> Self {
        Driver::from_template(Rc::new(template), false, None)
    }

    fn from_template(template: Rc<dyn Fn(A) -> R>, forever: bool, debug: Option<bool>) -> Self {
        Driver(Rc::new(RefCell::new(DriverState {
            id: runtime::next_id(),
            state: State::Suspended,
            template,
            routine: None,
            waiting: None,
            forever,
            debug,
            args: None,
            slot: None,
            on_failure: None,
            on_done: None,
        })))
    }

    /// Instantiates the routine with `args` and schedules its first step.
    ///
    /// Returns before the routine runs.
    /// The arguments are kept for restarts in forever mode.
    /// Fails if the driver is already started and hasn't completed or failed since.
    ///
    /// # Panics
    /// If called outside of [`runtime::start`].
    pub fn start(&self, args: A) -> crate::Result<()> {
        {
            let state = self.0.borrow();
            if state.slot.is_some() {
                return Err(crate::Error::AlreadyStarted(state.id));
            }
        }

        self.start_unchecked(args);
        Ok(())
    }

    pub(crate) fn start_unchecked(&self, args: A) {
        let slot = runtime::register(self.0.clone());
        self.0.borrow_mut().slot = Some(slot);
        self.launch(args);
    }

    /// Fresh routine instance, first step on the next tick.
    fn launch(&self, args: A) {
        let template = self.0.borrow().template.clone();
        let routine = template(args.clone());

        let previous = {
            let mut state = self.0.borrow_mut();
            state.args = Some(args);
            state.waiting = None;
            state.routine.replace(routine)
        };
        drop(previous);

        let driver = self.clone();
        runtime::defer(move || driver.advance(Wake::Signal));
    }

    /// Feeds `input` into the routine and runs it until it suspends, completes or fails.
    ///
    /// Does nothing while the driver waits on an unreleased gate, while a step is already in flight, or before the driver is started.
    /// Returns [`crate::Error::Failed`] if the routine fails in debug mode.
    pub fn advance(&self, input: Wake<R::Message>) -> crate::Result<()> {
        let mut input = input;

        loop {
            let mut routine = {
                let mut state = self.0.borrow_mut();
                if state.is_suspended() {
                    log::trace!("driver {} is suspended, ignoring advance", state.id);
                    return Ok(());
                }

                let Some(routine) = state.routine.take() else {
                    log::trace!("driver {} has no step to run", state.id);
                    return Ok(());
                };

                state.set_state(State::Running);
                routine
            };

            let step = routine.resume(input);
            self.0.borrow_mut().routine = Some(routine);

            match step {
                Ok(Step::Yield(value)) => input = Wake::Value(value),
                Ok(Step::Suspend(gate)) => return self.suspend(gate),
                Ok(Step::Complete(output)) => return self.complete(output),
                Err(failure) => return self.fail(failure),
            }
        }
    }

    fn suspend(&self, gate: Gate<R::Message>) -> crate::Result<()> {
        {
            let mut state = self.0.borrow_mut();
            state.set_state(State::Suspended);
            state.waiting = Some(gate.clone());
        }

        // weak, the gate may be stored by a channel that outlives this driver
        let driver = Rc::downgrade(&self.0);
        let released = gate.id();
        let bound = gate.bind(move |wake| match driver.upgrade() {
            Some(driver) => Driver(driver).resume(released, wake),
            None => Ok(()),
        });

        if let Err(error) = bound {
            self.0.borrow_mut().waiting = None;
            return self.fail(error.into());
        }

        Ok(())
    }

    /// Continuation of a released gate.
    ///
    /// Ignored unless the driver still waits on that gate.
    fn resume(&self, released: Id, wake: Wake<R::Message>) -> crate::Result<()> {
        {
            let mut state = self.0.borrow_mut();
            if state.waiting.as_ref().map(Gate::id) != Some(released) {
                log::trace!("driver {} moved past gate {released}, ignoring", state.id);
                return Ok(());
            }
            state.waiting = None;
        }

        self.advance(wake)
    }

    fn complete(&self, output: R::Output) -> crate::Result<()> {
        let restart = {
            let state = self.0.borrow();
            if state.forever {
                state.args.clone()
            } else {
                None
            }
        };

        if let Some(args) = restart {
            log::debug!("driver {} completed, restarting", self.id());
            self.launch(args);
            return Ok(());
        }

        self.0.borrow_mut().set_state(State::Done);
        self.retire();

        let on_done = self.0.borrow_mut().on_done.take();
        if let Some(on_done) = on_done {
            on_done(output);
        }

        Ok(())
    }

    fn fail(&self, failure: BoxError) -> crate::Result<()> {
        let (id, debug) = {
            let mut state = self.0.borrow_mut();
            state.set_state(State::Failed);
            (state.id, state.debug.unwrap_or_else(runtime::debug))
        };

        if debug {
            self.retire();
            return Err(crate::Error::Failed(failure));
        }

        let handler = self.0.borrow_mut().on_failure.take();
        match handler {
            Some(mut handler) => {
                handler(&failure);

                // the handler may have installed a replacement for itself
                let mut state = self.0.borrow_mut();
                if state.on_failure.is_none() {
                    state.on_failure = Some(handler);
                }
            }
            None => log::warn!("driver {id} failed: {failure}"),
        }

        let restart = {
            let state = self.0.borrow();
            if state.forever {
                state.args.clone()
            } else {
                None
            }
        };

        match restart {
            Some(args) => {
                log::debug!("driver {id} failed, restarting");
                self.launch(args);
            }
            None => self.retire(),
        }

        Ok(())
    }

    /// Leaves the runtime's registry, the driver won't run again unless restarted.
    fn retire(&self) {
        let (routine, slot) = {
            let mut state = self.0.borrow_mut();
            state.waiting = None;
            (state.routine.take(), state.slot.take())
        };
        drop(routine);

        if let Some(slot) = slot {
            runtime::deregister(slot);
        }
    }

    /// New driver over the same template, with its own state.
    ///
    /// Keeps the forever and debug policies, not the handlers.
    pub fn fork(&self) -> Self {
        let state = self.0.borrow();
        Driver::from_template(state.template.clone(), state.forever, state.debug)
    }

    /// Installs the handler for routine failures, replacing the previous one.
    ///
    /// Only called when not in debug mode.
    /// Without a handler, failures are logged.
    pub fn catch_errors(&self, handler: impl FnMut(&BoxError) + 'static) {
        self.0.borrow_mut().on_failure = Some(Box::new(handler));
    }

    /// Installs the handler for the routine's output, replacing the previous one.
    ///
    /// Called once, when the driver completes outside of forever mode.
    pub fn on_done(&self, handler: impl FnOnce(R::Output) + 'static) {
        self.0.borrow_mut().on_done = Some(Box::new(handler));
    }

    /// A gate released with the routine's output once the driver completes.
    ///
    /// Replaces the completion handler.
    /// Lets another routine suspend until this driver is done.
    pub fn completion(&self) -> Gate<R::Output> {
        let gate = Gate::new();

        let release = gate.clone();
        self.on_done(move |output| release.release(Wake::Value(output)));

        gate
    }
}

impl<A, R: Routine> Driver<A, R> {
    pub fn id(&self) -> Id {
        self.0.borrow().id
    }

    pub fn state(&self) -> State {
        self.0.borrow().state
    }

    /// Waiting on a gate that hasn't been released yet.
    pub fn is_suspended(&self) -> bool {
        self.0.borrow().is_suspended()
    }

    pub fn is_forever(&self) -> bool {
        self.0.borrow().forever
    }

    /// Restart the routine from its original arguments whenever it completes or fails.
    pub fn set_forever(&self, forever: bool) {
        self.0.borrow_mut().forever = forever;
    }

    /// Overrides [`runtime::Config::debug`] for this driver.
    pub fn set_debug(&self, debug: bool) {
        self.0.borrow_mut().debug = Some(debug);
    }
}

impl<A, R: Routine> Clone for Driver<A, R> {
    fn clone(&self) -> Self {
        Driver(self.0.clone())
    }
}

impl<A, R: Routine> fmt::Debug for Driver<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.borrow();
        f.debug_struct("Driver")
            .field("id", &state.id)
            .field("state", &state.state)
            .field("forever", &state.forever)
            .finish_non_exhaustive()
    }
}
