//! A small single-threaded runtime for cooperative coroutines.
//!
//! A [`Routine`] is a resumable computation that pauses at defined points.
//! A [`Driver`] runs it step by step on the thread's [`runtime`], suspending it whenever it yields a [`Gate`].
//! Gates are released by timers, by [`sync`] channel operations, or by external code.
//!
//! # Examples
//! ```
//! use aryn::sync::Recv;
//! use aryn::{routine, runtime, Step, Wake};
//!
//! runtime::start(|| {
//!     let channel = aryn::channel::<u32>(None);
//!
//!     let rx = channel.clone();
//!     let receiver = aryn::driver(move |()| {
//!         let rx = rx.clone();
//!         routine::from_fn(move |wake: Wake<u32>| match wake {
//!             Wake::Value(n) => Ok(Step::Complete(n)),
//!             _ => match rx.receive()? {
//!                 Recv::Ready(n) => Ok(Step::Complete(n)),
//!                 Recv::Wait(gate) => Ok(Step::Suspend(gate)),
//!                 Recv::Closed => Ok(Step::Complete(0)),
//!             },
//!         })
//!     });
//!     receiver.on_done(|n| assert_eq!(n, 42));
//!     receiver.start(()).unwrap();
//!
//!     aryn::run(move |()| {
//!         let tx = channel.clone();
//!         routine::from_fn(move |_: Wake<u32>| {
//!             tx.send(42)?;
//!             Ok(Step::Complete(()))
//!         })
//!     }, ());
//! })
//! .unwrap();
//! ```

use std::time::Duration;

pub mod bridge;
pub mod driver;
pub mod gate;
pub mod ring;
pub mod routine;
pub mod runtime;
pub mod sync;
pub mod time;

#[cfg(test)]
mod utils;

#[cfg(feature = "macros")]
pub use aryn_macros::start;

pub use driver::{Driver, Routine, State, Step};
pub use gate::{Gate, Wake};
pub use runtime::Id;
pub use sync::broadcast::Broadcast;
pub use sync::channel::Channel;
pub use sync::Recv;

/// Failure raised by a routine.
pub type BoxError = Box<dyn std::error::Error>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("gate {0} has already been bound")]
    AlreadyBound(Id),

    #[error("driver {0} is already running")]
    AlreadyStarted(Id),

    #[error("channel {0} is closed")]
    Closed(Id),

    #[error("channel {channel} already has {limit} waiters queued")]
    TooManyWaiters { channel: Id, limit: usize },

    #[error("event source accepts listeners through none of: add_event_listener, attach_event, on")]
    NoEventRegistration,

    #[error("routine failed: {0}")]
    Failed(#[source] BoxError),
}

/// Creates a channel, see [`Channel::new`].
pub fn channel<T: 'static>(capacity: Option<usize>) -> Channel<T> {
    Channel::new(capacity)
}

/// Creates a broadcast channel, see [`Broadcast::new`].
pub fn broadcast<T: Clone + 'static>(window: Duration) -> Broadcast<T> {
    Broadcast::new(window)
}

/// Creates a gate, optionally releasing itself once `timeout` elapses after binding.
pub fn gate<T: 'static>(timeout: Option<Duration>) -> Gate<T> {
    match timeout {
        Some(timeout) => Gate::with_timeout(timeout),
        None => Gate::new(),
    }
}

/// Creates an unstarted driver, see [`Driver::new`].
pub fn driver<A, R>(template: impl Fn(A) -> R + 'static) -> Driver<A, R>
where
    A: Clone + 'static,
    R: Routine + 'static,
    R::Message: 'static,
    R::Output: 'static,
{
    Driver::new(template)
}

/// Creates a driver and starts it with `args`.
///
/// # Panics
/// If called outside of [`runtime::start`].
pub fn run<A, R>(template: impl Fn(A) -> R + 'static, args: A) -> Driver<A, R>
where
    A: Clone + 'static,
    R: Routine + 'static,
    R::Message: 'static,
    R::Output: 'static,
{
    let driver = Driver::new(template);
    driver.start_unchecked(args);
    driver
}

/// Creates a driver in forever mode and starts it with `args`.
///
/// The routine restarts from `args` whenever it completes or fails.
///
/// # Panics
/// If called outside of [`runtime::start`].
pub fn forever<A, R>(template: impl Fn(A) -> R + 'static, args: A) -> Driver<A, R>
where
    A: Clone + 'static,
    R: Routine + 'static,
    R::Message: 'static,
    R::Output: 'static,
{
    let driver = Driver::new(template);
    driver.set_forever(true);
    driver.start_unchecked(args);
    driver
}
