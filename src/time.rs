//! Timed gates.

use std::time::Duration;

use crate::gate::Gate;

/// A gate that releases itself with [`crate::Wake::Signal`] at least `duration` after a routine suspends on it.
pub fn sleep<T: 'static>(duration: Duration) -> Gate<T> {
    Gate::with_timeout(duration)
}

/// A gate that releases itself on a later tick, letting other routines run first.
pub fn yield_now<T: 'static>() -> Gate<T> {
    Gate::with_timeout(Duration::ZERO)
}
