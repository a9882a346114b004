//! Building blocks for [`Routine`]s.

use std::fmt;
use std::marker::PhantomData;

use crate::driver::{Routine, Step};
use crate::gate::Wake;
use crate::BoxError;

/// Routine that runs `f` on every step.
///
/// The closure keeps whatever state it needs between steps, like [`std::iter::from_fn`].
///
/// # Examples
/// ```
/// use aryn::routine::from_fn;
/// use aryn::{Routine, Step, Wake};
///
/// let mut sum = 0;
/// let mut adder = from_fn(move |input: Wake<i32>| {
///     sum += input.into_value().unwrap_or(0);
///     match sum {
///         0..=9 => Ok(Step::Yield(sum)),
///         _ => Ok(Step::Complete(sum)),
///     }
/// });
///
/// assert!(matches!(adder.resume(Wake::Value(4)), Ok(Step::Yield(4))));
/// assert!(matches!(adder.resume(Wake::Value(6)), Ok(Step::Complete(10))));
/// ```
pub fn from_fn<M, O, F>(f: F) -> FromFn<M, O, F>
where
    F: FnMut(Wake<M>) -> Result<Step<M, O>, BoxError>,
{
    FromFn {
        f,
        _marker: PhantomData,
    }
}

/// See [`from_fn`].
pub struct FromFn<M, O, F> {
    f: F,
    _marker: PhantomData<fn(Wake<M>) -> O>,
}

impl<M, O, F> Routine for FromFn<M, O, F>
where
    F: FnMut(Wake<M>) -> Result<Step<M, O>, BoxError>,
{
    type Message = M;
    type Output = O;

    fn resume(&mut self, input: Wake<M>) -> Result<Step<M, O>, BoxError> {
        (self.f)(input)
    }
}

impl<M, O, F> fmt::Debug for FromFn<M, O, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FromFn").finish_non_exhaustive()
    }
}
