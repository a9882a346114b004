//! Debounced broadcast channel.
//!
//! Sends never wait. Every waiting receiver is released with the same message,
//! but at most once per window: a burst of sends inside a window is collapsed into its latest message,
//! delivered when the window ends.
//!
//! The first window opens when the channel is created.
//! After each delivery the next window opens at the delivery time.
//!
//! Receivers only ever see messages sent after they started waiting, nothing is buffered.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::rc::Rc;
use std::time::{Duration, Instant};

use super::{enqueue, Codec, Recv};
use crate::gate::{self, Gate, Wake};
use crate::runtime::{self, Id, TimerHandle};

/// Handle to a broadcast channel.
///
/// Cloning the handle doesn't create a new channel.
pub struct Broadcast<T>(Rc<RefCell<BroadcastState<T>>>);

struct BroadcastState<T> {
    id: Id,
    closed: bool,
    window: Duration,
    /// End of the current window.
    deadline: Instant,
    /// Pending delivery of the latest message sent inside the current window.
    trailing: Option<TimerHandle>,
    receivers: VecDeque<Gate<T>>,
    codec: Codec<T>,
}

impl<T: Clone + 'static> Broadcast<T> {
    /// Creates a broadcast channel delivering at most once per `window`.
    pub fn new(window: Duration) -> Self {
        Broadcast(Rc::new(RefCell::new(BroadcastState {
            id: runtime::next_id(),
            closed: false,
            window,
            deadline: Instant::now() + window,
            trailing: None,
            receivers: VecDeque::new(),
            codec: Codec::identity(),
        })))
    }

    /// Replaces the identity transforms applied to messages.
    ///
    /// Every sent message goes through `encode`, then `decode`, before it is delivered.
    pub fn with_codec(
        self,
        encode: impl Fn(T) -> T + 'static,
        decode: impl Fn(T) -> T + 'static,
    ) -> Self {
        self.0.borrow_mut().codec = Codec::new(encode, decode);
        self
    }

    /// Broadcasts `value` to every waiting receiver.
    ///
    /// Delivers right away if the current window has ended.
    /// Otherwise replaces any earlier message still pending in this window, and delivers when the window ends.
    ///
    /// Fails if the channel is closed.
    ///
    /// # Panics
    /// If it has to wait for the window to end outside of [`runtime::start`].
    pub fn send(&self, value: T) -> crate::Result<()> {
        let mut state = self.0.borrow_mut();

        if state.closed {
            return Err(crate::Error::Closed(state.id));
        }

        let value = state.codec.roundtrip(value);

        if let Some(trailing) = state.trailing.take() {
            runtime::cancel_timer(trailing);
        }

        let now = Instant::now();
        if now >= state.deadline {
            state.deliver(value, now);
            return Ok(());
        }

        let broadcast = self.clone();
        state.trailing = Some(runtime::schedule_timer(state.deadline - now, move || {
            let mut state = broadcast.0.borrow_mut();
            state.trailing = None;
            state.deliver(value, Instant::now());
            Ok(())
        }));
        log::trace!("broadcast {} deferred delivery to end of window", state.id);

        Ok(())
    }

    /// Waits for the next delivery.
    ///
    /// Never returns [`Recv::Ready`], there are no buffered messages.
    pub fn receive(&self) -> crate::Result<Recv<T>> {
        let mut state = self.0.borrow_mut();
        let state = &mut *state;

        if state.closed {
            return Ok(Recv::Closed);
        }

        let gate = Gate::new();
        enqueue(&mut state.receivers, gate.clone(), state.id)?;

        Ok(Recv::Wait(gate))
    }

    /// Closes the channel, further sends fail.
    ///
    /// A message pending in the current window is discarded.
    /// Waiting receivers are released with [`Wake::Closed`].
    /// Closing twice does nothing.
    pub fn close(&self) {
        let (trailing, mut receivers) = {
            let mut state = self.0.borrow_mut();
            if state.closed {
                return;
            }

            state.closed = true;
            log::debug!(
                "broadcast {} closed, releasing {} receivers",
                state.id,
                state.receivers.len()
            );

            (state.trailing.take(), mem::take(&mut state.receivers))
        };

        if let Some(trailing) = trailing {
            runtime::cancel_timer(trailing);
        }

        gate::release_all(&mut receivers, Wake::Closed);
    }
}

impl<T: Clone + 'static> BroadcastState<T> {
    /// Releases every waiting receiver and opens the next window.
    fn deliver(&mut self, value: T, now: Instant) {
        log::trace!(
            "broadcast {} delivering to {} receivers",
            self.id,
            self.receivers.len()
        );

        gate::release_all(&mut self.receivers, Wake::Value(value));
        self.deadline = now + self.window;
    }
}

impl<T> Broadcast<T> {
    pub fn id(&self) -> Id {
        self.0.borrow().id
    }

    pub fn is_closed(&self) -> bool {
        self.0.borrow().closed
    }

    pub fn window(&self) -> Duration {
        self.0.borrow().window
    }

    pub fn waiting_receivers(&self) -> usize {
        self.0.borrow().receivers.len()
    }

    /// Whether a message is waiting for the current window to end.
    pub fn is_pending(&self) -> bool {
        self.0.borrow().trailing.is_some()
    }
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self {
        Broadcast(self.0.clone())
    }
}

impl<T> fmt::Debug for Broadcast<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.borrow();
        f.debug_struct("Broadcast")
            .field("id", &state.id)
            .field("closed", &state.closed)
            .field("window", &state.window)
            .field("receivers", &state.receivers.len())
            .finish()
    }
}
