//! Channels for passing messages between routines.
//!
//! Operations never block the thread.
//! When an operation can't complete yet it hands back a [`Gate`], the calling routine suspends on it by yielding [`crate::Step::Suspend`].
//!
//! Which channel to use:
//! - [`channel::Channel::rendezvous`] when a sender must wait for its message to be taken.
//! - [`channel::Channel::bounded`] when senders may run ahead of receivers by a fixed number of messages.
//! - [`broadcast::Broadcast`] when every waiting receiver should see only the latest of a burst of messages.

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::gate::Gate;
use crate::runtime::{self, Id};

pub mod broadcast;
pub mod channel;

/// Outcome of receiving from a channel.
pub enum Recv<T> {
    /// A message was available.
    Ready(T),

    /// No message yet, suspend on the gate.
    /// It's released with [`crate::Wake::Value`], or [`crate::Wake::Closed`] if the channel closes first.
    Wait(Gate<T>),

    /// The channel is closed and drained.
    Closed,
}

impl<T> Recv<T> {
    /// The message, if one was available.
    pub fn ready(self) -> Option<T> {
        match self {
            Recv::Ready(value) => Some(value),
            Recv::Wait(_) | Recv::Closed => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Recv::Closed)
    }
}

impl<T: fmt::Debug> fmt::Debug for Recv<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recv::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Recv::Wait(gate) => f.debug_tuple("Wait").field(gate).finish(),
            Recv::Closed => f.write_str("Closed"),
        }
    }
}

/// Transforms applied to every message: encode on the way in, decode on the way out.
pub(crate) struct Codec<T> {
    encode: Rc<dyn Fn(T) -> T>,
    decode: Rc<dyn Fn(T) -> T>,
}

impl<T: 'static> Codec<T> {
    pub(crate) fn identity() -> Self {
        Codec::new(|value| value, |value| value)
    }

    pub(crate) fn new(encode: impl Fn(T) -> T + 'static, decode: impl Fn(T) -> T + 'static) -> Self {
        Codec {
            encode: Rc::new(encode),
            decode: Rc::new(decode),
        }
    }
}

impl<T> Codec<T> {
    pub(crate) fn encode(&self, value: T) -> T {
        (self.encode)(value)
    }

    pub(crate) fn decode(&self, value: T) -> T {
        (self.decode)(value)
    }

    /// For messages handed straight from a sender to a receiver.
    pub(crate) fn roundtrip(&self, value: T) -> T {
        self.decode(self.encode(value))
    }
}

/// Appends a waiter, unless the queue is at [`runtime::Config::waiter_limit`].
pub(crate) fn enqueue<W>(queue: &mut VecDeque<W>, waiter: W, channel: Id) -> crate::Result<()> {
    if let Some(limit) = runtime::waiter_limit() {
        if queue.len() >= limit {
            log::warn!("channel {channel} refused waiter, {limit} already queued");
            return Err(crate::Error::TooManyWaiters { channel, limit });
        }
    }

    queue.push_back(waiter);
    Ok(())
}
