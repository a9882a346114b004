//! Rendezvous and buffered channels.
//!
//! A rendezvous channel has no buffer: a message moves only when a sender and a receiver meet.
//! A buffered channel holds up to its capacity in a [`Ring`], further senders wait for room.
//!
//! Both sides queue their waiters in FIFO order.
//! Whichever side arrives second serves the other side's queue head first.
//!
//! A sender that has to wait keeps its message parked next to its gate, and the message moves once room frees up.
//! Nothing has to be re-sent and nothing is dropped,
//! except when the channel closes: parked senders and their messages are discarded and those senders never resume.
//!
//! # Examples
//!
//! ### Buffered
//! ```
//! use aryn::{runtime, sync::channel::Channel};
//!
//! runtime::start(|| {
//!     let channel = Channel::bounded(2);
//!
//!     assert!(channel.send('a').unwrap().is_none());
//!     assert!(channel.send('b').unwrap().is_none());
//!     assert!(channel.send('c').unwrap().is_some()); // suspend on this gate
//!
//!     assert_eq!(channel.receive().unwrap().ready(), Some('a'));
//!     assert_eq!(channel.receive().unwrap().ready(), Some('b'));
//!     assert_eq!(channel.receive().unwrap().ready(), Some('c'));
//! })
//! .unwrap();
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::rc::Rc;

use super::{enqueue, Codec, Recv};
use crate::gate::{Gate, Wake};
use crate::ring::Ring;
use crate::runtime::{self, Id};
use crate::time;

/// Handle to a rendezvous or buffered channel.
///
/// Cloning the handle doesn't create a new channel.
pub struct Channel<T>(Rc<RefCell<ChannelState<T>>>);

struct ChannelState<T> {
    id: Id,
    closed: bool,
    /// Absent for rendezvous channels.
    ring: Option<Ring<T>>,
    /// Encoded messages of waiting senders.
    senders: VecDeque<(T, Gate<T>)>,
    receivers: VecDeque<Gate<T>>,
    codec: Codec<T>,
}

impl<T: 'static> Channel<T> {
    /// Creates a buffered channel holding up to `capacity` messages.
    ///
    /// No capacity, or a capacity of zero, creates a rendezvous channel.
    pub fn new(capacity: Option<usize>) -> Self {
        let ring = capacity.filter(|&capacity| capacity > 0).map(Ring::new);

        Channel(Rc::new(RefCell::new(ChannelState {
            id: runtime::next_id(),
            closed: false,
            ring,
            senders: VecDeque::new(),
            receivers: VecDeque::new(),
            codec: Codec::identity(),
        })))
    }

    pub fn rendezvous() -> Self {
        Channel::new(None)
    }

    pub fn bounded(capacity: usize) -> Self {
        Channel::new(Some(capacity))
    }

    /// Replaces the identity transforms applied to messages.
    ///
    /// `encode` runs when a message is sent, `decode` when it's received.
    pub fn with_codec(
        self,
        encode: impl Fn(T) -> T + 'static,
        decode: impl Fn(T) -> T + 'static,
    ) -> Self {
        self.0.borrow_mut().codec = Codec::new(encode, decode);
        self
    }

    /// Offers `value` to the channel.
    ///
    /// Returns no gate if the message was taken or buffered without waiting.
    /// Otherwise the caller should suspend on the returned gate:
    /// - A rendezvous send that met a waiting receiver returns a zero-delay gate, ceding a single tick.
    /// - A send that has to wait returns a gate released once a receiver takes the message.
    ///
    /// Fails if the channel is closed.
    pub fn send(&self, value: T) -> crate::Result<Option<Gate<T>>> {
        let mut state = self.0.borrow_mut();
        let state = &mut *state;

        if state.closed {
            return Err(crate::Error::Closed(state.id));
        }

        if let Some(receiver) = state.receivers.pop_front() {
            // a buffered channel only has waiting receivers while its ring is empty
            receiver.release(Wake::Value(state.codec.roundtrip(value)));

            return match state.ring {
                None => Ok(Some(time::yield_now())),
                Some(_) => Ok(None),
            };
        }

        let value = state.codec.encode(value);
        let value = match &mut state.ring {
            Some(ring) => match ring.push(value) {
                Ok(()) => return Ok(None),
                Err(value) => value,
            },
            None => value,
        };

        let gate = Gate::new();
        enqueue(&mut state.senders, (value, gate.clone()), state.id)?;
        log::trace!("channel {} parked sender {}", state.id, gate.id());

        Ok(Some(gate))
    }

    /// Takes the oldest message.
    ///
    /// Returns [`Recv::Wait`] if there's none yet, the caller should suspend on the gate.
    /// A closed channel still hands out its buffered messages, then returns [`Recv::Closed`].
    pub fn receive(&self) -> crate::Result<Recv<T>> {
        let mut state = self.0.borrow_mut();
        let state = &mut *state;

        let value = match &mut state.ring {
            Some(ring) => ring.shift().map(|value| {
                // move the oldest parked message into the slot that just freed up
                if let Some((parked, sender)) = state.senders.pop_front() {
                    let pushed = ring.push(parked);
                    debug_assert!(pushed.is_ok(), "ring must have room after shift");
                    sender.release(Wake::Signal);
                }
                value
            }),
            None => state.senders.pop_front().map(|(value, sender)| {
                sender.release(Wake::Signal);
                value
            }),
        };

        if let Some(value) = value {
            return Ok(Recv::Ready(state.codec.decode(value)));
        }

        if state.closed {
            return Ok(Recv::Closed);
        }

        let gate = Gate::new();
        enqueue(&mut state.receivers, gate.clone(), state.id)?;
        log::trace!("channel {} queued receiver {}", state.id, gate.id());

        Ok(Recv::Wait(gate))
    }

    /// Closes the channel, further sends fail.
    ///
    /// Waiting receivers are released with [`Wake::Closed`].
    /// Waiting senders are discarded along with their messages and never resume.
    /// Closing twice does nothing.
    pub fn close(&self) {
        let (senders, receivers) = {
            let mut state = self.0.borrow_mut();
            if state.closed {
                return;
            }

            state.closed = true;
            log::debug!(
                "channel {} closed, discarding {} senders, releasing {} receivers",
                state.id,
                state.senders.len(),
                state.receivers.len()
            );

            (
                mem::take(&mut state.senders),
                mem::take(&mut state.receivers),
            )
        };

        drop(senders);

        for receiver in receivers {
            receiver.release(Wake::Closed);
        }
    }
}

impl<T> Channel<T> {
    pub fn id(&self) -> Id {
        self.0.borrow().id
    }

    pub fn is_closed(&self) -> bool {
        self.0.borrow().closed
    }

    pub fn is_rendezvous(&self) -> bool {
        self.0.borrow().ring.is_none()
    }

    /// Buffer capacity, none for rendezvous channels.
    pub fn capacity(&self) -> Option<usize> {
        self.0.borrow().ring.as_ref().map(Ring::capacity)
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.0.borrow().ring.as_ref().map_or(0, Ring::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn waiting_senders(&self) -> usize {
        self.0.borrow().senders.len()
    }

    pub fn waiting_receivers(&self) -> usize {
        self.0.borrow().receivers.len()
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Channel(self.0.clone())
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.borrow();
        f.debug_struct("Channel")
            .field("id", &state.id)
            .field("closed", &state.closed)
            .field("capacity", &state.ring.as_ref().map(Ring::capacity))
            .field("senders", &state.senders.len())
            .field("receivers", &state.receivers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Debug;
    use std::time::Duration;

    use impls::impls;

    use super::*;
    use crate::runtime::{start, start_with, Config};
    use crate::utils::{consumer, producer, record};

    #[test]
    fn trait_implementations() {
        assert!(impls!(Channel<i32>: Debug & Clone & !Send & !Sync));
    }

    #[test]
    fn zero_capacity_is_rendezvous() {
        assert!(Channel::<()>::new(Some(0)).is_rendezvous());
        assert!(Channel::<()>::new(None).is_rendezvous());
        assert_eq!(Channel::<()>::bounded(3).capacity(), Some(3));
    }

    mod rendezvous {
        use super::*;

        #[test]
        fn receive_before_send() {
            let log = Rc::new(RefCell::new(vec![]));

            start(|| {
                let channel = Channel::rendezvous();

                let Recv::Wait(receiver) = channel.receive().unwrap() else {
                    panic!("nothing was sent yet");
                };
                receiver.bind(record(&log)).unwrap();

                let sender = channel.send("x").unwrap().expect("sender cedes a tick");

                assert_eq!(sender.timeout(), Some(Duration::ZERO));
                assert_eq!(channel.waiting_receivers(), 0);
                assert_eq!(channel.waiting_senders(), 0);
            })
            .unwrap();

            assert_eq!(*log.borrow(), vec![Wake::Value("x")]);
        }

        #[test]
        fn sender_waits_for_receiver() {
            let log = Rc::new(RefCell::new(vec![]));

            start(|| {
                let channel = Channel::rendezvous();

                let sender = channel.send(1).unwrap().expect("no receiver yet");
                sender.bind(record(&log)).unwrap();
                assert_eq!(channel.waiting_senders(), 1);

                assert_eq!(channel.receive().unwrap().ready(), Some(1));
                assert_eq!(channel.waiting_senders(), 0);
            })
            .unwrap();

            assert_eq!(*log.borrow(), vec![Wake::Signal]);
        }

        #[test]
        fn queues_concurrent_sends_in_order() {
            start(|| {
                let channel = Channel::rendezvous();

                let first = channel.send(1).unwrap();
                let second = channel.send(2).unwrap();

                assert!(first.is_some() && second.is_some());
                assert_eq!(channel.receive().unwrap().ready(), Some(1));
                assert_eq!(channel.receive().unwrap().ready(), Some(2));
                assert!(matches!(channel.receive().unwrap(), Recv::Wait(_)));
            })
            .unwrap();
        }

        #[test]
        fn delivers_each_message_once() {
            let received = Rc::new(RefCell::new(vec![]));

            start(|| {
                let channel = Channel::rendezvous();
                for _ in 0..3 {
                    consumer(channel.clone(), received.clone()).start(()).unwrap();
                }
                producer(channel.clone(), vec![1, 2, 3, 4, 5, 6], true)
                    .start(())
                    .unwrap();
            })
            .unwrap();

            let mut received = received.borrow().clone();
            received.sort();
            assert_eq!(received, vec![1, 2, 3, 4, 5, 6]);
        }
    }

    mod buffered {
        use super::*;

        #[test]
        fn never_holds_more_than_capacity() {
            start(|| {
                let channel = Channel::bounded(2);

                for i in 0..5 {
                    let gate = channel.send(i).unwrap();
                    assert_eq!(gate.is_some(), i >= 2);
                    assert!(channel.len() <= 2);
                }

                assert_eq!(channel.len(), 2);
                assert_eq!(channel.waiting_senders(), 3);
            })
            .unwrap();
        }

        #[test]
        fn receive_unblocks_oldest_sender() {
            let log = Rc::new(RefCell::new(vec![]));

            start(|| {
                let channel = Channel::bounded(2);
                assert!(channel.send('a').unwrap().is_none());
                assert!(channel.send('b').unwrap().is_none());
                let blocked = channel.send('c').unwrap().expect("buffer is full");
                blocked.bind(record(&log)).unwrap();

                assert_eq!(channel.receive().unwrap().ready(), Some('a'));
                assert!(blocked.is_released());
                assert_eq!(channel.len(), 2);

                assert_eq!(channel.receive().unwrap().ready(), Some('b'));
                assert_eq!(channel.receive().unwrap().ready(), Some('c'));
                assert!(channel.is_empty());
            })
            .unwrap();

            assert_eq!(*log.borrow(), vec![Wake::Signal]);
        }

        #[test]
        fn hands_message_to_waiting_receiver() {
            let log = Rc::new(RefCell::new(vec![]));

            start(|| {
                let channel = Channel::bounded(1);
                let Recv::Wait(receiver) = channel.receive().unwrap() else {
                    panic!("channel is empty");
                };
                receiver.bind(record(&log)).unwrap();

                assert!(channel.send(5).unwrap().is_none());
                assert!(channel.is_empty());
            })
            .unwrap();

            assert_eq!(*log.borrow(), vec![Wake::Value(5)]);
        }

        #[test]
        fn receivers_served_in_fifo_order() {
            let order = Rc::new(RefCell::new(vec![]));

            start(|| {
                let channel = Channel::bounded(4);

                for i in 0..3 {
                    let Recv::Wait(receiver) = channel.receive().unwrap() else {
                        panic!("channel is empty");
                    };
                    let order = order.clone();
                    receiver
                        .bind(move |wake| {
                            order.borrow_mut().push((i, wake.into_value()));
                            Ok(())
                        })
                        .unwrap();
                }

                for value in ["x", "y", "z"] {
                    channel.send(value).unwrap();
                }
            })
            .unwrap();

            assert_eq!(
                *order.borrow(),
                vec![(0, Some("x")), (1, Some("y")), (2, Some("z"))]
            );
        }

        #[test]
        fn producer_and_consumer_drain_everything() {
            let received = Rc::new(RefCell::new(vec![]));

            start(|| {
                let channel = Channel::bounded(2);
                producer(channel.clone(), (0..10).collect(), true)
                    .start(())
                    .unwrap();
                consumer(channel.clone(), received.clone()).start(()).unwrap();
            })
            .unwrap();

            assert_eq!(*received.borrow(), (0..10).collect::<Vec<_>>());
        }
    }

    mod close {
        use super::*;

        #[test]
        fn fails_further_sends() {
            start(|| {
                let channel = Channel::bounded(1);
                channel.close();

                let result = channel.send(1);

                assert!(matches!(result, Err(crate::Error::Closed(id)) if id == channel.id()));
                assert!(channel.is_closed());
            })
            .unwrap();
        }

        #[test]
        fn releases_waiting_receivers_once() {
            let log = Rc::new(RefCell::new(vec![]));

            start(|| {
                let channel = Channel::<i32>::rendezvous();
                for _ in 0..2 {
                    let Recv::Wait(receiver) = channel.receive().unwrap() else {
                        panic!("nothing was sent yet");
                    };
                    receiver.bind(record(&log)).unwrap();
                }

                channel.close();
                channel.close();
            })
            .unwrap();

            assert_eq!(*log.borrow(), vec![Wake::Closed, Wake::Closed]);
        }

        #[test]
        fn later_receivers_dont_wait() {
            start(|| {
                let channel = Channel::<i32>::rendezvous();
                channel.close();

                assert!(channel.receive().unwrap().is_closed());
                assert_eq!(channel.waiting_receivers(), 0);
            })
            .unwrap();
        }

        #[test]
        fn drains_buffer_before_reporting_closed() {
            start(|| {
                let channel = Channel::bounded(3);
                channel.send(1).unwrap();
                channel.send(2).unwrap();
                channel.close();

                assert_eq!(channel.receive().unwrap().ready(), Some(1));
                assert_eq!(channel.receive().unwrap().ready(), Some(2));
                assert!(channel.receive().unwrap().is_closed());
            })
            .unwrap();
        }

        #[test]
        fn discards_waiting_senders() {
            let log = Rc::new(RefCell::new(vec![]));

            start(|| {
                let channel = Channel::bounded(1);
                channel.send(1).unwrap();
                let blocked = channel.send(2).unwrap().expect("buffer is full");
                blocked.bind(record(&log)).unwrap();

                channel.close();

                assert_eq!(channel.waiting_senders(), 0);
                assert_eq!(channel.receive().unwrap().ready(), Some(1));
                assert!(channel.receive().unwrap().is_closed());
            })
            .unwrap();

            assert!(log.borrow().is_empty());
        }
    }

    mod codec {
        use super::*;

        #[test]
        fn encodes_on_send_and_decodes_on_receive() {
            start(|| {
                let channel = Channel::bounded(1).with_codec(|n: i32| n * 10, |n| n + 1);

                channel.send(4).unwrap();

                assert_eq!(channel.receive().unwrap().ready(), Some(41));
            })
            .unwrap();
        }

        #[test]
        fn applies_both_on_direct_handoff() {
            let log = Rc::new(RefCell::new(vec![]));

            start(|| {
                let channel = Channel::rendezvous().with_codec(|s: String| s + "!", |s| s.to_uppercase());
                let Recv::Wait(receiver) = channel.receive().unwrap() else {
                    panic!("nothing was sent yet");
                };
                receiver.bind(record(&log)).unwrap();

                channel.send("hi".to_string()).unwrap();
            })
            .unwrap();

            assert_eq!(*log.borrow(), vec![Wake::Value("HI!".to_string())]);
        }
    }

    mod waiter_limit {
        use super::*;

        #[test]
        fn refuses_receivers_beyond_limit() {
            let config = Config {
                waiter_limit: Some(2),
                ..Config::default()
            };

            start_with(config, || {
                let channel = Channel::<()>::rendezvous();
                channel.receive().unwrap();
                channel.receive().unwrap();

                let result = channel.receive();

                assert!(matches!(
                    result,
                    Err(crate::Error::TooManyWaiters { limit: 2, .. })
                ));
                assert_eq!(channel.waiting_receivers(), 2);
            })
            .unwrap();
        }

        #[test]
        fn refuses_senders_beyond_limit() {
            let config = Config {
                waiter_limit: Some(1),
                ..Config::default()
            };

            start_with(config, || {
                let channel = Channel::rendezvous();
                channel.send(1).unwrap();

                assert!(channel.send(2).is_err());
                assert_eq!(channel.waiting_senders(), 1);
            })
            .unwrap();
        }
    }
}
