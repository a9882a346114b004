//! Connects channels to code outside of routines.
//!
//! [`Port`] is the common surface of every channel kind.
//! The free functions operate on any port, and [`sender`] turns a port into a plain callback for event emitters.
//!
//! # Examples
//! ```
//! use aryn::bridge::{self, EventSource, Listener};
//! use aryn::{runtime, Channel};
//!
//! #[derive(Default)]
//! struct Button {
//!     clicks: Vec<Listener<u32>>,
//! }
//!
//! impl EventSource<u32> for Button {
//!     fn on(&mut self, event: &str, listener: Listener<u32>) -> Result<(), Listener<u32>> {
//!         if event != "click" {
//!             return Err(listener);
//!         }
//!         self.clicks.push(listener);
//!         Ok(())
//!     }
//! }
//!
//! runtime::start(|| {
//!     let mut button = Button::default();
//!     let channel = bridge::listen(&mut button, "click", Channel::bounded(8), |x| x * 10).unwrap();
//!
//!     for listener in &mut button.clicks {
//!         (*listener)(4);
//!     }
//!
//!     assert_eq!(channel.receive().unwrap().ready(), Some(40));
//! })
//! .unwrap();
//! ```

use crate::gate::Gate;
use crate::sync::broadcast::Broadcast;
use crate::sync::channel::Channel;
use crate::sync::Recv;

/// Operations shared by every channel kind.
pub trait Port<T> {
    /// See [`Channel::send`].
    /// Broadcast sends never return a gate.
    fn send(&self, value: T) -> crate::Result<Option<Gate<T>>>;

    /// See [`Channel::receive`].
    fn receive(&self) -> crate::Result<Recv<T>>;

    /// See [`Channel::close`].
    fn close(&self);
}

impl<T: 'static> Port<T> for Channel<T> {
    fn send(&self, value: T) -> crate::Result<Option<Gate<T>>> {
        Channel::send(self, value)
    }

    fn receive(&self) -> crate::Result<Recv<T>> {
        Channel::receive(self)
    }

    fn close(&self) {
        Channel::close(self)
    }
}

impl<T: Clone + 'static> Port<T> for Broadcast<T> {
    fn send(&self, value: T) -> crate::Result<Option<Gate<T>>> {
        Broadcast::send(self, value).map(|()| None)
    }

    fn receive(&self) -> crate::Result<Recv<T>> {
        Broadcast::receive(self)
    }

    fn close(&self) {
        Broadcast::close(self)
    }
}

pub fn send<T>(port: &impl Port<T>, value: T) -> crate::Result<Option<Gate<T>>> {
    port.send(value)
}

pub fn receive<T>(port: &impl Port<T>) -> crate::Result<Recv<T>> {
    port.receive()
}

pub fn close<T>(port: &impl Port<T>) {
    port.close()
}

/// Callback that maps each event and sends it into `port`.
///
/// Sends that fail, for example because the port is closed, are logged and dropped.
/// Sends that would have to wait keep their message parked in the port, the gate is discarded.
pub fn sender<T, E, P>(port: P, map: impl Fn(E) -> T) -> impl FnMut(E)
where
    P: Port<T>,
{
    move |event| {
        if let Err(error) = port.send(map(event)) {
            log::warn!("dropped event: {error}");
        }
    }
}

/// Boxed event callback handed to an [`EventSource`].
pub type Listener<E> = Box<dyn FnMut(E)>;

/// Registration methods [`listen`] tries, in order.
pub const EVENT_REGISTRATION_METHODS: [&str; 3] = ["add_event_listener", "attach_event", "on"];

/// Something that emits named events.
///
/// Implement whichever registration method the source supports.
/// The defaults decline by handing the listener back.
pub trait EventSource<E> {
    fn add_event_listener(&mut self, _event: &str, listener: Listener<E>) -> Result<(), Listener<E>> {
        Err(listener)
    }

    fn attach_event(&mut self, _event: &str, listener: Listener<E>) -> Result<(), Listener<E>> {
        Err(listener)
    }

    fn on(&mut self, _event: &str, listener: Listener<E>) -> Result<(), Listener<E>> {
        Err(listener)
    }
}

type Register<S, E> = fn(&mut S, &str, Listener<E>) -> Result<(), Listener<E>>;

/// [`EVENT_REGISTRATION_METHODS`] paired with the trait methods they name.
fn registrations<S, E>() -> [(&'static str, Register<S, E>); 3]
where
    S: EventSource<E> + ?Sized,
{
    [
        ("add_event_listener", <S as EventSource<E>>::add_event_listener),
        ("attach_event", <S as EventSource<E>>::attach_event),
        ("on", <S as EventSource<E>>::on),
    ]
}

/// Registers a [`sender`] into `port` as a listener for `event`, and returns the port.
///
/// Tries each of [`EVENT_REGISTRATION_METHODS`] until one accepts the listener.
/// Fails with [`crate::Error::NoEventRegistration`] if none does.
pub fn listen<T, E, P, S>(
    source: &mut S,
    event: &str,
    port: P,
    map: impl Fn(E) -> T + 'static,
) -> crate::Result<P>
where
    S: EventSource<E> + ?Sized,
    P: Port<T> + Clone + 'static,
    T: 'static,
    E: 'static,
{
    let mut listener: Listener<E> = Box::new(sender(port.clone(), map));

    for (method, register) in registrations::<S, E>() {
        match register(source, event, listener) {
            Ok(()) => {
                log::debug!("listening to {event:?} through {method}");
                return Ok(port);
            }
            Err(declined) => listener = declined,
        }
    }

    Err(crate::Error::NoEventRegistration)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;
    use crate::gate::Wake;
    use crate::runtime::start;

    /// Accepts listeners through `on` only.
    #[derive(Default)]
    struct Emitter {
        listeners: Vec<(String, Listener<i32>)>,
    }

    impl Emitter {
        fn emit(&mut self, event: &str, payload: i32) {
            for (name, listener) in &mut self.listeners {
                if name == event {
                    (*listener)(payload);
                }
            }
        }
    }

    impl EventSource<i32> for Emitter {
        fn on(&mut self, event: &str, listener: Listener<i32>) -> Result<(), Listener<i32>> {
            self.listeners.push((event.to_string(), listener));
            Ok(())
        }
    }

    /// Supports every registration method and records which one was used.
    #[derive(Default)]
    struct Recorder {
        used: Vec<&'static str>,
        accept_first: bool,
    }

    impl EventSource<()> for Recorder {
        fn add_event_listener(&mut self, _: &str, listener: Listener<()>) -> Result<(), Listener<()>> {
            self.used.push("add_event_listener");
            match self.accept_first {
                true => Ok(()),
                false => Err(listener),
            }
        }

        fn attach_event(&mut self, _: &str, _: Listener<()>) -> Result<(), Listener<()>> {
            self.used.push("attach_event");
            Ok(())
        }

        fn on(&mut self, _: &str, _: Listener<()>) -> Result<(), Listener<()>> {
            self.used.push("on");
            Ok(())
        }
    }

    struct Silent;

    impl EventSource<i32> for Silent {}

    mod port {
        use super::*;

        #[test]
        fn free_functions_work_on_channels() {
            start(|| {
                let channel = Channel::bounded(1);

                assert!(send(&channel, 3).unwrap().is_none());
                assert_eq!(receive(&channel).unwrap().ready(), Some(3));

                close(&channel);
                assert!(channel.is_closed());
            })
            .unwrap();
        }

        #[test]
        fn broadcast_send_never_waits() {
            start(|| {
                let broadcast = Broadcast::new(Duration::ZERO);

                assert!(send(&broadcast, 'x').unwrap().is_none());
            })
            .unwrap();
        }

        #[test]
        fn generic_over_channel_kind() {
            fn waits(port: &dyn Port<u8>) -> bool {
                port.receive().map(|recv| matches!(recv, Recv::Wait(_))).unwrap_or(false)
            }

            start(|| {
                assert!(waits(&Channel::rendezvous()));
                assert!(waits(&Broadcast::new(Duration::ZERO)));
            })
            .unwrap();
        }
    }

    mod sender {
        use super::*;

        #[test]
        fn maps_and_forwards() {
            start(|| {
                let channel = Channel::bounded(2);
                let mut callback = sender(channel.clone(), |s: &str| s.len());

                callback("four");
                callback("hi");

                assert_eq!(channel.receive().unwrap().ready(), Some(4));
                assert_eq!(channel.receive().unwrap().ready(), Some(2));
            })
            .unwrap();
        }

        #[test]
        fn keeps_message_parked_when_port_is_full() {
            start(|| {
                let channel = Channel::rendezvous();
                let mut callback = sender(channel.clone(), |n: i32| n);

                callback(9);

                assert_eq!(channel.waiting_senders(), 1);
                assert_eq!(channel.receive().unwrap().ready(), Some(9));
            })
            .unwrap();
        }

        #[test]
        fn drops_events_after_close() {
            start(|| {
                let channel = Channel::<i32>::bounded(1);
                channel.close();
                let mut callback = sender(channel.clone(), |n| n);

                callback(1);

                assert!(channel.receive().unwrap().is_closed());
            })
            .unwrap();
        }
    }

    mod listen {
        use super::*;

        #[test]
        fn forwards_emitted_events() {
            let log = Rc::new(RefCell::new(vec![]));

            start(|| {
                let mut emitter = Emitter::default();
                let channel = listen(&mut emitter, "data", Channel::rendezvous(), |n| n + 1).unwrap();

                let Recv::Wait(gate) = channel.receive().unwrap() else {
                    panic!("nothing emitted yet");
                };
                gate.bind(crate::utils::record(&log)).unwrap();

                emitter.emit("other", 0);
                emitter.emit("data", 41);
            })
            .unwrap();

            assert_eq!(*log.borrow(), vec![Wake::Value(42)]);
        }

        #[test]
        fn prefers_methods_in_order() {
            start(|| {
                let mut source = Recorder {
                    accept_first: true,
                    ..Recorder::default()
                };
                listen(&mut source, "e", Channel::<()>::rendezvous(), |()| ()).unwrap();
                assert_eq!(source.used, vec!["add_event_listener"]);

                let mut source = Recorder::default();
                listen(&mut source, "e", Channel::<()>::rendezvous(), |()| ()).unwrap();
                assert_eq!(source.used, vec!["add_event_listener", "attach_event"]);
            })
            .unwrap();
        }

        #[test]
        fn dispatches_every_listed_method() {
            let names = registrations::<Recorder, ()>().map(|(name, _)| name);

            assert_eq!(names, EVENT_REGISTRATION_METHODS);
        }

        #[test]
        fn fails_without_registration_method() {
            let result = listen(&mut Silent, "data", Channel::<i32>::rendezvous(), |n| n);

            assert!(matches!(result, Err(crate::Error::NoEventRegistration)));
        }
    }
}
