//! Test helpers shared by unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::driver::{Driver, Routine, Step};
use crate::gate::Wake;
use crate::routine::from_fn;
use crate::sync::channel::Channel;
use crate::sync::Recv;

/// Gate resumer that appends whatever the gate is released with to `log`.
pub(crate) fn record<T: 'static>(
    log: &Rc<RefCell<Vec<Wake<T>>>>,
) -> impl FnOnce(Wake<T>) -> crate::Result<()> {
    let log = log.clone();
    move |wake| {
        log.borrow_mut().push(wake);
        Ok(())
    }
}

/// Unstarted driver that sends `values` in order, suspending whenever a send has to wait.
pub(crate) fn producer<T: Clone + 'static>(
    channel: Channel<T>,
    values: Vec<T>,
    close_when_done: bool,
) -> Driver<(), impl Routine<Message = T, Output = ()>> {
    Driver::new(move |()| {
        let channel = channel.clone();
        let mut pending = VecDeque::from(values.clone());

        from_fn(move |_: Wake<T>| {
            while let Some(value) = pending.pop_front() {
                if let Some(gate) = channel.send(value)? {
                    return Ok(Step::Suspend(gate));
                }
            }

            if close_when_done {
                channel.close();
            }
            Ok(Step::Complete(()))
        })
    })
}

/// Unstarted driver that receives into `received` until the channel is closed.
pub(crate) fn consumer<T: Clone + 'static>(
    channel: Channel<T>,
    received: Rc<RefCell<Vec<T>>>,
) -> Driver<(), impl Routine<Message = T, Output = ()>> {
    Driver::new(move |()| {
        let channel = channel.clone();
        let received = received.clone();

        from_fn(move |wake: Wake<T>| {
            match wake {
                Wake::Value(value) => received.borrow_mut().push(value),
                Wake::Closed => return Ok(Step::Complete(())),
                Wake::Signal => {}
            }

            loop {
                match channel.receive()? {
                    Recv::Ready(value) => received.borrow_mut().push(value),
                    Recv::Wait(gate) => return Ok(Step::Suspend(gate)),
                    Recv::Closed => return Ok(Step::Complete(())),
                }
            }
        })
    })
}
