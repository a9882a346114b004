//! Deadline ordered queue of timer callbacks.
//!
//! Timers never run callbacks themselves.
//! Once due, a callback is moved onto the ready queue and runs as an ordinary tick.

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use super::Task;

/// Handle for cancelling a scheduled timer.
///
/// The sequence number disambiguates timers sharing a deadline, so a stale handle never cancels a newer timer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct TimerHandle {
    deadline: Instant,
    sequence: u64,
}

#[derive(Default)]
pub(super) struct Timers {
    queue: BTreeMap<(Instant, u64), Task>,
    sequence: u64,
}

impl Timers {
    pub(super) fn insert(&mut self, deadline: Instant, task: Task) -> TimerHandle {
        let sequence = self.sequence;
        self.sequence += 1;

        self.queue.insert((deadline, sequence), task);

        TimerHandle { deadline, sequence }
    }

    /// Returns whether the timer was still pending.
    pub(super) fn remove(&mut self, handle: TimerHandle) -> bool {
        self.queue
            .remove(&(handle.deadline, handle.sequence))
            .is_some()
    }

    pub(super) fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Moves every callback due at `now` onto `ready`, earliest deadline first.
    pub(super) fn fire_due(&mut self, now: Instant, ready: &mut VecDeque<Task>) {
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 > now {
                break;
            }

            ready.push_back(entry.remove());
        }
    }

    pub(super) fn len(&self) -> usize {
        self.queue.len()
    }
}
