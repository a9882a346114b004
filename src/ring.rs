//! Fixed capacity FIFO queue backing buffered channels.
//!
//! Slots are allocated once, up front. The oldest item lives at `head`,
//! and the queue wraps around the end of the slice back to its start.
//!
//! slots: D E _ _ _ A B C
//!            ^tail ^head
//!
//! There's no synchronization, a ring is exclusively owned by its channel.

#[derive(Debug)]
pub struct Ring<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    len: usize,
}

impl<T> Ring<T> {
    /// Allocates room for exactly `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Ring {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    /// Appends `value` behind the newest item.
    ///
    /// Hands `value` back if the ring is full.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }

        let tail = (self.head + self.len) % self.capacity();
        self.slots[tail] = Some(value);
        self.len += 1;

        Ok(())
    }

    /// Removes and returns the oldest item.
    pub fn shift(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }

        let value = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;

        value
    }

    /// The oldest item, without removing it.
    pub fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }

        self.slots[self.head].as_ref()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }
}
