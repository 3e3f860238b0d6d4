//! Front/back frame double-buffer with repeat ticks.
//!
//! One producer and one consumer. The producer posts fresh frames or
//! repeat markers; the consumer takes them in order, blocking while the
//! buffer is empty. At most two slots are ever held, which is the
//! backpressure that stalls the scaler until the composer flips.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::errors::FeedError;

/// What the consumer receives on each flip.
#[derive(Debug, PartialEq, Eq)]
pub enum Tick<T> {
    /// A newly produced frame.
    Fresh(T),
    /// Repeat whatever was consumed last.
    Repeat,
}

struct Inner<T> {
    slots: VecDeque<Tick<T>>,
    eof: bool,
    aborted: bool,
}

pub struct DoubleBuffer<T> {
    inner: Mutex<Inner<T>>,
    readable: Condvar,
    writable: Condvar,
}

impl<T> DoubleBuffer<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: VecDeque::with_capacity(2),
                eof: false,
                aborted: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    fn put(&self, tick: Tick<T>) -> Result<(), FeedError> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.aborted {
                return Err(FeedError::Aborted);
            }
            if inner.slots.len() < 2 {
                break;
            }
            inner = self.writable.wait(inner).unwrap();
        }
        inner.slots.push_back(tick);
        self.readable.notify_one();
        Ok(())
    }

    /// Post a fresh frame into the back slot.
    pub fn put_fresh(&self, value: T) -> Result<(), FeedError> {
        self.put(Tick::Fresh(value))
    }

    /// Post a repeat marker: the consumer re-presents its last frame.
    pub fn put_repeat(&self) -> Result<(), FeedError> {
        self.put(Tick::Repeat)
    }

    /// Take the next tick, blocking while empty. `EndOfStream` after the
    /// producer finished and the slots drained.
    pub fn take(&self) -> Result<Tick<T>, FeedError> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.aborted {
                return Err(FeedError::Aborted);
            }
            if let Some(tick) = inner.slots.pop_front() {
                self.writable.notify_one();
                return Ok(tick);
            }
            if inner.eof {
                return Err(FeedError::EndOfStream);
            }
            inner = self.readable.wait(inner).unwrap();
        }
    }

    /// Non-blocking variant; `None` when nothing is pending.
    pub fn try_take(&self) -> Result<Option<Tick<T>>, FeedError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.aborted {
            return Err(FeedError::Aborted);
        }
        match inner.slots.pop_front() {
            Some(tick) => {
                self.writable.notify_one();
                Ok(Some(tick))
            }
            None if inner.eof => Err(FeedError::EndOfStream),
            None => Ok(None),
        }
    }

    pub fn finish(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.eof = true;
        self.readable.notify_all();
    }

    pub fn abort(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.aborted = true;
        inner.slots.clear();
        self.readable.notify_all();
        self.writable.notify_all();
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().slots.len()
    }
}

impl<T> Default for DoubleBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fresh_and_repeat_order() {
        let buffer = DoubleBuffer::new();
        buffer.put_fresh(1u32).unwrap();
        buffer.put_repeat().unwrap();
        assert_eq!(buffer.take().unwrap(), Tick::Fresh(1));
        assert_eq!(buffer.take().unwrap(), Tick::Repeat);
    }

    #[test]
    fn test_never_holds_more_than_two() {
        let buffer = Arc::new(DoubleBuffer::new());
        buffer.put_fresh(1u32).unwrap();
        buffer.put_fresh(2u32).unwrap();
        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.put_fresh(3u32))
        };
        thread::sleep(std::time::Duration::from_millis(20));
        assert!(!producer.is_finished());
        assert_eq!(buffer.pending(), 2);
        buffer.take().unwrap();
        producer.join().unwrap().unwrap();
        assert_eq!(buffer.pending(), 2);
    }

    #[test]
    fn test_finish_drains_then_ends() {
        let buffer = DoubleBuffer::new();
        buffer.put_fresh(7u32).unwrap();
        buffer.finish();
        assert_eq!(buffer.take().unwrap(), Tick::Fresh(7));
        assert_eq!(buffer.take(), Err(FeedError::EndOfStream));
    }

    #[test]
    fn test_abort_releases_consumer() {
        let buffer: Arc<DoubleBuffer<u32>> = Arc::new(DoubleBuffer::new());
        let consumer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.take())
        };
        thread::sleep(std::time::Duration::from_millis(20));
        buffer.abort();
        assert_eq!(consumer.join().unwrap(), Err(FeedError::Aborted));
    }

    #[test]
    fn test_try_take_empty_is_none() {
        let buffer: DoubleBuffer<u32> = DoubleBuffer::new();
        assert_eq!(buffer.try_take().unwrap(), None);
        buffer.put_fresh(4).unwrap();
        assert_eq!(buffer.try_take().unwrap(), Some(Tick::Fresh(4)));
    }
}
