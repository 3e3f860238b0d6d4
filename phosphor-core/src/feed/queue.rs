//! Bounded packet queue between the demux producer and a decoder consumer.
//!
//! The queue is bounded by total payload bytes, not packet count. Writers
//! block while the budget is exceeded; readers block while the queue is
//! empty and still open. Each queue owns its own mutex and condvar so a
//! full video queue never wakes the audio consumer.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::errors::FeedError;

/// Default byte budget per queue.
pub const DEFAULT_QUEUE_BYTES: usize = 15 * 1024 * 1024;

/// Which elementary stream a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

/// An opaque compressed packet with its stream time.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub stream: StreamKind,
    pub pts: i64,
    pub data: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq)]
enum QueueState {
    Open,
    Eof,
    Aborted,
}

struct Inner {
    packets: VecDeque<Packet>,
    bytes: usize,
    state: QueueState,
}

pub struct PacketQueue {
    inner: Mutex<Inner>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
}

impl PacketQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                packets: VecDeque::new(),
                bytes: 0,
                state: QueueState::Open,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            capacity,
        }
    }

    /// Block until the packet fits, then enqueue it.
    pub fn push(&self, packet: Packet) -> Result<(), FeedError> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            match inner.state {
                QueueState::Aborted => return Err(FeedError::Aborted),
                QueueState::Eof => return Err(FeedError::EndOfStream),
                QueueState::Open => {}
            }
            if inner.bytes + packet.data.len() <= self.capacity || inner.packets.is_empty() {
                break;
            }
            inner = self.writable.wait(inner).unwrap();
        }
        inner.bytes += packet.data.len();
        inner.packets.push_back(packet);
        self.readable.notify_one();
        Ok(())
    }

    /// Block until a packet is available; `EndOfStream` once drained after
    /// EOF, `Aborted` immediately on abort.
    pub fn pop(&self) -> Result<Packet, FeedError> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.state == QueueState::Aborted {
                return Err(FeedError::Aborted);
            }
            if let Some(packet) = inner.packets.pop_front() {
                inner.bytes -= packet.data.len();
                self.writable.notify_one();
                return Ok(packet);
            }
            if inner.state == QueueState::Eof {
                return Err(FeedError::EndOfStream);
            }
            inner = self.readable.wait(inner).unwrap();
        }
    }

    /// Mark the writer finished; readers drain the remainder.
    pub fn finish(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == QueueState::Open {
            inner.state = QueueState::Eof;
        }
        self.readable.notify_all();
        self.writable.notify_all();
    }

    /// Cancel everything; waiters on either side return `Aborted`.
    pub fn abort(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = QueueState::Aborted;
        inner.packets.clear();
        inner.bytes = 0;
        self.readable.notify_all();
        self.writable.notify_all();
    }

    pub fn byte_len(&self) -> usize {
        self.inner.lock().unwrap().bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn packet(bytes: usize) -> Packet {
        Packet {
            stream: StreamKind::Video,
            pts: 0,
            data: vec![0u8; bytes],
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue = PacketQueue::new(1024);
        for pts in 0..4 {
            queue
                .push(Packet {
                    stream: StreamKind::Audio,
                    pts,
                    data: vec![1, 2, 3],
                })
                .unwrap();
        }
        for pts in 0..4 {
            assert_eq!(queue.pop().unwrap().pts, pts);
        }
    }

    #[test]
    fn test_drain_then_end_of_stream() {
        let queue = PacketQueue::new(1024);
        queue.push(packet(8)).unwrap();
        queue.finish();
        assert!(queue.pop().is_ok());
        assert_eq!(queue.pop(), Err(FeedError::EndOfStream));
    }

    #[test]
    fn test_abort_wakes_reader() {
        let queue = Arc::new(PacketQueue::new(1024));
        let reader = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };
        thread::sleep(std::time::Duration::from_millis(20));
        queue.abort();
        assert_eq!(reader.join().unwrap(), Err(FeedError::Aborted));
    }

    #[test]
    fn test_writer_blocks_at_capacity() {
        let queue = Arc::new(PacketQueue::new(16));
        queue.push(packet(16)).unwrap();
        let writer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(packet(16)))
        };
        thread::sleep(std::time::Duration::from_millis(20));
        assert!(!writer.is_finished());
        // Draining one packet releases the writer
        queue.pop().unwrap();
        writer.join().unwrap().unwrap();
        assert_eq!(queue.byte_len(), 16);
    }

    #[test]
    fn test_oversized_packet_admitted_when_empty() {
        // A single packet larger than the budget must not deadlock
        let queue = PacketQueue::new(8);
        queue.push(packet(64)).unwrap();
        assert_eq!(queue.pop().unwrap().data.len(), 64);
    }
}
