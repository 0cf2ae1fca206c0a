//! The byte queue linking a connection thread to its media forwarding
//! thread.
//!
//! This is the only cross-thread mutable state in the system: the
//! connection thread produces bytes, the per-stream forwarder consumes
//! them, and a mutex plus condition variable keep them in step.  Insertion
//! order is preserved and the producer wakes the consumer after every
//! append.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue stayed empty for the whole idle timeout.
    #[error("No data arrived within the idle timeout")]
    TimedOut,

    /// The producer marked the queue failed; nothing further will arrive.
    #[error("The producing side of the queue reported a failure")]
    Failed,

    /// Appending would exceed the capacity high-water mark.  The queue is
    /// marked failed, since dropping media bytes would corrupt the stream.
    #[error("Appending would exceed the queue capacity of {capacity} bytes")]
    Overflow { capacity: usize },
}

struct QueueState {
    buffer: VecDeque<u8>,
    finished: bool,
    failed: bool,
}

/// A bounded single-producer/single-consumer byte queue with explicit
/// end-of-stream.
pub struct MediaQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    capacity: usize,
}

impl MediaQueue {
    pub fn new(capacity: usize) -> MediaQueue {
        MediaQueue {
            state: Mutex::new(QueueState {
                buffer: VecDeque::new(),
                finished: false,
                failed: false,
            }),
            ready: Condvar::new(),
            capacity,
        }
    }

    /// Appends bytes and wakes the consumer.  Never blocks: the connection
    /// thread's only suspension points are its network system calls.
    pub fn push(&self, data: &[u8]) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        if state.failed {
            return Err(QueueError::Failed);
        }

        if state.buffer.len() + data.len() > self.capacity {
            state.failed = true;
            self.ready.notify_all();
            return Err(QueueError::Overflow {
                capacity: self.capacity,
            });
        }

        state.buffer.extend(data);
        self.ready.notify_one();
        Ok(())
    }

    /// Blocks until bytes are available and copies up to `dest.len()` of
    /// them out, returning how many were written.
    ///
    /// Returns `Ok(0)` at end of stream, [`QueueError::TimedOut`] when the
    /// queue stays empty for `idle_timeout`, and [`QueueError::Failed`]
    /// once the producer has reported a failure.
    pub fn read(&self, dest: &mut [u8], idle_timeout: Duration) -> Result<usize, QueueError> {
        let deadline = Instant::now() + idle_timeout;
        let mut state = self.state.lock().unwrap();

        loop {
            if state.failed {
                return Err(QueueError::Failed);
            }

            if !state.buffer.is_empty() {
                let count = dest.len().min(state.buffer.len());
                for (slot, byte) in dest.iter_mut().zip(state.buffer.drain(..count)) {
                    *slot = byte;
                }

                return Ok(count);
            }

            if state.finished {
                return Ok(0);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(QueueError::TimedOut);
            }

            let (guard, _) = self.ready.wait_timeout(state, deadline - now).unwrap();
            state = guard;
        }
    }

    /// Marks the end of the stream; readers drain what is buffered and then
    /// see `Ok(0)`.
    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap();
        state.finished = true;
        self.ready.notify_all();
    }

    /// Marks the queue failed; readers see [`QueueError::Failed`].
    pub fn fail(&self) {
        let mut state = self.state.lock().unwrap();
        state.failed = true;
        self.ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SHORT: Duration = Duration::from_millis(50);

    #[test]
    fn bytes_come_out_in_insertion_order() {
        let queue = MediaQueue::new(1024);
        queue.push(&[1, 2, 3]).unwrap();
        queue.push(&[4, 5]).unwrap();

        let mut dest = [0_u8; 16];
        let count = queue.read(&mut dest, SHORT).unwrap();
        assert_eq!(&dest[..count], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn short_destination_leaves_the_rest_queued() {
        let queue = MediaQueue::new(1024);
        queue.push(&[1, 2, 3, 4, 5]).unwrap();

        let mut dest = [0_u8; 2];
        assert_eq!(queue.read(&mut dest, SHORT).unwrap(), 2);
        assert_eq!(dest, [1, 2]);
        assert_eq!(queue.read(&mut dest, SHORT).unwrap(), 2);
        assert_eq!(dest, [3, 4]);
    }

    #[test]
    fn finish_drains_then_signals_end_of_stream() {
        let queue = MediaQueue::new(1024);
        queue.push(&[9]).unwrap();
        queue.finish();

        let mut dest = [0_u8; 4];
        assert_eq!(queue.read(&mut dest, SHORT).unwrap(), 1);
        assert_eq!(queue.read(&mut dest, SHORT).unwrap(), 0);
    }

    #[test]
    fn empty_queue_times_out() {
        let queue = MediaQueue::new(1024);

        let mut dest = [0_u8; 4];
        assert_eq!(queue.read(&mut dest, SHORT), Err(QueueError::TimedOut));
    }

    #[test]
    fn overflow_marks_the_queue_failed() {
        let queue = MediaQueue::new(4);
        assert_eq!(
            queue.push(&[1, 2, 3, 4, 5]),
            Err(QueueError::Overflow { capacity: 4 })
        );

        let mut dest = [0_u8; 4];
        assert_eq!(queue.read(&mut dest, SHORT), Err(QueueError::Failed));
        assert_eq!(queue.push(&[1]), Err(QueueError::Failed));
    }

    #[test]
    fn a_waiting_reader_is_woken_by_a_push() {
        let queue = Arc::new(MediaQueue::new(1024));

        let reader = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut dest = [0_u8; 8];
                let count = queue.read(&mut dest, Duration::from_secs(5)).unwrap();
                dest[..count].to_vec()
            })
        };

        thread::sleep(Duration::from_millis(20));
        queue.push(&[42, 43]).unwrap();

        assert_eq!(reader.join().unwrap(), vec![42, 43]);
    }
}
