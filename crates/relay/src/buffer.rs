//! Bounded, two-ended byte relay.
//!
//! The delivery path writes, the consumer reads. Writers suspend while the
//! buffer holds `capacity` bytes, readers suspend while it is empty and no
//! terminal signal has been given. Exactly one terminal signal, either
//! [`complete`](RelayBuffer::complete) or [`fail`](RelayBuffer::fail), is
//! accepted per relay.

use core::mem;
use core::pin::pin;
use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::errors::{RelayError, StreamError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Terminal {
    Completed,
    Faulted,
}

#[derive(Debug)]
enum TerminalSignal {
    Completed,
    Faulted(StreamError),
}

#[derive(Debug, Default)]
struct State {
    chunks: VecDeque<Bytes>,
    buffered: usize,
    terminal: Option<TerminalSignal>,
    reader_gone: bool,
}

#[derive(Debug)]
pub struct RelayBuffer {
    capacity: usize,
    state: Mutex<State>,
    readable: Notify,
    writable: Notify,
}

impl RelayBuffer {
    /// A capacity of zero is raised to one, a relay must be able to hold a byte.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::default(),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes written but not yet read.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.state.lock().buffered
    }

    #[must_use]
    pub fn terminal(&self) -> Option<Terminal> {
        self.state.lock().terminal.as_ref().map(|signal| match signal {
            TerminalSignal::Completed => Terminal::Completed,
            TerminalSignal::Faulted(_) => Terminal::Faulted,
        })
    }

    /// Appends `bytes`, suspending whenever the relay is full.
    ///
    /// Input larger than the free space is split, so occupancy never exceeds
    /// the capacity. If the relay is terminated or abandoned while the writer
    /// is suspended, the unwritten remainder is dropped and the call fails.
    pub async fn write(&self, mut bytes: Bytes) -> Result<(), RelayError> {
        loop {
            let mut writable = pin!(self.writable.notified());
            let _ = writable.as_mut().enable();

            {
                let mut state = self.state.lock();

                if state.reader_gone {
                    return Err(RelayError::ReaderGone);
                }

                if state.terminal.is_some() {
                    return Err(RelayError::Closed);
                }

                let free = self.capacity.saturating_sub(state.buffered);

                if free > 0 && !bytes.is_empty() {
                    let piece = bytes.split_to(free.min(bytes.len()));

                    state.buffered = state.buffered.saturating_add(piece.len());
                    state.chunks.push_back(piece);

                    self.readable.notify_waiters();
                }

                if bytes.is_empty() {
                    return Ok(());
                }
            }

            writable.await;
        }
    }

    /// Returns up to `max` bytes, `None` once completed and drained, or the
    /// stored fault once faulted and drained.
    pub async fn read(&self, max: usize) -> Result<Option<Bytes>, StreamError> {
        if max == 0 {
            return Ok(Some(Bytes::new()));
        }

        loop {
            let mut readable = pin!(self.readable.notified());
            let _ = readable.as_mut().enable();

            {
                let mut state = self.state.lock();

                if let Some(front) = state.chunks.front_mut() {
                    let piece = if front.len() > max {
                        front.split_to(max)
                    } else {
                        mem::take(front)
                    };

                    if front.is_empty() {
                        let _ = state.chunks.pop_front();
                    }

                    state.buffered = state.buffered.saturating_sub(piece.len());

                    self.writable.notify_waiters();

                    return Ok(Some(piece));
                }

                match &state.terminal {
                    Some(TerminalSignal::Completed) => return Ok(None),
                    Some(TerminalSignal::Faulted(err)) => return Err(err.clone()),
                    None => {}
                }
            }

            readable.await;
        }
    }

    /// Marks the end of the data. Readers see end-of-stream once drained.
    pub fn complete(&self) -> Result<(), RelayError> {
        self.terminate(TerminalSignal::Completed)
    }

    /// Marks the relay faulted. Readers see `err` once drained.
    pub fn fail(&self, err: StreamError) -> Result<(), RelayError> {
        self.terminate(TerminalSignal::Faulted(err))
    }

    /// Releases buffered data and wakes suspended writers, which then fail
    /// with [`RelayError::ReaderGone`].
    pub fn abandon(&self) {
        let mut state = self.state.lock();

        state.reader_gone = true;
        state.chunks.clear();
        state.buffered = 0;

        self.writable.notify_waiters();
        self.readable.notify_waiters();
    }

    fn terminate(&self, signal: TerminalSignal) -> Result<(), RelayError> {
        let mut state = self.state.lock();

        if state.terminal.is_some() {
            return Err(RelayError::AlreadyTerminated);
        }

        state.terminal = Some(signal);

        self.readable.notify_waiters();
        self.writable.notify_waiters();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::timeout;
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;
    use crate::errors::ProtocolViolation;

    const PENDING: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_reads_in_write_order() {
        let relay = RelayBuffer::new(64);

        relay.write(Bytes::from_static(b"abc")).await.unwrap();
        relay.write(Bytes::from_static(b"defgh")).await.unwrap();
        relay.complete().unwrap();

        let mut out = Vec::new();
        while let Some(chunk) = relay.read(64).await.unwrap() {
            out.extend_from_slice(&chunk);
        }

        assert_eq!(out, b"abcdefgh");
    }

    #[tokio::test]
    async fn test_read_respects_max() {
        let relay = RelayBuffer::new(64);

        relay.write(Bytes::from_static(b"abcdef")).await.unwrap();

        assert_eq!(relay.read(4).await.unwrap().unwrap(), &b"abcd"[..]);
        assert_eq!(relay.read(4).await.unwrap().unwrap(), &b"ef"[..]);
        assert_eq!(relay.buffered(), 0);
    }

    #[tokio::test]
    async fn test_read_suspends_until_data_arrives() {
        let relay = Arc::new(RelayBuffer::new(16));

        assert!(timeout(PENDING, relay.read(16)).await.is_err());

        let reader = tokio::spawn({
            let relay = Arc::clone(&relay);
            async move { relay.read(16).await }
        });

        relay.write(Bytes::from_static(b"hi")).await.unwrap();

        assert_eq!(reader.await.unwrap().unwrap().unwrap(), &b"hi"[..]);
    }

    #[tokio::test]
    async fn test_write_suspends_at_capacity() {
        let relay = Arc::new(RelayBuffer::new(4));

        let writer = tokio::spawn({
            let relay = Arc::clone(&relay);
            async move { relay.write(Bytes::from_static(b"0123456789")).await }
        });

        tokio::time::sleep(PENDING).await;

        assert!(!writer.is_finished());
        assert_eq!(relay.buffered(), 4);

        let mut out = Vec::new();
        while out.len() < 10 {
            let chunk = relay.read(3).await.unwrap().unwrap();
            assert!(relay.buffered() <= relay.capacity());
            out.extend_from_slice(&chunk);
        }

        writer.await.unwrap().unwrap();

        assert_eq!(out, b"0123456789");
    }

    #[test]
    fn test_read_wakes_suspended_writer() {
        let relay = RelayBuffer::new(2);

        let mut write = task::spawn(relay.write(Bytes::from_static(b"abcd")));
        assert_pending!(write.poll());
        assert_eq!(relay.buffered(), 2);

        let mut read = task::spawn(relay.read(8));
        assert_eq!(assert_ready!(read.poll()).unwrap().unwrap(), &b"ab"[..]);

        assert!(write.is_woken());
        assert_ready!(write.poll()).unwrap();
        assert_eq!(relay.buffered(), 2);
    }

    #[tokio::test]
    async fn test_fault_surfaces_after_drain() {
        let relay = RelayBuffer::new(16);

        relay.write(Bytes::from_static(b"ok")).await.unwrap();
        relay
            .fail(StreamError::RemoteReported("boom".to_owned()))
            .unwrap();

        assert_eq!(relay.read(16).await.unwrap().unwrap(), &b"ok"[..]);
        assert_eq!(
            relay.read(16).await,
            Err(StreamError::RemoteReported("boom".to_owned()))
        );
        assert_eq!(relay.terminal(), Some(Terminal::Faulted));
    }

    #[tokio::test]
    async fn test_second_terminal_signal_is_rejected() {
        let relay = RelayBuffer::new(16);

        relay.complete().unwrap();

        assert_eq!(relay.complete(), Err(RelayError::AlreadyTerminated));
        assert_eq!(
            relay.fail(StreamError::Cancelled),
            Err(RelayError::AlreadyTerminated)
        );
        assert_eq!(relay.terminal(), Some(Terminal::Completed));
    }

    #[tokio::test]
    async fn test_write_after_terminal_fails() {
        let relay = RelayBuffer::new(16);

        relay
            .fail(StreamError::Protocol(ProtocolViolation::Overrun {
                declared: 1,
                received: 2,
            }))
            .unwrap();

        assert_eq!(
            relay.write(Bytes::from_static(b"late")).await,
            Err(RelayError::Closed)
        );
    }

    #[tokio::test]
    async fn test_fail_wakes_suspended_writer() {
        let relay = Arc::new(RelayBuffer::new(2));

        let writer = tokio::spawn({
            let relay = Arc::clone(&relay);
            async move { relay.write(Bytes::from_static(b"abcd")).await }
        });

        tokio::time::sleep(PENDING).await;
        relay.fail(StreamError::Cancelled).unwrap();

        assert_eq!(writer.await.unwrap(), Err(RelayError::Closed));
    }

    #[tokio::test]
    async fn test_abandon_wakes_suspended_writer() {
        let relay = Arc::new(RelayBuffer::new(2));

        let writer = tokio::spawn({
            let relay = Arc::clone(&relay);
            async move { relay.write(Bytes::from_static(b"abcd")).await }
        });

        tokio::time::sleep(PENDING).await;
        relay.abandon();

        assert_eq!(writer.await.unwrap(), Err(RelayError::ReaderGone));
        assert_eq!(relay.buffered(), 0);
    }
}
