//! Bounded single-producer/single-consumer byte pipe.
//!
//! The pipe connects incremental serialization (writer) with the outbound
//! request body (reader). Writes block while the pipe is full and reads
//! block while it is empty.
//!
//! End-of-stream rules:
//! - `PipeWriter::close` lets the reader drain what is buffered, then EOF
//! - dropping the writer without closing makes the reader fail, so a
//!   truncated stream is never mistaken for a complete one
//! - dropping the reader makes further writes fail with `BrokenPipe`
//! - `PipeHandle::abort` fails both sides immediately

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Default pipe capacity in bytes.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

struct State {
    buf: VecDeque<u8>,
    capacity: usize,
    closed: bool,
    writer_dropped: bool,
    reader_dropped: bool,
    aborted: bool,
}

struct Shared {
    state: Mutex<State>,
    readable: Condvar,
    writable: Condvar,
}

/// Creates a pipe holding at most `capacity` unread bytes.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            buf: VecDeque::with_capacity(capacity.clamp(1, DEFAULT_PIPE_CAPACITY)),
            capacity: capacity.max(1),
            closed: false,
            writer_dropped: false,
            reader_dropped: false,
            aborted: false,
        }),
        readable: Condvar::new(),
        writable: Condvar::new(),
    });

    (
        PipeWriter {
            shared: Arc::clone(&shared),
            closed: false,
        },
        PipeReader { shared },
    )
}

fn aborted() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "pipe aborted")
}

/// Writing half of a pipe.
pub struct PipeWriter {
    shared: Arc<Shared>,
    closed: bool,
}

impl PipeWriter {
    /// Returns a handle that can abort the pipe from another thread.
    pub fn handle(&self) -> PipeHandle {
        PipeHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Closes the pipe. The reader sees EOF once the buffer is drained.
    pub fn close(mut self) -> io::Result<()> {
        let mut state = self.shared.state.lock();
        if state.aborted {
            return Err(aborted());
        }
        state.closed = true;
        self.closed = true;
        self.shared.readable.notify_all();
        Ok(())
    }
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        let mut state = self.shared.state.lock();
        loop {
            if state.aborted {
                return Err(aborted());
            }
            if state.reader_dropped {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "pipe reader was dropped",
                ));
            }

            let free = state.capacity - state.buf.len();
            if free > 0 {
                let n = free.min(data.len());
                state.buf.extend(&data[..n]);
                self.shared.readable.notify_one();
                return Ok(n);
            }

            self.shared.writable.wait(&mut state);
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        if !self.closed {
            self.shared.state.lock().writer_dropped = true;
            self.shared.readable.notify_all();
        }
    }
}

/// Reading half of a pipe.
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Returns a handle that can abort the pipe from another thread.
    pub fn handle(&self) -> PipeHandle {
        PipeHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Read for PipeReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        let mut state = self.shared.state.lock();
        loop {
            if state.aborted {
                return Err(aborted());
            }

            if !state.buf.is_empty() {
                let n = out.len().min(state.buf.len());
                for (dst, src) in out.iter_mut().zip(state.buf.drain(..n)) {
                    *dst = src;
                }
                self.shared.writable.notify_one();
                return Ok(n);
            }

            if state.closed {
                return Ok(0);
            }
            if state.writer_dropped {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "pipe writer was dropped before closing the stream",
                ));
            }

            self.shared.readable.wait(&mut state);
        }
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.shared.state.lock().reader_dropped = true;
        self.shared.writable.notify_all();
    }
}

/// Shared handle used to abort a pipe or inspect its progress.
#[derive(Clone)]
pub struct PipeHandle {
    shared: Arc<Shared>,
}

impl PipeHandle {
    /// Fails every pending and future read or write on the pipe.
    pub fn abort(&self) {
        self.shared.state.lock().aborted = true;
        self.shared.readable.notify_all();
        self.shared.writable.notify_all();
    }

    /// Returns true once the pipe can no longer carry data.
    pub fn is_finished(&self) -> bool {
        let state = self.shared.state.lock();
        state.aborted
            || state.reader_dropped
            || ((state.closed || state.writer_dropped) && state.buf.is_empty())
    }

    /// Number of buffered bytes not yet read.
    pub fn buffered(&self) -> usize {
        self.shared.state.lock().buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn close_then_drain() {
        let (mut writer, mut reader) = pipe(16);
        writer.write_all(b"hello").unwrap();
        writer.close().unwrap();

        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn writer_blocks_until_reader_drains() {
        let (mut writer, mut reader) = pipe(4);
        let handle = writer.handle();

        let producer = thread::spawn(move || {
            writer.write_all(b"0123456789abcdef").unwrap();
            writer.close().unwrap();
        });

        thread::sleep(Duration::from_millis(50));
        assert_eq!(handle.buffered(), 4);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        producer.join().unwrap();
        assert_eq!(out, b"0123456789abcdef");
    }

    #[test]
    fn reader_blocks_until_data() {
        let (mut writer, mut reader) = pipe(8);
        let consumer = thread::spawn(move || {
            let mut buf = [0u8; 8];
            let n = reader.read(&mut buf).unwrap();
            buf[..n].to_vec()
        });

        thread::sleep(Duration::from_millis(20));
        writer.write_all(b"ab").unwrap();
        assert_eq!(consumer.join().unwrap(), b"ab");
    }

    #[test]
    fn dropped_writer_fails_reader() {
        let (mut writer, mut reader) = pipe(16);
        writer.write_all(b"{\"value\":[").unwrap();
        drop(writer);

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out, b"{\"value\":[");
    }

    #[test]
    fn dropped_reader_breaks_writer() {
        let (mut writer, reader) = pipe(16);
        drop(reader);
        let err = writer.write_all(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn abort_unblocks_both_sides() {
        let (mut writer, mut reader) = pipe(2);
        let handle = reader.handle();

        let producer = thread::spawn(move || writer.write_all(b"too long for the pipe"));
        thread::sleep(Duration::from_millis(20));
        handle.abort();

        assert!(producer.join().unwrap().is_err());
        assert!(reader.read(&mut [0u8; 4]).is_err());
        assert!(handle.is_finished());
    }

    #[test]
    fn finished_after_close_and_drain() {
        let (mut writer, mut reader) = pipe(8);
        let handle = writer.handle();
        writer.write_all(b"ab").unwrap();
        writer.close().unwrap();
        assert!(!handle.is_finished());

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert!(handle.is_finished());
    }
}
