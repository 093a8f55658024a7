//! Non-blocking byte sources drained once per sampling cycle.

use std::io::{ErrorKind, Read};
use std::thread;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Bytes requested per read on a reader thread.
const READ_CHUNK: usize = 256;

/// A stream of bytes that can be drained without blocking.
pub trait ByteSource: Send {
    /// Append every byte available right now to `buf`.
    ///
    /// Returns the number of bytes appended.
    fn drain_into(&mut self, buf: &mut Vec<u8>) -> usize;
}

/// Bytes delivered over a channel by a reader thread or task.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Vec<u8>>,
    closed: bool,
}

impl ChannelSource {
    /// Wrap a receiver.
    #[must_use]
    pub fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { rx, closed: false }
    }

    /// Create a connected sender and source with room for `capacity` chunks.
    #[must_use]
    pub fn channel(capacity: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }

    /// Read `reader` on a dedicated thread until EOF or error.
    ///
    /// Blocking reads such as stdin or a serial device stay off the
    /// sampling thread. When the channel is full the reader blocks, not the
    /// consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn_reader<R>(name: &str, mut reader: R, capacity: usize) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, source) = Self::channel(capacity);
        let label = name.to_string();
        thread::Builder::new()
            .name(format!("{name}-reader"))
            .spawn(move || {
                let mut chunk = [0_u8; READ_CHUNK];
                loop {
                    match reader.read(&mut chunk) {
                        Ok(0) => {
                            debug!(source = %label, "input closed");
                            break;
                        }
                        Ok(n) => {
                            if tx.blocking_send(chunk[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::Interrupted => {}
                        Err(e) => {
                            warn!(source = %label, error = %e, "input read failed");
                            break;
                        }
                    }
                }
            })
            .map_err(|e| Error::internal(format!("failed to spawn {name} reader: {e}")))?;
        Ok(source)
    }

    /// Whether every sender has gone away and the channel is empty.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl ByteSource for ChannelSource {
    fn drain_into(&mut self, buf: &mut Vec<u8>) -> usize {
        let mut total = 0;
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => {
                    total += chunk.len();
                    buf.extend_from_slice(&chunk);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        total
    }
}

/// A source with no bytes, for intakes that have no link attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSource;

impl ByteSource for NullSource {
    fn drain_into(&mut self, _buf: &mut Vec<u8>) -> usize {
        0
    }
}

/// Split complete `\n`-terminated lines off the front of `buf`.
///
/// Trailing `\r` is stripped and invalid UTF-8 is replaced. A partial line
/// stays in `buf`. If the partial line grows past `max_line`, it is dropped.
pub(crate) fn take_lines(buf: &mut Vec<u8>, max_line: usize) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
        let mut line: Vec<u8> = buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        lines.push(String::from_utf8_lossy(&line).into_owned());
    }
    if buf.len() > max_line {
        buf.clear();
    }
    lines
}
