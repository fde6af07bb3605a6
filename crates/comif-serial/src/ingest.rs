//! Background reader that stages raw bytes from a serial line.
//!
//! The reception thread never parses. It moves whatever bytes the line has into
//! a single-producer/single-consumer channel, and the consumer resolves frames
//! on demand.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use comif_frame::CobsDeframer;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Handle to a running reception thread and its staging channel.
pub struct Ingestor {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    chunks: Receiver<Bytes>,
    exited: Receiver<Option<std::io::Error>>,
    name: String,
}

impl Ingestor {
    /// Spawn a thread polling `reader` every `polling_interval` while it is idle.
    ///
    /// Reads returning `Ok(0)`, `WouldBlock` or `TimedOut` count as idle. Any other
    /// read error ends the thread and is reported by [`Ingestor::take_failure`].
    pub fn spawn<R>(name: String, reader: R, polling_interval: Duration) -> std::io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (chunk_tx, chunk_rx) = channel::unbounded();
        let (exit_tx, exit_rx) = channel::bounded(1);

        let handle = {
            let shutdown = Arc::clone(&shutdown);
            let name = name.clone();
            thread::Builder::new().name(name.clone()).spawn(move || {
                let failure = poll_line(&name, reader, &chunk_tx, &shutdown, polling_interval);
                let _ = exit_tx.send(failure);
            })?
        };

        debug!(thread = %name, ?polling_interval, "reception thread started");
        Ok(Self {
            handle: Some(handle),
            shutdown,
            chunks: chunk_rx,
            exited: exit_rx,
            name,
        })
    }

    /// Move every chunk staged so far into `deframer`'s parse buffer.
    ///
    /// Chunks staged while this runs are left for the next call. Returns the
    /// number of bytes moved.
    pub fn drain_into(&self, deframer: &mut CobsDeframer) -> usize {
        let staged = self.chunks.len();
        let mut moved = 0usize;
        for _ in 0..staged {
            match self.chunks.try_recv() {
                Ok(chunk) => {
                    moved += chunk.len();
                    deframer.extend(&chunk);
                }
                Err(_) => break,
            }
        }
        moved
    }

    /// Drop every staged chunk without parsing it.
    pub fn discard_staged(&self) -> usize {
        self.chunks.try_iter().map(|chunk| chunk.len()).sum()
    }

    /// Number of chunks waiting in the staging channel.
    pub fn staged_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// The read error that ended the thread, if it has died that way.
    ///
    /// Every chunk read before the failure is already staged when this returns
    /// `Some`. The error is handed out once.
    pub fn take_failure(&mut self) -> Option<std::io::Error> {
        match self.exited.try_recv() {
            Ok(failure) => failure,
            Err(_) => None,
        }
    }

    /// Whether the thread is still polling.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread to stop and wait up to `timeout` for it to exit.
    ///
    /// Returns `false` if the thread did not exit in time. It is then detached and
    /// exits on its own once its current read returns.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.shutdown.store(true, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return true;
        };

        match self.exited.recv_timeout(timeout) {
            Ok(_) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!(thread = %self.name, "reception thread panicked");
                }
                debug!(thread = %self.name, "reception thread stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    thread = %self.name,
                    ?timeout,
                    "reception thread did not stop in time; detaching"
                );
                false
            }
        }
    }
}

impl Drop for Ingestor {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

fn poll_line<R: Read>(
    name: &str,
    mut reader: R,
    chunks: &Sender<Bytes>,
    shutdown: &AtomicBool,
    polling_interval: Duration,
) -> Option<std::io::Error> {
    let mut buf = [0u8; READ_CHUNK_SIZE];

    while !shutdown.load(Ordering::Acquire) {
        match reader.read(&mut buf) {
            Ok(0) => thread::sleep(polling_interval),
            Ok(n) => {
                if chunks.send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                    debug!(thread = %name, "staging channel closed");
                    return None;
                }
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                thread::sleep(polling_interval)
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!(thread = %name, error = %err, "serial read failed; reception stopped");
                return Some(err);
            }
        }
    }
    None
}
