//! Single writer for everything that goes to the terminal.
//!
//! Model text and PTY passthrough come from different threads; both send
//! chunks here and one writer thread owns the output stream.

use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::debug;

enum Chunk {
    Bytes(Vec<u8>),
    Flush(Sender<()>),
}

#[derive(Clone)]
pub struct TerminalSink {
    tx: Sender<Chunk>,
}

impl TerminalSink {
    pub fn stdout() -> (Self, JoinHandle<()>) {
        Self::spawn(io::stdout())
    }

    pub fn spawn<W>(writer: W) -> (Self, JoinHandle<()>)
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || write_loop(writer, rx));
        (Self { tx }, handle)
    }

    pub fn write(&self, bytes: impl Into<Vec<u8>>) {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return;
        }
        // The writer only goes away at shutdown; late output is dropped.
        let _ = self.tx.send(Chunk::Bytes(bytes));
    }

    pub fn write_str(&self, text: &str) {
        self.write(text.as_bytes())
    }

    /// Block until everything queued so far has reached the writer.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.tx.send(Chunk::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

fn write_loop<W: Write>(mut writer: W, rx: Receiver<Chunk>) {
    for chunk in rx {
        match chunk {
            Chunk::Bytes(bytes) => {
                if let Err(e) = writer.write_all(&bytes).and_then(|()| writer.flush()) {
                    debug!(error = %e, "terminal write failed");
                }
            }
            Chunk::Flush(ack) => {
                let _ = writer.flush();
                let _ = ack.send(());
            }
        }
    }
    debug!("terminal sink closed");
}

/// In-memory writer for tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct SharedBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
