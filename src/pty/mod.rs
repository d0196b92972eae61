pub mod interrupt;

use std::env;
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use portable_pty::{ChildKiller, CommandBuilder, PtyPair, PtySize, native_pty_system};
use tracing::{debug, info, warn};

use crate::sink::TerminalSink;

/// How long to keep draining PTY output after the child has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Outcome of one command run, handed back to the model as the function result.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionResult {
    pub command: String,
    pub captured_output: String,
    pub spawn_error: Option<String>,
}

impl ExecutionResult {
    pub fn output_text(&self) -> String {
        match &self.spawn_error {
            Some(e) => format!("Error executing command: {e}"),
            None => self.captured_output.clone(),
        }
    }
}

struct Running {
    command: String,
    killer: Box<dyn ChildKiller + Send + Sync>,
}

/// The one command currently in flight, shared with the interrupt handler.
#[derive(Clone, Default)]
pub struct ActiveCommand {
    slot: Arc<Mutex<Option<Running>>>,
}

impl ActiveCommand {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<String> {
        self.lock().as_ref().map(|running| running.command.clone())
    }

    #[cfg(test)]
    pub fn is_idle(&self) -> bool {
        self.lock().is_none()
    }

    /// Kill the running command. Returns false when nothing was running.
    pub fn cancel(&self) -> bool {
        let mut slot = self.lock();
        let Some(running) = slot.as_mut() else {
            return false;
        };
        info!(command = %running.command, "cancelling command");
        if let Err(e) = running.killer.kill() {
            warn!(error = %e, "failed to kill command");
        }
        true
    }

    fn set(&self, command: &str, killer: Box<dyn ChildKiller + Send + Sync>) {
        *self.lock() = Some(Running {
            command: command.to_string(),
            killer,
        });
    }

    fn clear(&self) {
        self.lock().take();
    }

    fn lock(&self) -> MutexGuard<'_, Option<Running>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs shell commands under a pseudo-terminal, echoing and capturing output.
pub struct CommandRunner {
    shell: String,
    sink: TerminalSink,
    active: ActiveCommand,
}

impl CommandRunner {
    pub fn new(shell: impl Into<String>, sink: TerminalSink, active: ActiveCommand) -> Self {
        Self {
            shell: shell.into(),
            sink,
            active,
        }
    }

    #[cfg(test)]
    pub fn active(&self) -> &ActiveCommand {
        &self.active
    }

    /// Run `command` to completion. Spawn failures come back as text, never as errors.
    pub fn run(&self, command: &str) -> ExecutionResult {
        match self.run_in_pty(command) {
            Ok(captured_output) => ExecutionResult {
                command: command.to_string(),
                captured_output,
                spawn_error: None,
            },
            Err(e) => {
                warn!(command, error = %format!("{e:#}"), "command did not start");
                self.sink.write_str(&format!("Error: {e:#}\r\n"));
                ExecutionResult {
                    command: command.to_string(),
                    captured_output: String::new(),
                    spawn_error: Some(format!("{e:#}")),
                }
            }
        }
    }

    fn run_in_pty(&self, command: &str) -> Result<String> {
        let (cols, rows) = crossterm::terminal::size().unwrap_or((120, 32));
        let pair = native_pty_system()
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("failed to open pty")?;
        let PtyPair { master, slave } = pair;

        let mut reader = master
            .try_clone_reader()
            .context("failed to clone pty reader")?;

        let mut cmd = CommandBuilder::new(&self.shell);
        cmd.args(["-i", "-c", command]);
        if let Ok(dir) = env::current_dir() {
            cmd.cwd(dir);
        }

        let mut child = slave
            .spawn_command(cmd)
            .with_context(|| format!("failed to spawn {}", self.shell))?;
        // Only the child keeps the slave open, so reads hit EOF once it exits.
        drop(slave);
        self.active.set(command, child.clone_killer());
        debug!(command, shell = %self.shell, "command started");

        let captured = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();
        {
            let captured = Arc::clone(&captured);
            let stop = Arc::clone(&stop);
            let sink = self.sink.clone();
            thread::spawn(move || {
                relay(reader, &sink, &captured, &stop);
                let _ = done_tx.send(());
            });
        }

        let status = child.wait();
        self.active.clear();
        match &status {
            Ok(status) => info!(command, exit_code = status.exit_code(), "command finished"),
            Err(e) => warn!(command, error = %e, "failed to wait for command"),
        }

        if done_rx.recv_timeout(DRAIN_GRACE).is_err() {
            // Something else still holds the pty open (a background job). The
            // reader stays parked in read() until that closes, but it must not
            // print into later turns.
            stop.store(true, Ordering::SeqCst);
            warn!(command, "pty output still open after exit; using what was captured");
        }
        drop(master);

        let bytes = captured.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Copy PTY output to the terminal and the capture buffer until EOF or `stop`.
fn relay(
    mut reader: Box<dyn Read + Send>,
    sink: &TerminalSink,
    captured: &Mutex<Vec<u8>>,
    stop: &AtomicBool,
) {
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(_) if stop.load(Ordering::SeqCst) => {
                debug!("dropping pty output after the drain grace period");
                break;
            }
            Ok(n) => {
                sink.write(&buf[..n]);
                captured
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&buf[..n]);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

/// Login shell from `$SHELL`, or bash.
pub fn default_shell() -> String {
    env::var("SHELL")
        .ok()
        .filter(|shell| !shell.trim().is_empty())
        .unwrap_or_else(|| "/bin/bash".to_string())
}
