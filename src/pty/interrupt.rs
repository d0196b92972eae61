//! Ctrl+C handling: stop the running command, or leave when there is none.

use anyhow::Result;

use super::ActiveCommand;
use crate::sink::TerminalSink;

#[cfg(unix)]
pub fn install(active: ActiveCommand, sink: TerminalSink) -> Result<()> {
    use std::thread;

    use anyhow::Context;
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([libc::SIGINT]).context("failed to register SIGINT handler")?;
    thread::spawn(move || {
        for _ in signals.forever() {
            if should_exit(&active, &sink) {
                std::process::exit(130);
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
pub fn install(_active: ActiveCommand, _sink: TerminalSink) -> Result<()> {
    Ok(())
}

/// Cancel the running command. When idle, end the line and drain the sink so
/// nothing queued is lost, then report that the process should exit.
#[cfg_attr(not(unix), allow(dead_code))]
fn should_exit(active: &ActiveCommand, sink: &TerminalSink) -> bool {
    if active.cancel() {
        return false;
    }
    tracing::debug!("interrupt with no running command, exiting");
    sink.write_str("\n");
    sink.flush();
    true
}
