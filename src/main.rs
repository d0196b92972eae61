mod config;
mod error;
mod function_call;
mod llm;
mod orchestrator;
mod pty;
mod render;
mod session;
mod sink;

use std::env;
use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result};
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use tracing::{debug, info, warn};

use crate::config::{Config, SystemInfo, render_prompt};
use crate::orchestrator::{Orchestrator, TurnOutcome};
use crate::pty::{ActiveCommand, CommandRunner, interrupt};
use crate::session::ConversationSession;
use crate::sink::TerminalSink;

fn main() -> Result<()> {
    init_logging();

    let config = Config::load()?;
    let shell = config.shell_path();
    let sys_info = SystemInfo::collect(&shell);
    let system_prompt = render_prompt(&config.prompt.template, &sys_info.to_vars());

    // Missing credentials end the process here, before any turn.
    let provider = llm::build_provider(&config.llm)?;

    let (sink, _writer) = TerminalSink::stdout();
    let active = ActiveCommand::new();
    interrupt::install(active.clone(), sink.clone())?;

    let runner = CommandRunner::new(shell, sink.clone(), active);
    let mut orchestrator = Orchestrator::new(
        provider,
        ConversationSession::new(system_prompt),
        runner,
        sink.clone(),
        config.timeouts.turn_timeouts(),
    );
    info!(provider = orchestrator.provider_name(), "aurora ready");

    let args: Vec<String> = env::args().skip(1).collect();
    if !args.is_empty() {
        let prompt = args.join(" ");
        if io::stdout().is_terminal() {
            let res = orchestrator.stream_turn(&prompt);
            sink.write_str("\n");
            sink.flush();
            res?;
        } else {
            // Piped output: one plain answer, no commands.
            let answer = orchestrator.ask(&prompt)?;
            sink.write_str(&format!("{}\n", render::translate(&answer)));
            sink.flush();
        }
        return Ok(());
    }

    run_repl(&mut orchestrator, &sink)?;
    info!(messages = orchestrator.session().len(), "session ended");
    Ok(())
}

fn init_logging() {
    // stderr keeps log lines out of the stdout sink
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
}

fn prompt(sink: &TerminalSink) {
    sink.write_str("\x1b[36maurora>\x1b[0m ");
    sink.flush();
}

fn run_repl(orchestrator: &mut Orchestrator, sink: &TerminalSink) -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        prompt(sink);
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("failed to read stdin")?;
        let line = line.trim();

        match line {
            "" => continue,
            "exit" | "quit" => break,
            "clear" => {
                sink.flush();
                let mut stdout = io::stdout();
                execute!(stdout, Clear(ClearType::All), crossterm::cursor::MoveTo(0, 0))?;
                stdout.flush().ok();
                continue;
            }
            _ => {}
        }

        match orchestrator.stream_turn(line) {
            Ok(TurnOutcome::Reply(text)) => {
                debug!(chars = text.len(), "reply committed");
            }
            Ok(TurnOutcome::Executed {
                result,
                interpretation,
            }) => {
                if result.spawn_error.is_some() {
                    warn!(command = %result.command, "command failed to start");
                }
                debug!(
                    command = %result.command,
                    output_bytes = result.captured_output.len(),
                    interpretation_chars = interpretation.len(),
                    "command turn committed"
                );
            }
            Err(e) => {
                sink.write_str(&format!("\n\x1b[31mError: {e}\x1b[0m"));
            }
        }
        sink.write_str("\n");
    }

    sink.flush();
    Ok(())
}
