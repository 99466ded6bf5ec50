//! Command-line interface for the gdbctl session controller.

use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use libgdbctl::resolver::resolve_file_name;
use libgdbctl::{Controller, ControllerHandle, DebugEvent, Request, TargetConfig};
use log::{debug, info};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

/// Top-level argument parser describing the controller interface.
#[derive(Parser, Debug)]
#[command(
    name = "gdbctl",
    version = libgdbctl::version(),
    about = "Drive gdb and report what it does",
    long_about = None
)]
struct Cli {
    /// Target description in TOML; the other flags override its values.
    #[arg(long, conflicts_with = "prog")]
    config: Option<PathBuf>,
    /// Program to debug.
    #[arg(required_unless_present = "config")]
    prog: Option<PathBuf>,
    /// Working directory for gdb; defaults to the current directory.
    #[arg(long)]
    workdir: Option<PathBuf>,
    /// Shell command that launches gdb.
    #[arg(long)]
    gdb: Option<String>,
    /// Extra command issued after loading the program; repeatable.
    #[arg(long = "init")]
    init: Vec<String>,
    /// Arguments passed to the program.
    #[arg(last = true)]
    args: Vec<String>,
}

impl Cli {
    /// Build the target description from the config file and the flags.
    fn target(self) -> Result<TargetConfig> {
        let mut config = match (self.config, self.prog) {
            (Some(path), _) => TargetConfig::load(&path)
                .with_context(|| format!("loading {}", path.display()))?,
            (None, Some(prog)) => {
                let workdir = std::env::current_dir().context("no current directory")?;
                TargetConfig::new(prog, workdir)
            }
            (None, None) => anyhow::bail!("nothing to debug"),
        };
        if let Some(workdir) = self.workdir {
            config.work_dir = workdir;
        }
        if let Some(gdb) = self.gdb {
            config.gdb_cmd = gdb;
        }
        if !self.init.is_empty() {
            config.custom_init = self.init;
        }
        if !self.args.is_empty() {
            config.arguments = self.args.join(" ");
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let config = Cli::parse().target()?;
    debug_session(config)
}

fn debug_session(config: TargetConfig) -> Result<()> {
    info!("Debugging {} with `{}`", config.executable.display(), config.gdb_cmd);
    let (join, handle, events) = Controller::spawn();
    let printer = thread::spawn(move || print_events(events));

    handle.start(config.clone())?;
    let result = read_input(&handle, &config);

    handle.shutdown()?;
    if join.join().is_err() {
        anyhow::bail!("controller thread panicked");
    }
    // The event channel closes with the controller, ending the printer.
    let _ = printer.join();
    result
}

fn read_input(handle: &ControllerHandle, config: &TargetConfig) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("(gdbctl) ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(line)?;
                match parse_input(line, config) {
                    Some(Request::Shutdown) => return Ok(()),
                    Some(request) => handle.send(request)?,
                    None => eprintln!("usage: {line} FILE:LINE"),
                }
            }
            Err(ReadlineError::Interrupted) => handle.interrupt()?,
            Err(ReadlineError::Eof) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Map one line of user input onto a controller request.
///
/// Unknown words go to gdb verbatim; `None` means a location verb without a
/// usable `FILE:LINE`.
fn parse_input(line: &str, config: &TargetConfig) -> Option<Request> {
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let at = |rest: &str| -> Option<(PathBuf, u32)> {
        let (file, number) = rest.rsplit_once(':')?;
        let number = number.trim().parse().ok()?;
        Some((resolve_file_name(config, file.trim()), number))
    };

    let request = match verb {
        "b" | "toggle" => {
            let (file, line) = at(rest)?;
            Request::ToggleBreakpoint { file, line }
        }
        "jump" => {
            let (file, line) = at(rest)?;
            Request::MovePc { file, line }
        }
        "until" => {
            let (file, line) = at(rest)?;
            Request::RunToCursor { file, line }
        }
        "s" | "step" if rest.is_empty() => Request::StepInto,
        "n" | "next" if rest.is_empty() => Request::StepOver,
        "fin" | "finish" if rest.is_empty() => Request::StepOut,
        "c" | "continue" if rest.is_empty() => Request::Continue,
        "int" => Request::Interrupt,
        "kill" => Request::Kill,
        "rerun" => Request::Rerun,
        "quit" | "q" => Request::Shutdown,
        _ => Request::Raw(line.to_string()),
    };
    Some(request)
}

fn print_events(events: Receiver<DebugEvent>) {
    for event in events {
        match event {
            DebugEvent::OutputText(text) => println!("{text}"),
            DebugEvent::OutputError(text) => eprintln!("{text}"),
            DebugEvent::BreakpointSet { file, line } => {
                println!("[bp+] {}:{}", file.display(), line + 1)
            }
            DebugEvent::BreakpointCleared { file, line } => {
                println!("[bp-] {}:{}", file.display(), line + 1)
            }
            DebugEvent::LocationChanged { file, line } => {
                println!("[loc] {}:{}", file.display(), line + 1)
            }
            DebugEvent::StackFrameChanged(level) => println!("[frame] #{level}"),
            DebugEvent::StackFrameInfo { level, description } if !level.is_empty() => {
                println!("[stack] #{level}{description}")
            }
            DebugEvent::InfoLocal(text) if !text.is_empty() => println!("[var] {text}"),
            DebugEvent::ThreadInfo { id, current } if id >= 0 => {
                println!("[thread] {id}{}", if current { " *" } else { "" })
            }
            DebugEvent::ProgramEnded => println!("[program ended]"),
            DebugEvent::SessionEnded => println!("[session ended]"),
            DebugEvent::LaunchFailed(reason) => eprintln!("could not start debugger: {reason}"),
            other => debug!("{other:?}"),
        }
    }
}
