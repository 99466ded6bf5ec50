//! Single-threaded event loop around a [`Session`].
//!
//! Output chunks from the reader threads and host requests arrive on one
//! channel. After each message the loop drains whatever else is already
//! queued and only then runs the session's deferred tasks, so an error line
//! that arrived together with a prompt is classified before the next command
//! goes out.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use crate::config::TargetConfig;
use crate::errors::{GdbCtlError, GdbCtlResult};
use crate::events::DebugEvent;
use crate::process::{Channel, GdbProcess, KILL_TIMEOUT, ProcessOutput};
use crate::session::Session;

/// Something the host asks the controller to do. Lines are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Start(TargetConfig),
    ToggleBreakpoint { file: PathBuf, line: u32 },
    MovePc { file: PathBuf, line: u32 },
    RunToCursor { file: PathBuf, line: u32 },
    Interrupt,
    Kill,
    Rerun,
    StepInto,
    StepOver,
    StepOut,
    Continue,
    /// Any command text, `(Q)` prefix allowed.
    Raw(String),
    Shutdown,
}

/// Everything the controller loop consumes.
#[derive(Debug)]
pub enum LoopMessage {
    Output(ProcessOutput),
    Request(Request),
}

impl From<ProcessOutput> for LoopMessage {
    fn from(output: ProcessOutput) -> Self {
        LoopMessage::Output(output)
    }
}

/// Cloneable sending side used by the host.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: Sender<LoopMessage>,
}

impl ControllerHandle {
    /// Queue a request for the loop.
    pub fn send(&self, request: Request) -> GdbCtlResult<()> {
        self.tx
            .send(LoopMessage::Request(request))
            .map_err(|_| GdbCtlError::ControllerGone)
    }

    /// Start a session, or restart the running one with `config`.
    pub fn start(&self, config: TargetConfig) -> GdbCtlResult<()> {
        self.send(Request::Start(config))
    }

    /// Set or clear a breakpoint at `file:line`.
    pub fn toggle_breakpoint(&self, file: impl Into<PathBuf>, line: u32) -> GdbCtlResult<()> {
        self.send(Request::ToggleBreakpoint {
            file: file.into(),
            line,
        })
    }

    /// Move the program counter to `file:line`.
    pub fn move_pc(&self, file: impl Into<PathBuf>, line: u32) -> GdbCtlResult<()> {
        self.send(Request::MovePc {
            file: file.into(),
            line,
        })
    }

    /// Run until `file:line`.
    pub fn run_to_cursor(&self, file: impl Into<PathBuf>, line: u32) -> GdbCtlResult<()> {
        self.send(Request::RunToCursor {
            file: file.into(),
            line,
        })
    }

    /// Interrupt the debuggee.
    pub fn interrupt(&self) -> GdbCtlResult<()> {
        self.send(Request::Interrupt)
    }

    /// Kill the debuggee.
    pub fn kill(&self) -> GdbCtlResult<()> {
        self.send(Request::Kill)
    }

    /// Kill and restart the debuggee.
    pub fn rerun(&self) -> GdbCtlResult<()> {
        self.send(Request::Rerun)
    }

    /// Step into.
    pub fn step_into(&self) -> GdbCtlResult<()> {
        self.send(Request::StepInto)
    }

    /// Step over.
    pub fn step_over(&self) -> GdbCtlResult<()> {
        self.send(Request::StepOver)
    }

    /// Step out of the current function.
    pub fn step_out(&self) -> GdbCtlResult<()> {
        self.send(Request::StepOut)
    }

    /// Resume the debuggee.
    pub fn continue_execution(&self) -> GdbCtlResult<()> {
        self.send(Request::Continue)
    }

    /// Send command text as typed.
    pub fn raw(&self, command: impl Into<String>) -> GdbCtlResult<()> {
        self.send(Request::Raw(command.into()))
    }

    /// Stop the loop and the debugger.
    pub fn shutdown(&self) -> GdbCtlResult<()> {
        self.send(Request::Shutdown)
    }
}

/// Owns the session and serializes output and requests through one loop.
pub struct Controller {
    rx: Receiver<LoopMessage>,
    tx: Sender<LoopMessage>,
    session: Session<GdbProcess>,
    open_channels: usize,
}

impl Controller {
    /// Controller plus its request handle and event receiver.
    pub fn new() -> (Self, ControllerHandle, Receiver<DebugEvent>) {
        let (tx, rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let controller = Self {
            rx,
            tx: tx.clone(),
            session: Session::new(event_tx),
            open_channels: 0,
        };
        (controller, ControllerHandle { tx }, event_rx)
    }

    /// Run the loop on its own thread.
    pub fn spawn() -> (
        JoinHandle<()>,
        ControllerHandle,
        Receiver<DebugEvent>,
    ) {
        let (controller, handle, events) = Self::new();
        let join = thread::spawn(move || controller.run());
        (join, handle, events)
    }

    /// Process messages until [`Request::Shutdown`].
    pub fn run(mut self) {
        'outer: while let Ok(message) = self.rx.recv() {
            if !self.handle(message) {
                break;
            }
            loop {
                match self.rx.try_recv() {
                    Ok(message) => {
                        if !self.handle(message) {
                            break 'outer;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break 'outer,
                }
            }
            if let Err(e) = self.session.run_tasks() {
                error!("dispatching next command failed: {e}");
            }
        }
        self.shutdown();
    }

    /// Returns `false` once the loop should stop.
    fn handle(&mut self, message: LoopMessage) -> bool {
        match message {
            LoopMessage::Output(ProcessOutput::Chunk(Channel::Stdout, bytes)) => {
                self.session.on_stdout(&bytes)
            }
            LoopMessage::Output(ProcessOutput::Chunk(Channel::Stderr, bytes)) => {
                self.session.on_stderr(&bytes)
            }
            LoopMessage::Output(ProcessOutput::Closed(channel)) => {
                debug!("debugger {channel:?} closed");
                self.open_channels = self.open_channels.saturating_sub(1);
                if self.open_channels == 0 {
                    self.reap();
                }
            }
            LoopMessage::Request(Request::Shutdown) => return false,
            LoopMessage::Request(request) => {
                match self.apply(request) {
                    Ok(()) => {}
                    Err(e @ GdbCtlError::Io(_)) => error!("writing to debugger failed: {e}"),
                    Err(e) => warn!("request failed: {e}"),
                }
            }
        }
        true
    }

    fn apply(&mut self, request: Request) -> GdbCtlResult<()> {
        debug!("request {request:?}");
        let session = &mut self.session;
        match request {
            Request::Start(config) => {
                let launching = !session.is_running();
                let tx = self.tx.clone();
                session.start(config, |config| GdbProcess::spawn(config, tx))?;
                if launching {
                    self.open_channels = 2;
                }
                Ok(())
            }
            Request::ToggleBreakpoint { file, line } => session.toggle_breakpoint(&file, line),
            Request::MovePc { file, line } => session.move_pc(&file, line),
            Request::RunToCursor { file, line } => session.run_to_cursor(&file, line),
            Request::Interrupt => session.interrupt(),
            Request::Kill => session.kill(),
            Request::Rerun => session.rerun(),
            Request::StepInto => session.step_into(),
            Request::StepOver => session.step_over(),
            Request::StepOut => session.step_out(),
            Request::Continue => session.continue_execution(),
            Request::Raw(command) => session.issue_command(command),
            Request::Shutdown => Ok(()),
        }
    }

    fn reap(&mut self) {
        let success = match self.session.link_mut() {
            Some(process) => match process.wait_timeout(KILL_TIMEOUT) {
                Ok(Some(status)) => {
                    info!("debugger exited with {status}");
                    status.success()
                }
                Ok(None) => {
                    warn!("debugger closed its output but did not exit");
                    false
                }
                Err(e) => {
                    warn!("waiting for debugger failed: {e}");
                    false
                }
            },
            None => return,
        };
        self.session.on_exit(success);
    }

    fn shutdown(&mut self) {
        if !self.session.is_running() {
            return;
        }
        info!("shutting down debugger session");
        if let Some(process) = self.session.link_mut() {
            if let Err(e) = process.terminate(KILL_TIMEOUT) {
                warn!("failed to stop debugger: {e}");
            }
        }
        self.session.on_exit(true);
    }
}
