//! The debugger session state machine.
//!
//! A [`Session`] consumes raw output chunks from gdb's two channels, keeps the
//! command queue and the live breakpoint set, and writes the next command back
//! through a [`GdbLink`]. It never blocks and never reads from the process on
//! its own: the owner feeds it chunks and runs its deferred [`Task`]s.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use log::{debug, info, warn};

use crate::breakpoints::{Breakpoint, BreakpointSet};
use crate::command::{self, Command, CommandKind};
use crate::config::TargetConfig;
use crate::errors::{GdbCtlError, GdbCtlResult};
use crate::events::DebugEvent;
use crate::lines::{Line, LineAssembler, PROMPT_ECHO};
use crate::parser::{self, Classified};
use crate::resolver::resolve_file_name;

/// Write side of a running debugger.
pub trait GdbLink {
    /// Write one command line; the newline is appended by the link.
    fn send_line(&mut self, line: &str) -> GdbCtlResult<()>;

    /// Deliver an interrupt to the debugger process.
    fn interrupt(&mut self) -> GdbCtlResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No debugger process.
    Idle,
    /// Waiting for the next command.
    Ready,
    ExecutingCommand,
    ListingBreakpoints,
    InfoArgs,
    InfoLocals,
    InfoStack,
    InfoThreads,
}

/// Frame rows seen since the current command was dispatched.
///
/// A single row (`frame`, `up`, a stop) selects a frame; two or more rows are
/// a backtrace and select nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameScan {
    Normal,
    FrameSeen,
    TraceSeen,
}

impl FrameScan {
    fn advance(self) -> Self {
        match self {
            FrameScan::Normal => FrameScan::FrameSeen,
            FrameScan::FrameSeen | FrameScan::TraceSeen => FrameScan::TraceSeen,
        }
    }
}

/// Work posted from inside line processing and run afterwards by the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    IssueNextCommand,
}

const NOT_RUNNING: &str = "The program is not being run.";

pub struct Session<L: GdbLink> {
    events: Sender<DebugEvent>,
    link: Option<L>,
    config: Option<TargetConfig>,
    state: SessionState,
    frame_scan: FrameScan,
    queue: VecDeque<Command>,
    last_command: Option<Command>,
    location_changed: bool,
    current_file: String,
    frame_file: String,
    frame_level: u32,
    stdout: LineAssembler,
    stderr: LineAssembler,
    pending_errors: VecDeque<String>,
    breakpoints: BreakpointSet,
    tasks: VecDeque<Task>,
}

impl<L: GdbLink> Session<L> {
    /// Idle session reporting to `events`.
    pub fn new(events: Sender<DebugEvent>) -> Self {
        Self {
            events,
            link: None,
            config: None,
            state: SessionState::Idle,
            frame_scan: FrameScan::Normal,
            queue: VecDeque::new(),
            last_command: None,
            location_changed: true,
            current_file: String::new(),
            frame_file: String::new(),
            frame_level: 0,
            stdout: LineAssembler::new(),
            stderr: LineAssembler::without_prompts(),
            pending_errors: VecDeque::new(),
            breakpoints: BreakpointSet::new(),
            tasks: VecDeque::new(),
        }
    }


    /// Current state of the session.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frame rows seen for the command in flight.
    pub fn frame_scan(&self) -> FrameScan {
        self.frame_scan
    }

    /// Whether a debugger process is attached.
    pub fn is_running(&self) -> bool {
        self.state != SessionState::Idle
    }

    /// Whether a command is in flight.
    pub fn is_busy(&self) -> bool {
        self.state == SessionState::ExecutingCommand
    }

    /// Whether a breakpoint is known at `file:line` (1-based).
    pub fn has_breakpoint(&self, file: &Path, line: u32) -> bool {
        self.breakpoints.contains_location(file, line)
    }

    /// Known breakpoints, in insertion order.
    pub fn breakpoints(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.iter()
    }

    /// Commands waiting to be dispatched.
    pub fn queued(&self) -> impl Iterator<Item = &Command> {
        self.queue.iter()
    }

    /// The most recently dispatched command.
    pub fn last_command(&self) -> Option<&Command> {
        self.last_command.as_ref()
    }

    /// Whether the next prompt should trigger introspection.
    pub fn location_changed(&self) -> bool {
        self.location_changed
    }

    /// Whether deferred work is waiting for [`Session::run_tasks`].
    pub fn has_pending_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// The attached debugger, if any.
    pub fn link(&self) -> Option<&L> {
        self.link.as_ref()
    }

    /// Mutable access to the attached debugger.
    pub fn link_mut(&mut self) -> Option<&mut L> {
        self.link.as_mut()
    }


    /// Start a session, or load a new target into the running one.
    ///
    /// `launch` is only called when no debugger is running. A launch failure
    /// is reported once as [`DebugEvent::LaunchFailed`] and returned.
    pub fn start<F>(&mut self, config: TargetConfig, launch: F) -> GdbCtlResult<()>
    where
        F: FnOnce(&TargetConfig) -> GdbCtlResult<L>,
    {
        config.validate()?;

        if self.state == SessionState::Idle {
            let link = match launch(&config) {
                Ok(link) => link,
                Err(e) => {
                    self.emit(DebugEvent::LaunchFailed(e.to_string()));
                    return Err(e);
                }
            };
            info!("debugger started for {}", config.executable.display());
            self.stdout.clear();
            self.stderr.clear();
            self.pending_errors.clear();
            self.link = Some(link);
            self.queue.push_back(Command::new("set pagination off"));
            self.state = SessionState::Ready;
        } else {
            // The startup prompt dispatches the queue; a running session needs a nudge.
            self.schedule();
        }

        self.config = Some(config);
        self.queue_target_setup();
        Ok(())
    }

    fn queue_target_setup(&mut self) {
        let Some(config) = &self.config else {
            return;
        };
        let mut setup = vec![
            Command::new(format!("file {}", config.executable.display())),
            Command::new(config.args_line()),
            Command::new("set inferior-tty /dev/null"),
        ];
        setup.extend(config.custom_init.iter().map(|c| Command::new(c.as_str())));
        setup.push(Command::quiet("info breakpoints"));
        self.queue.extend(setup);
    }

    /// The debugger process is gone: tear the session down.
    pub fn on_exit(&mut self, success: bool) {
        if !success {
            self.emit(DebugEvent::OutputText("*** gdb exited abnormally ***".into()));
        }
        info!("debugger session ended");

        self.state = SessionState::Idle;
        self.link = None;
        self.queue.clear();
        self.tasks.clear();
        self.pending_errors.clear();
        self.emit(DebugEvent::ReadyForInput(false));

        let cleared: Vec<Breakpoint> = self.breakpoints.drain().collect();
        for bp in cleared {
            self.emit(DebugEvent::BreakpointCleared {
                line: bp.host_line(),
                file: bp.file,
            });
        }
        self.emit(DebugEvent::SessionEnded);
    }


    /// Set a breakpoint at `file:line` (1-based), or clear the one already there.
    pub fn toggle_breakpoint(&mut self, file: &Path, line: u32) -> GdbCtlResult<()> {
        if self.state != SessionState::Ready {
            warn!("breakpoint toggle at {}:{line} dropped, debugger busy", file.display());
            return Ok(());
        }
        let cmd = if self.has_breakpoint(file, line) {
            command::clear_at(file, line)
        } else {
            command::break_at(file, line)
        };
        self.issue_command(cmd)
    }

    /// Move the program counter to `file:line` without running the code in between.
    pub fn move_pc(&mut self, file: &Path, line: u32) -> GdbCtlResult<()> {
        if self.state != SessionState::Ready {
            warn!("jump to {}:{line} dropped, debugger busy", file.display());
            return Ok(());
        }
        self.queue.push_back(command::jump_to(file, line));
        self.issue_command(command::tbreak_at(file, line))
    }

    /// Run until `file:line` through a temporary breakpoint.
    pub fn run_to_cursor(&mut self, file: &Path, line: u32) -> GdbCtlResult<()> {
        if self.state != SessionState::Ready {
            warn!("run to {}:{line} dropped, debugger busy", file.display());
            return Ok(());
        }
        self.queue.push_back(Command::new("continue"));
        self.issue_command(command::tbreak_at(file, line))
    }

    /// Interrupt the debuggee. Allowed in any state; the queue is kept.
    pub fn interrupt(&mut self) -> GdbCtlResult<()> {
        if self.state == SessionState::ExecutingCommand {
            self.location_changed = true;
        }
        match self.link.as_mut() {
            Some(link) => link.interrupt(),
            None => Err(GdbCtlError::NotRunning),
        }
    }

    /// Kill the debuggee, interrupting whatever is in flight.
    pub fn kill(&mut self) -> GdbCtlResult<()> {
        if self.state == SessionState::Idle {
            return Err(GdbCtlError::NotRunning);
        }
        if self.state != SessionState::Ready {
            self.interrupt()?;
            self.state = SessionState::Ready;
        }
        self.issue_command(Command::new("kill"))
    }

    /// Kill the debuggee, reload the target and run it again.
    pub fn rerun(&mut self) -> GdbCtlResult<()> {
        self.kill()?;
        self.queue_target_setup();
        self.queue.extend(command::restart_and_continue());
        Ok(())
    }

    /// Step into the next source line.
    pub fn step_into(&mut self) -> GdbCtlResult<()> {
        self.issue_command(Command::new("step"))
    }

    /// Step over the next source line.
    pub fn step_over(&mut self) -> GdbCtlResult<()> {
        self.issue_command(Command::new("next"))
    }

    /// Run until the current function returns.
    pub fn step_out(&mut self) -> GdbCtlResult<()> {
        self.issue_command(Command::new("finish"))
    }

    /// Resume the debuggee.
    pub fn continue_execution(&mut self) -> GdbCtlResult<()> {
        self.issue_command(Command::new("continue"))
    }


    /// Write `cmd` to the debugger. Ignored unless the session is ready.
    pub fn issue_command(&mut self, cmd: impl Into<Command>) -> GdbCtlResult<()> {
        let cmd = cmd.into();
        if self.state != SessionState::Ready {
            debug!("not ready, `{cmd}` ignored");
            return Ok(());
        }
        if self.link.is_none() {
            return Err(GdbCtlError::NotRunning);
        }

        self.emit(DebugEvent::ReadyForInput(false));
        self.state = match cmd.kind() {
            CommandKind::InfoArgs => SessionState::InfoArgs,
            CommandKind::InfoLocals => SessionState::InfoLocals,
            CommandKind::InfoStack => SessionState::InfoStack,
            CommandKind::InfoThreads => SessionState::InfoThreads,
            CommandKind::Generic => SessionState::ExecutingCommand,
        };
        self.frame_scan = FrameScan::Normal;

        if !cmd.is_quiet() {
            self.emit(DebugEvent::OutputText(format!("{PROMPT_ECHO}{}", cmd.text())));
        }
        debug!("dispatching `{cmd}`");
        let text = cmd.text().to_string();
        self.last_command = Some(cmd);

        match self.link.as_mut() {
            Some(link) => link.send_line(&text),
            None => Err(GdbCtlError::NotRunning),
        }
    }

    fn issue_next_command(&mut self) -> GdbCtlResult<()> {
        if self.state != SessionState::Ready {
            return Ok(());
        }
        if let Some(cmd) = self.queue.pop_front() {
            return self.issue_command(cmd);
        }

        let after_thread_switch = self
            .last_command
            .as_ref()
            .is_some_and(|c| c.text().starts_with("thread"));
        if self.location_changed || after_thread_switch {
            self.location_changed = false;
            let last_was_quiet = self.last_command.as_ref().is_some_and(Command::is_quiet);
            if !last_was_quiet {
                self.queue.extend(command::introspection_bundle());
                return self.issue_next_command();
            }
        }
        self.emit(DebugEvent::ReadyForInput(true));
        Ok(())
    }

    fn schedule(&mut self) {
        self.tasks.push_back(Task::IssueNextCommand);
    }

    /// Run the work posted while processing output.
    pub fn run_tasks(&mut self) -> GdbCtlResult<()> {
        while let Some(task) = self.tasks.pop_front() {
            match task {
                Task::IssueNextCommand => self.issue_next_command()?,
            }
        }
        Ok(())
    }


    /// Feed a chunk read from the debugger's output channel.
    pub fn on_stdout(&mut self, chunk: &[u8]) {
        for line in self.stdout.push(chunk) {
            self.process_line(line);
        }
    }

    fn process_line(&mut self, line: Line) {
        if let Line::Text(text) = &line {
            if text.is_empty() {
                return;
            }
        }
        debug!("gdb [{:?}]: {line:?}", self.state);

        match self.state {
            SessionState::Idle | SessionState::Ready => {
                if line.is_prompt() {
                    self.schedule();
                }
            }
            SessionState::ExecutingCommand => self.process_in_flight(&line),
            SessionState::ListingBreakpoints => match &line {
                Line::Prompt => self.finish_command(),
                Line::Text(text) => {
                    if let Some((id, file, number)) = parser::breakpoint_row(text) {
                        self.add_breakpoint(id, &file, number);
                    }
                }
            },
            SessionState::InfoArgs => match &line {
                Line::Prompt => self.finish_command(),
                Line::Text(text) => self.emit(DebugEvent::InfoLocal(text.clone())),
            },
            SessionState::InfoLocals => match &line {
                Line::Prompt => {
                    self.emit(DebugEvent::InfoLocal(String::new()));
                    self.finish_command();
                }
                Line::Text(text) => self.emit(DebugEvent::InfoLocal(text.clone())),
            },
            SessionState::InfoStack => match &line {
                Line::Prompt => {
                    self.emit(DebugEvent::stack_frame_end());
                    self.finish_command();
                }
                Line::Text(text) => {
                    if let Some((level, description)) = parser::stack_row(text) {
                        self.emit(DebugEvent::StackFrameInfo { level, description });
                    }
                }
            },
            SessionState::InfoThreads => match &line {
                Line::Prompt => {
                    self.emit(DebugEvent::threads_end());
                    self.finish_command();
                }
                Line::Text(text) => {
                    if let Some((id, current)) = parser::thread_row(text) {
                        self.emit(DebugEvent::ThreadInfo { id, current });
                    }
                }
            },
        }

        self.output_text_maybe(&line);
    }

    fn process_in_flight(&mut self, line: &Line) {
        let text = match line {
            Line::Prompt => {
                if self.frame_scan == FrameScan::FrameSeen {
                    self.emit(DebugEvent::StackFrameChanged(self.frame_level));
                }
                self.finish_command();
                return;
            }
            Line::Text(text) => text,
        };

        match parser::classify_in_flight(text) {
            Classified::BreakpointListHeader => {
                self.state = SessionState::ListingBreakpoints;
                self.emit(DebugEvent::ClearBreakpointMarks);
                self.breakpoints.clear();
            }
            Classified::NoBreakpoints => {
                self.emit(DebugEvent::ClearBreakpointMarks);
                self.breakpoints.clear();
            }
            Classified::StackFrame { level, rest, file } => {
                let explicit_backtrace = self
                    .last_command
                    .as_ref()
                    .is_some_and(|c| c.contains("info stack"));
                if explicit_backtrace {
                    self.emit(DebugEvent::StackFrameInfo {
                        level: level.to_string(),
                        description: rest,
                    });
                } else {
                    self.frame_scan = self.frame_scan.advance();
                    self.frame_level = level;
                    if let Some(file) = file {
                        self.frame_file = file;
                    }
                }
            }
            Classified::LocationInFile { file, line } => {
                self.current_file = file;
                self.report_location(line);
            }
            Classified::SourceLine { line } => {
                if self.frame_scan == FrameScan::FrameSeen {
                    self.current_file = self.frame_file.clone();
                }
                self.report_location(line);
            }
            Classified::BreakpointSet { id, file, line } => self.add_breakpoint(id, &file, line),
            Classified::BreakpointsDeleted(ids) => {
                for id in ids {
                    if let Some(bp) = self.breakpoints.remove(id) {
                        self.emit(DebugEvent::BreakpointCleared {
                            line: bp.host_line(),
                            file: bp.file,
                        });
                    }
                }
            }
            Classified::ProgramExited => {
                // Drop leftovers, unless the kill was part of a restart.
                let restarting = self.queue.front().is_some_and(Command::is_load_file);
                if !self.queue.is_empty() && !restarting {
                    self.queue.clear();
                }
                self.location_changed = false;
                self.emit(DebugEvent::ProgramEnded);
            }
            Classified::Text => {}
        }
    }

    fn finish_command(&mut self) {
        self.state = SessionState::Ready;
        // stderr may still hold the error explaining this prompt; dispatch later.
        self.schedule();
    }

    fn report_location(&mut self, line: u32) {
        let resuming = self.queue.iter().any(Command::is_resume);
        if !resuming {
            let file = self.resolve(&self.current_file);
            self.emit(DebugEvent::LocationChanged {
                file,
                line: line.saturating_sub(1),
            });
        }
        self.location_changed = true;
    }

    fn add_breakpoint(&mut self, id: u32, file: &str, line: u32) {
        let bp = Breakpoint {
            id,
            file: self.resolve(file),
            line,
        };
        self.emit(DebugEvent::BreakpointSet {
            file: bp.file.clone(),
            line: bp.host_line(),
        });
        self.breakpoints.insert(bp);
    }

    fn resolve(&self, file: &str) -> PathBuf {
        match &self.config {
            Some(config) => resolve_file_name(config, file),
            None => PathBuf::from(file),
        }
    }

    fn output_text_maybe(&self, line: &Line) {
        let quiet = self.last_command.as_ref().is_some_and(Command::is_quiet);
        if let Line::Text(text) = line {
            if !quiet {
                self.emit(DebugEvent::OutputText(text.clone()));
            }
        }
    }


    /// Feed a chunk read from the debugger's error channel.
    pub fn on_stderr(&mut self, chunk: &[u8]) {
        for line in self.stderr.push(chunk) {
            if let Line::Text(text) = line {
                self.pending_errors.push_back(text);
            }
        }
        self.process_errors();
    }

    fn process_errors(&mut self) {
        while let Some(error) = self.pending_errors.pop_front() {
            debug!("gdb stderr [{:?}]: {error:?}", self.state);

            if error == NOT_RUNNING {
                self.recover_not_running();
            } else if error.contains("No line ") || error.contains("No source file named") {
                // Setting a breakpoint failed; do not run whatever was meant to follow.
                self.queue.clear();
                self.emit(DebugEvent::ReadyForInput(true));
            } else if error.contains("No stack") {
                self.queue.clear();
                self.emit(DebugEvent::ProgramEnded);
            }
            self.emit(DebugEvent::OutputError(error));
        }
    }

    fn recover_not_running(&mut self) {
        let Some(last) = self.last_command.clone() else {
            return;
        };
        if last.is_resume() {
            self.replace_queue(command::restart_and_continue());
            self.schedule();
        } else if last.is_step() {
            self.replace_queue(command::restart_to_entry());
            self.schedule();
        } else if last.is("kill") {
            let restarting = self.queue.front().is_some_and(Command::is_load_file);
            if !restarting {
                self.replace_queue(vec![Command::new("quit")]);
            }
            self.state = SessionState::Ready;
            self.schedule();
        }
    }

    fn replace_queue(&mut self, commands: Vec<Command>) {
        self.queue = commands.into();
    }

    fn emit(&self, event: DebugEvent) {
        if self.events.send(event).is_err() {
            debug!("event receiver gone");
        }
    }
}
