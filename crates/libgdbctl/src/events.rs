//! Notifications delivered to the host.

use std::path::PathBuf;

/// Everything the controller tells its host.
///
/// Line numbers are 0-based. List-style notifications are terminated by an
/// "empty" instance: `StackFrameInfo` with empty strings, `InfoLocal` with
/// empty text and `ThreadInfo` with id `-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    ReadyForInput(bool),
    OutputText(String),
    OutputError(String),
    BreakpointSet { file: PathBuf, line: u32 },
    BreakpointCleared { file: PathBuf, line: u32 },
    ClearBreakpointMarks,
    LocationChanged { file: PathBuf, line: u32 },
    ProgramEnded,
    SessionEnded,
    StackFrameChanged(u32),
    StackFrameInfo { level: String, description: String },
    InfoLocal(String),
    ThreadInfo { id: i32, current: bool },
    /// The debugger process could not be started.
    LaunchFailed(String),
}

impl DebugEvent {
    /// Terminator of a stack listing.
    pub fn stack_frame_end() -> Self {
        DebugEvent::StackFrameInfo {
            level: String::new(),
            description: String::new(),
        }
    }

    /// Terminator of a thread listing.
    pub fn threads_end() -> Self {
        DebugEvent::ThreadInfo {
            id: -1,
            current: false,
        }
    }
}
