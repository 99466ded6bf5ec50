//! Debugger commands as they sit in the session queue.

use std::fmt;
use std::path::Path;

use nix::libc;

/// Prefix marking a command whose results are consumed as events.
pub const QUIET_MARKER: &str = "(Q)";

/// A queued command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    text: String,
    quiet: bool,
}

/// What the session should expect back after dispatching a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    InfoArgs,
    InfoLocals,
    InfoStack,
    InfoThreads,
    Generic,
}

impl Command {
    /// Parse a command, honouring the quiet marker prefix.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        match text.strip_prefix(QUIET_MARKER) {
            Some(rest) => Self {
                text: rest.trim_start().to_string(),
                quiet: true,
            },
            None => Self { text, quiet: false },
        }
    }

    /// A command whose output is consumed as events, not transcript.
    pub fn quiet(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quiet: true,
        }
    }

    /// Command text without the quiet marker, as written to the debugger.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the command carries the quiet marker.
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Only quiet introspection commands switch the session into an info sub-state.
    pub fn kind(&self) -> CommandKind {
        if !self.quiet {
            return CommandKind::Generic;
        }
        match self.text.as_str() {
            "info args" => CommandKind::InfoArgs,
            "info locals" => CommandKind::InfoLocals,
            "info stack" => CommandKind::InfoStack,
            "info thread" => CommandKind::InfoThreads,
            _ => CommandKind::Generic,
        }
    }

    /// Exact text comparison.
    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }

    /// Substring test on the command text.
    pub fn contains(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }

    /// Resume commands: a "not being run" error restarts and continues.
    pub fn is_resume(&self) -> bool {
        self.is("continue")
    }

    /// Single-step commands: a "not being run" error restarts and stops at entry.
    pub fn is_step(&self) -> bool {
        matches!(self.text.as_str(), "step" | "next" | "finish")
    }

    /// Whether this loads a new executable, marking a restart in progress.
    pub fn is_load_file(&self) -> bool {
        self.text.starts_with("file ")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quiet {
            write!(f, "{QUIET_MARKER}{}", self.text)
        } else {
            f.write_str(&self.text)
        }
    }
}

impl From<&str> for Command {
    fn from(text: &str) -> Self {
        Command::new(text)
    }
}

impl From<String> for Command {
    fn from(text: String) -> Self {
        Command::new(text)
    }
}

fn location(path: &Path, line: u32) -> String {
    format!("{}:{}", path.display(), line)
}

/// Set a breakpoint at `path:line`.
pub fn break_at(path: &Path, line: u32) -> Command {
    Command::new(format!("break {}", location(path, line)))
}

/// Clear the breakpoint at `path:line`.
pub fn clear_at(path: &Path, line: u32) -> Command {
    Command::new(format!("clear {}", location(path, line)))
}

/// Set a one-shot breakpoint at `path:line`.
pub fn tbreak_at(path: &Path, line: u32) -> Command {
    Command::new(format!("tbreak {}", location(path, line)))
}

/// Resume at `path:line`.
pub fn jump_to(path: &Path, line: u32) -> Command {
    Command::new(format!("jump {}", location(path, line)))
}

/// Switch the debuggee's stdout to line buffering so output shows up promptly.
pub fn line_buffering() -> Command {
    Command::new(format!("p setvbuf(stdout, 0, {}, 1024)", libc::_IOLBF))
}

/// Start the program from scratch and stop at `main`.
pub fn restart_to_entry() -> Vec<Command> {
    vec![
        Command::new("tbreak main"),
        Command::new("run"),
        line_buffering(),
    ]
}

/// Start the program from scratch and let it run.
pub fn restart_and_continue() -> Vec<Command> {
    let mut commands = restart_to_entry();
    commands.push(Command::new("continue"));
    commands
}

/// Read-only commands issued after execution stops.
pub fn introspection_bundle() -> Vec<Command> {
    ["info stack", "frame", "info args", "info locals", "info thread"]
        .into_iter()
        .map(Command::quiet)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_marker_is_stripped() {
        let cmd = Command::new("(Q)info locals");
        assert!(cmd.is_quiet());
        assert_eq!(cmd.text(), "info locals");
        assert_eq!(cmd.kind(), CommandKind::InfoLocals);
        assert_eq!(cmd.to_string(), "(Q)info locals");

        let spaced = Command::new("(Q) info breakpoints");
        assert!(spaced.is_quiet());
        assert_eq!(spaced.text(), "info breakpoints");
        assert_eq!(spaced.kind(), CommandKind::Generic);
    }

    #[test]
    fn loud_info_command_is_generic() {
        let cmd = Command::new("info stack");
        assert!(!cmd.is_quiet());
        assert_eq!(cmd.kind(), CommandKind::Generic);
    }

    #[test]
    fn location_commands() {
        let path = Path::new("/src/main.c");
        assert_eq!(break_at(path, 10).text(), "break /src/main.c:10");
        assert_eq!(clear_at(path, 10).text(), "clear /src/main.c:10");
        assert_eq!(tbreak_at(path, 3).text(), "tbreak /src/main.c:3");
        assert_eq!(jump_to(path, 3).text(), "jump /src/main.c:3");
    }

    #[test]
    fn restart_sequences() {
        let texts: Vec<String> = restart_and_continue()
            .iter()
            .map(|c| c.text().to_string())
            .collect();
        assert_eq!(
            texts,
            vec![
                "tbreak main".to_string(),
                "run".to_string(),
                format!("p setvbuf(stdout, 0, {}, 1024)", libc::_IOLBF),
                "continue".to_string(),
            ]
        );
        assert_eq!(restart_to_entry().len(), 3);
    }

    #[test]
    fn bundle_is_quiet_and_ordered() {
        let bundle = introspection_bundle();
        let kinds: Vec<CommandKind> = bundle.iter().map(Command::kind).collect();
        assert!(bundle.iter().all(Command::is_quiet));
        assert_eq!(
            kinds,
            vec![
                CommandKind::InfoStack,
                CommandKind::Generic,
                CommandKind::InfoArgs,
                CommandKind::InfoLocals,
                CommandKind::InfoThreads,
            ]
        );
    }
}
