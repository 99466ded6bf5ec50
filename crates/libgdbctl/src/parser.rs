//! Classification of gdb's console output.
//!
//! gdb's CLI output is free text and several line shapes overlap: a frame row
//! `#0  main () at main.c:5` would also satisfy the location pattern. The
//! patterns therefore live in a single table that is tried top to bottom and
//! the first match wins. Decisions that depend on session state (for example
//! whether a frame row belongs to an explicit `info stack`) are left to the
//! session.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Tag of a pattern in the in-flight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    ListHeader,
    NoBreakpoints,
    StackFrame,
    LocationInFile,
    SourceLine,
    BreakpointSet,
    BreakpointSetMulti,
    BreakpointsDeleted,
    ProgramExited,
}

enum Matcher {
    Pattern(Regex),
    Contains(&'static [&'static str]),
}

impl Matcher {
    fn pattern(pattern: &str) -> Self {
        Matcher::Pattern(compile(pattern))
    }
}

// Patterns are static; a bad one is a programming error caught by the tests.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("bad pattern {pattern}: {e}"))
}

const FRAME_ROW: &str = r"^#([0-9]+)\s(.*)$";

static IN_FLIGHT_TABLE: Lazy<Vec<(Tag, Matcher)>> = Lazy::new(|| {
    vec![
        (
            Tag::ListHeader,
            Matcher::pattern(r"^Num\s+Type\s+Disp\s+Enb\s+Address\s+What.*$"),
        ),
        (
            Tag::NoBreakpoints,
            Matcher::Contains(&["No breakpoints or watchpoints."]),
        ),
        (Tag::StackFrame, Matcher::pattern(FRAME_ROW)),
        (
            Tag::LocationInFile,
            Matcher::pattern(
                r"^(?:(?:Temporary\sbreakpoint|Breakpoint)\s*[0-9]+,\s*|0x[0-9a-f]+\s*in\s*)?[^\s]+\s*\([^)]*\)\s*at\s*([^:]+):([0-9]+).*$",
            ),
        ),
        (Tag::SourceLine, Matcher::pattern(r"^([0-9]+)\s+.*$")),
        (
            Tag::BreakpointSet,
            Matcher::pattern(
                r"^Breakpoint\s+([0-9]+)\s+at\s+0x[0-9a-f]+:\s+file\s+([^,]+),\s+line\s+([0-9]+).*$",
            ),
        ),
        (
            Tag::BreakpointSetMulti,
            Matcher::pattern(r"^Breakpoint\s+([0-9]+)\s+at\s+0x[0-9a-f]+:\s+([^,]+):([0-9]+).*$"),
        ),
        (
            Tag::BreakpointsDeleted,
            Matcher::pattern(r"^Deleted\s+breakpoints?\s*(.*)$"),
        ),
        (
            Tag::ProgramExited,
            Matcher::pattern(r"^(?:Program|.*Inferior.*)\s+exited.*$"),
        ),
        (
            Tag::ProgramExited,
            Matcher::Contains(&[
                "The program no longer exists",
                "Kill the program being debugged",
            ]),
        ),
    ]
});

static STACK_FRAME_ANY: Lazy<Regex> = Lazy::new(|| compile(FRAME_ROW));

static STACK_FRAME_FILE: Lazy<Regex> = Lazy::new(|| {
    compile(r"^#([0-9]+)\s+(?:0x[0-9a-f]+\s*in\s)*(\S+)(\s\([^)]*\))\sat\s([^:]+):([0-9]+).*$")
});

static BREAKPOINT_LISTED: Lazy<Regex> = Lazy::new(|| {
    compile(r"^([0-9]+)\s+breakpoint\s+keep\s+y\s+0x[0-9a-f]+\s+in\s.+\sat\s([^:]+):([0-9]+).*$")
});

static THREAD_ROW: Lazy<Regex> = Lazy::new(|| compile(r"^\**\s+([0-9]+)\s+Thread.*$"));

/// A line of output received while a generic command is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// Header of an `info breakpoints` table.
    BreakpointListHeader,
    NoBreakpoints,
    /// `#<level> <rest>`; `file` is set when the row names a source location.
    StackFrame {
        level: u32,
        rest: String,
        file: Option<String>,
    },
    /// Execution stopped in a function at a source location.
    LocationInFile { file: String, line: u32 },
    /// Bare `<line> <source>` row, location relative to the current file.
    SourceLine { line: u32 },
    BreakpointSet { id: u32, file: String, line: u32 },
    BreakpointsDeleted(Vec<u32>),
    ProgramExited,
    Text,
}

fn number<T: std::str::FromStr>(caps: &Captures<'_>, idx: usize) -> Option<T> {
    caps.get(idx)?.as_str().parse().ok()
}

fn text(caps: &Captures<'_>, idx: usize) -> Option<String> {
    Some(caps.get(idx)?.as_str().to_string())
}

fn build(tag: Tag, line: &str, caps: Option<Captures<'_>>) -> Option<Classified> {
    let classified = match (tag, caps) {
        (Tag::ListHeader, _) => Classified::BreakpointListHeader,
        (Tag::NoBreakpoints, _) => Classified::NoBreakpoints,
        (Tag::ProgramExited, _) => Classified::ProgramExited,
        (Tag::StackFrame, Some(caps)) => Classified::StackFrame {
            level: number(&caps, 1)?,
            rest: text(&caps, 2)?,
            file: STACK_FRAME_FILE
                .captures(line)
                .and_then(|c| text(&c, 4)),
        },
        (Tag::LocationInFile, Some(caps)) => Classified::LocationInFile {
            file: caps.get(1)?.as_str().trim().to_string(),
            line: number(&caps, 2)?,
        },
        (Tag::SourceLine, Some(caps)) => Classified::SourceLine {
            line: number(&caps, 1)?,
        },
        (Tag::BreakpointSet | Tag::BreakpointSetMulti, Some(caps)) => Classified::BreakpointSet {
            id: number(&caps, 1)?,
            file: text(&caps, 2)?,
            line: number(&caps, 3)?,
        },
        (Tag::BreakpointsDeleted, Some(caps)) => Classified::BreakpointsDeleted(
            caps.get(1)?
                .as_str()
                .split_whitespace()
                .filter_map(|n| n.parse().ok())
                .collect(),
        ),
        (_, None) => return None,
    };
    Some(classified)
}

/// Classify a line received while a generic command is in flight.
pub fn classify_in_flight(line: &str) -> Classified {
    for (tag, matcher) in IN_FLIGHT_TABLE.iter() {
        let hit = match matcher {
            Matcher::Pattern(re) => match re.captures(line) {
                Some(caps) => build(*tag, line, Some(caps)),
                None => continue,
            },
            Matcher::Contains(needles) => {
                if !needles.iter().any(|n| line.contains(n)) {
                    continue;
                }
                build(*tag, line, None)
            }
        };
        // A shape match whose numbers do not parse falls through to plain text.
        return hit.unwrap_or(Classified::Text);
    }
    Classified::Text
}

/// A row of the `info breakpoints` table: `(id, file, 1-based line)`.
pub fn breakpoint_row(line: &str) -> Option<(u32, String, u32)> {
    let caps = BREAKPOINT_LISTED.captures(line)?;
    Some((number(&caps, 1)?, text(&caps, 2)?, number(&caps, 3)?))
}

/// A row of `info stack` / `backtrace`: `(level, description)`.
pub fn stack_row(line: &str) -> Option<(String, String)> {
    let caps = STACK_FRAME_ANY.captures(line)?;
    Some((text(&caps, 1)?, text(&caps, 2)?))
}

/// A row of `info thread`: `(id, is_current)`.
pub fn thread_row(line: &str) -> Option<(i32, bool)> {
    let caps = THREAD_ROW.captures(line)?;
    Some((number(&caps, 1)?, line.starts_with('*')))
}
