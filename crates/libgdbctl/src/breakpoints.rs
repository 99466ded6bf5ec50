//! Live breakpoints as confirmed by the debugger.

use std::path::{Path, PathBuf};

/// A breakpoint gdb reported as set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u32,
    pub file: PathBuf,
    /// 1-based, as gdb reports it.
    pub line: u32,
}

impl Breakpoint {
    /// Line number in the host's 0-based convention.
    pub fn host_line(&self) -> u32 {
        self.line.saturating_sub(1)
    }
}

/// Breakpoints in confirmation order.
#[derive(Debug, Default)]
pub struct BreakpointSet {
    items: Vec<Breakpoint>,
}

impl BreakpointSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a confirmed breakpoint; a reused id replaces the old record.
    pub fn insert(&mut self, breakpoint: Breakpoint) {
        self.items.retain(|b| b.id != breakpoint.id);
        self.items.push(breakpoint);
    }

    /// Forget breakpoint `id`, returning its record.
    pub fn remove(&mut self, id: u32) -> Option<Breakpoint> {
        let pos = self.items.iter().position(|b| b.id == id)?;
        Some(self.items.remove(pos))
    }

    /// Whether any breakpoint sits at `file:line` (1-based).
    pub fn contains_location(&self, file: &Path, line: u32) -> bool {
        self.items.iter().any(|b| b.file == file && b.line == line)
    }

    /// Look a breakpoint up by gdb id.
    pub fn get(&self, id: u32) -> Option<&Breakpoint> {
        self.items.iter().find(|b| b.id == id)
    }

    /// Forget every breakpoint.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Remove every breakpoint, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = Breakpoint> + '_ {
        self.items.drain(..)
    }

    /// Breakpoints, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.items.iter()
    }

    /// Number of known breakpoints.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no breakpoint is known.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bp(id: u32, file: &str, line: u32) -> Breakpoint {
        Breakpoint {
            id,
            file: PathBuf::from(file),
            line,
        }
    }

    #[test]
    fn ids_stay_unique() {
        let mut set = BreakpointSet::new();
        set.insert(bp(1, "/a.c", 3));
        set.insert(bp(2, "/a.c", 4));
        set.insert(bp(1, "/b.c", 7));

        assert_eq!(set.len(), 2);
        assert_eq!(set.get(1), Some(&bp(1, "/b.c", 7)));
        assert!(!set.contains_location(Path::new("/a.c"), 3));
        assert!(set.contains_location(Path::new("/b.c"), 7));
    }

    #[test]
    fn drain_keeps_order() {
        let mut set = BreakpointSet::new();
        set.insert(bp(3, "/a.c", 1));
        set.insert(bp(1, "/a.c", 2));
        let ids: Vec<u32> = set.drain().map(|b| b.id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert!(set.is_empty());
        assert_eq!(set.remove(3), None);
    }

    #[test]
    fn host_line_is_zero_based() {
        assert_eq!(bp(1, "/a.c", 10).host_line(), 9);
        assert_eq!(bp(1, "/a.c", 0).host_line(), 0);
    }
}
