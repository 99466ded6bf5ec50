//! Splits raw output chunks into complete lines.

/// Prompts printed by gdb without a trailing newline.
pub const PROMPTS: [&[u8]; 2] = [b"(gdb) ", b">"];

/// Text printed in front of echoed commands in the transcript.
pub const PROMPT_ECHO: &str = "(gdb) ";

/// One complete unit of debugger output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Text(String),
    /// The interactive prompt; never produced by program output.
    Prompt,
}

impl Line {
    /// Whether this is the prompt sentinel.
    pub fn is_prompt(&self) -> bool {
        matches!(self, Line::Prompt)
    }
}

/// Per-channel accumulation buffer.
///
/// Bytes are kept until a newline completes a line, so chunk boundaries
/// (including ones inside a multi-byte character) never change the result.
#[derive(Debug)]
pub struct LineAssembler {
    buffer: Vec<u8>,
    detect_prompts: bool,
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl LineAssembler {
    /// Assembler for the output channel, which also yields [`Line::Prompt`].
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            detect_prompts: true,
        }
    }

    /// Assembler for the error channel; only newlines end a line.
    pub fn without_prompts() -> Self {
        Self {
            buffer: Vec::new(),
            detect_prompts: false,
        }
    }

    /// Append a chunk and return every line it completes, in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Line> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let rest = self.buffer.split_off(end + 1);
            let mut raw = std::mem::replace(&mut self.buffer, rest);
            raw.pop();
            lines.push(Line::Text(String::from_utf8_lossy(&raw).into_owned()));
        }

        if self.detect_prompts && PROMPTS.iter().any(|p| self.buffer == *p) {
            self.buffer.clear();
            lines.push(Line::Prompt);
        }
        lines
    }

    /// Bytes waiting for a newline.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop any partial line.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
