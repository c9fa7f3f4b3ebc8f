//! Host output seam for the `trace` opcode.
//!
//! The VM never writes to stdout directly; everything a script traces goes
//! through a [`TraceWriter`] supplied by the host. This keeps embedded hosts
//! (no stdout) and tests (capture output) on the same code path.

/// Receives the output of the `trace` opcode.
pub trait TraceWriter {
    /// Called once per executed `trace` action with the already-coerced string.
    fn trace(&mut self, message: &str);
}

/// Writes trace output to stdout, one line per call.
pub struct StdTrace;

impl TraceWriter for StdTrace {
    fn trace(&mut self, message: &str) {
        println!("{message}");
    }
}

/// Discards all trace output.
pub struct NoTrace;

impl TraceWriter for NoTrace {
    fn trace(&mut self, _message: &str) {}
}

/// Collects trace output into a vector of lines, mainly for tests.
#[derive(Debug, Default)]
pub struct CollectTrace {
    lines: Vec<String>,
}

impl CollectTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collected lines, consuming the writer.
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl TraceWriter for CollectTrace {
    fn trace(&mut self, message: &str) {
        self.lines.push(message.to_owned());
    }
}
