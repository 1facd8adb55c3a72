// src/ui.rs

//! Where user-facing failure messages go.

use std::io::Write;

/// Accepts a fully formatted failure message. Fire-and-forget.
pub trait FailureSink: Send + Sync {
    fn display_failure(&self, message: &str);
}

/// Writes failure messages to stderr, set apart from surrounding output.
#[derive(Debug, Clone, Default)]
pub struct ConsoleFailureSink;

impl FailureSink for ConsoleFailureSink {
    fn display_failure(&self, message: &str) {
        let stderr = std::io::stderr();
        let mut out = stderr.lock();
        // Nowhere left to report a failed write to stderr.
        let _ = writeln!(out, "\n{}\n", message.trim_end());
        let _ = out.flush();
    }
}
