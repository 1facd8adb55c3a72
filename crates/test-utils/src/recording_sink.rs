use std::sync::{Arc, Mutex};

use dockdag::ui::FailureSink;

/// Failure sink that keeps every message it is given.
#[derive(Debug, Clone, Default)]
pub struct RecordingFailureSink {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingFailureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl FailureSink for RecordingFailureSink {
    fn display_failure(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
