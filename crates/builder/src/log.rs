//! Per-build log buffers

use parking_lot::Mutex;
use safelight_process::LogSink;
use std::sync::Arc;
use uuid::Uuid;

/// Text log of one build request
///
/// Cheap to clone; clones share the same buffer. Each request gets its own
/// log, so concurrent builds never interleave their output.
#[derive(Debug, Clone)]
pub struct BuildLog {
    id: Uuid,
    text: Arc<Mutex<String>>,
}

impl BuildLog {
    /// Empty log with a fresh id
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    /// Empty log with a given id
    #[must_use]
    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            text: Arc::new(Mutex::new(String::new())),
        }
    }

    /// Identifier of the build this log belongs to
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Copy of everything logged so far
    #[must_use]
    pub fn snapshot(&self) -> String {
        self.text.lock().clone()
    }

    /// True when nothing has been logged
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.lock().is_empty()
    }
}

impl Default for BuildLog {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for BuildLog {
    fn append(&self, line: &str) {
        let mut text = self.text.lock();
        text.push_str(line);
        text.push('\n');
    }
}
