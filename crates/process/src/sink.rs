//! Observers for process output lines

use tokio::sync::mpsc;

/// Receives each output line as soon as it is read
///
/// Implementations are called from the line reader and must not block: a
/// slow or absent consumer may never stall the process being supervised.
pub trait LogSink: Send + Sync {
    /// Record one line, without its trailing newline
    fn append(&self, line: &str);
}

impl LogSink for mpsc::UnboundedSender<String> {
    fn append(&self, line: &str) {
        // A dropped receiver just means nobody is listening any more
        let _ = self.send(line.to_string());
    }
}

impl<T: LogSink + ?Sized> LogSink for std::sync::Arc<T> {
    fn append(&self, line: &str) {
        (**self).append(line);
    }
}
