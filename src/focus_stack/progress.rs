/// Progress reporting for a stacking run
///
/// The pipeline narrates each significant step (load, per-frame alignment,
/// pyramid build, fuse, collapse) as a human readable line. Callers decide
/// where those lines go.

/// Receiver of human readable progress messages.
pub trait ProgressSink {
    fn report(&mut self, message: &str);
}

impl<F> ProgressSink for F
where
    F: FnMut(&str),
{
    fn report(&mut self, message: &str) {
        self(message)
    }
}

/// Forwards every message to the `log` facade at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn report(&mut self, message: &str) {
        log::info!("{}", message);
    }
}

/// Keeps every message in order. Handy for tests and for UIs that render
/// the log after the run.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    pub messages: Vec<String>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if any collected message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.messages.iter().any(|m| m.contains(needle))
    }
}

impl ProgressSink for CollectingSink {
    fn report(&mut self, message: &str) {
        log::debug!("{}", message);
        self.messages.push(message.to_string());
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&mut self, _message: &str) {}
}
