//! Side channel for fatal persistence failures

use crate::error::StoreError;
use std::io::{self, Write};

/// Receives a report for every batch that failed to persist, before the
/// failure is returned to the caller. Implementations must not panic.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: &StoreError);
}

/// Writes failure reports to the process error stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl ErrorSink for StderrSink {
    fn report(&self, error: &StoreError) {
        // eprintln! panics when stderr is closed
        let _ = writeln!(io::stderr().lock(), "Logging failed: {}", error);
    }
}

impl<F> ErrorSink for F
where
    F: Fn(&StoreError) + Send + Sync,
{
    fn report(&self, error: &StoreError) {
        self(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_closure_sink_receives_reports() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let sink = move |_: &StoreError| {
            counter.fetch_add(1, Ordering::SeqCst);
        };

        sink.report(&StoreError::Rejected("boom".to_string()));
        sink.report(&StoreError::Rejected("boom".to_string()));

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stderr_sink_does_not_panic() {
        StderrSink.report(&StoreError::Rejected("visible on stderr".to_string()));
    }
}
