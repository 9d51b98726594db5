use std::sync::Mutex;

/// Receives byte counts as a transfer moves data. Transports may call
/// `advance` from several threads, so implementations must be `Sync`.
pub trait TransferProgress: Send + Sync {
    fn advance(&self, bytes: u64);
}

/// Progress sink that discards every update.
pub struct NoProgress;

impl TransferProgress for NoProgress {
    fn advance(&self, _bytes: u64) {}
}

/// Counters for a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

/// One notification, emitted on every `advance`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub label: String,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub percent: f64,
}

pub type ProgressNotifier = Box<dyn Fn(&ProgressUpdate) + Send + Sync>;

/// Accumulates bytes moved for one transfer and reports percentage complete.
///
/// Updates are serialized by a mutex and the notifier runs while it is held,
/// so notifications arrive in counter order even with concurrent callers.
pub struct ProgressReporter {
    label: String,
    state: Mutex<ProgressState>,
    notify: ProgressNotifier,
}

impl ProgressReporter {
    /// Reporter that logs each update through `tracing`.
    pub fn new(label: impl Into<String>, total_bytes: u64) -> Self {
        Self::with_notifier(label, total_bytes, Box::new(log_update))
    }

    pub fn with_notifier(
        label: impl Into<String>,
        total_bytes: u64,
        notify: ProgressNotifier,
    ) -> Self {
        Self {
            label: label.into(),
            state: Mutex::new(ProgressState {
                bytes_transferred: 0,
                total_bytes,
            }),
            notify,
        }
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.snapshot().bytes_transferred
    }

    pub fn total_bytes(&self) -> u64 {
        self.snapshot().total_bytes
    }

    fn snapshot(&self) -> ProgressState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TransferProgress for ProgressReporter {
    fn advance(&self, bytes: u64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.bytes_transferred = state
            .bytes_transferred
            .saturating_add(bytes)
            .min(state.total_bytes);

        let percent = if state.total_bytes == 0 {
            100.0
        } else {
            state.bytes_transferred as f64 / state.total_bytes as f64 * 100.0
        };

        (self.notify)(&ProgressUpdate {
            label: self.label.clone(),
            bytes_transferred: state.bytes_transferred,
            total_bytes: state.total_bytes,
            percent,
        });
    }
}

fn log_update(update: &ProgressUpdate) {
    tracing::info!(
        target: "filegate::progress",
        label = %update.label,
        bytes = update.bytes_transferred,
        total = update.total_bytes,
        "{:.2}%",
        update.percent
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recording(total: u64) -> (ProgressReporter, Arc<Mutex<Vec<ProgressUpdate>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter = ProgressReporter::with_notifier(
            "test",
            total,
            Box::new(move |u| sink.lock().unwrap().push(u.clone())),
        );
        (reporter, seen)
    }

    #[test]
    fn advances_reach_total_with_monotonic_percentages() {
        let (reporter, seen) = recording(100);
        for n in [10, 25, 0, 40, 25] {
            reporter.advance(n);
        }

        assert_eq!(reporter.bytes_transferred(), 100);
        let updates = seen.lock().unwrap();
        assert_eq!(updates.len(), 5);
        assert!(updates.windows(2).all(|w| w[0].percent <= w[1].percent));
        assert_eq!(updates.last().unwrap().percent, 100.0);
    }

    #[test]
    fn counter_never_exceeds_total() {
        let (reporter, seen) = recording(10);
        reporter.advance(7);
        reporter.advance(7);
        assert_eq!(reporter.bytes_transferred(), 10);
        assert_eq!(seen.lock().unwrap().last().unwrap().percent, 100.0);
    }

    #[test]
    fn zero_total_is_always_complete() {
        let (reporter, seen) = recording(0);
        reporter.advance(0);
        reporter.advance(5);
        assert_eq!(reporter.bytes_transferred(), 0);
        assert!(seen.lock().unwrap().iter().all(|u| u.percent == 100.0));
    }

    #[test]
    fn concurrent_advances_are_serialized() {
        let (reporter, seen) = recording(8 * 1000);
        let reporter = Arc::new(reporter);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let r = Arc::clone(&reporter);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        r.advance(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(reporter.bytes_transferred(), 8000);
        let updates = seen.lock().unwrap();
        assert_eq!(updates.len(), 8000);
        assert!(updates
            .windows(2)
            .all(|w| w[0].bytes_transferred <= w[1].bytes_transferred));
    }

    #[test]
    fn no_progress_accepts_updates() {
        NoProgress.advance(1024);
    }
}
