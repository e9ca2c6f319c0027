use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shared run state: the cancellation flag plus the two progress counters.
///
/// The flag transitions false -> true exactly once. Each counter has a
/// single writer and is incremented without touching the book lock, so
/// progress accounting never contends with ingestion or compute.
#[derive(Debug, Default)]
pub struct RunState {
    stop: AtomicBool,
    messages_received: AtomicU64,
    inversions_completed: AtomicU64,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cooperative shutdown. Idempotent.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Count one received feed frame
    pub fn inc_messages(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one completed, residual-verified inversion
    pub fn inc_inversions(&self) {
        self.inversions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn inversions_completed(&self) -> u64 {
        self.inversions_completed.load(Ordering::Relaxed)
    }

    /// Snapshot of the counters for final reporting
    pub fn report(&self) -> RunReport {
        RunReport {
            messages_received: self.messages_received(),
            inversions_completed: self.inversions_completed(),
        }
    }
}

/// Final counters reported when the observation window closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub messages_received: u64,
    pub inversions_completed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_only_grow() {
        let state = RunState::new();
        assert_eq!(state.report().messages_received, 0);
        assert_eq!(state.report().inversions_completed, 0);

        let mut last = 0;
        for _ in 0..100 {
            state.inc_messages();
            let now = state.messages_received();
            assert!(now > last);
            last = now;
        }
        assert_eq!(state.inversions_completed(), 0);
    }

    #[test]
    fn stop_flag_is_one_way() {
        let state = RunState::new();
        assert!(!state.is_stopped());
        state.request_stop();
        assert!(state.is_stopped());
        state.request_stop();
        assert!(state.is_stopped());
    }
}
