use std::sync::atomic::{AtomicBool, Ordering};

/// Fault toggles consulted when the satellite answers a report.
///
/// `error`, `timeout` and `premature_close` are one-shot: consuming one
/// atomically clears it, so each arming affects at most one response no
/// matter how many requests race for it. `throttle` stays in effect until it
/// is explicitly cleared.
#[derive(Debug, Default)]
pub struct FaultInjector {
    error: AtomicBool,
    timeout: AtomicBool,
    throttle: AtomicBool,
    premature_close: AtomicBool,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next report is answered with an error status and no body.
    pub fn arm_error(&self) {
        self.error.store(true, Ordering::Release);
    }

    /// The next report never gets a response.
    pub fn arm_timeout(&self) {
        self.timeout.store(true, Ordering::Release);
    }

    /// Enables or disables the per-span delay on streamed reports.
    pub fn set_throttle(&self, enabled: bool) {
        self.throttle.store(enabled, Ordering::Release);
    }

    /// The listener is closed and the connection dropped instead of answering
    /// the next report.
    pub fn arm_premature_close(&self) {
        self.premature_close.store(true, Ordering::Release);
    }

    pub fn consume_error(&self) -> bool {
        self.error.swap(false, Ordering::AcqRel)
    }

    pub fn consume_timeout(&self) -> bool {
        self.timeout.swap(false, Ordering::AcqRel)
    }

    pub fn consume_premature_close(&self) -> bool {
        self.premature_close.swap(false, Ordering::AcqRel)
    }

    pub fn is_throttled(&self) -> bool {
        self.throttle.load(Ordering::Acquire)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_faults_start_disarmed() {
        let faults = FaultInjector::new();
        assert!(!faults.consume_error());
        assert!(!faults.consume_timeout());
        assert!(!faults.consume_premature_close());
        assert!(!faults.is_throttled());
    }

    #[test]
    fn test_one_shot_faults_clear_on_consume() {
        let faults = FaultInjector::new();
        faults.arm_error();
        faults.arm_timeout();
        faults.arm_premature_close();

        assert!(faults.consume_error());
        assert!(!faults.consume_error());
        assert!(faults.consume_timeout());
        assert!(!faults.consume_timeout());
        assert!(faults.consume_premature_close());
        assert!(!faults.consume_premature_close());
    }

    #[test]
    fn test_flags_are_independent() {
        let faults = FaultInjector::new();
        faults.arm_error();

        assert!(!faults.consume_timeout());
        assert!(!faults.consume_premature_close());
        assert!(faults.consume_error());
    }

    #[test]
    fn test_throttle_is_sticky_until_cleared() {
        let faults = FaultInjector::new();
        faults.set_throttle(true);

        for _ in 0..3 {
            assert!(faults.is_throttled());
        }

        faults.set_throttle(false);
        assert!(!faults.is_throttled());
    }

    #[test]
    fn test_rearming_before_consume_fires_once() {
        let faults = FaultInjector::new();
        faults.arm_error();
        faults.arm_error();

        assert!(faults.consume_error());
        assert!(!faults.consume_error());
    }

    #[test]
    fn test_concurrent_consumers_see_single_arming() {
        let faults = Arc::new(FaultInjector::new());
        let fired = Arc::new(AtomicUsize::new(0));
        faults.arm_error();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let faults = Arc::clone(&faults);
                let fired = Arc::clone(&fired);
                std::thread::spawn(move || {
                    if faults.consume_error() {
                        fired.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
