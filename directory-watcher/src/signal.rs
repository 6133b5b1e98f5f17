//! Synchronization between the watch loop and waiting callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Result, WatcherError};

/// A coalescing "something changed" flag.
///
/// The loop calls [`EventSignal::signal`] once per batch; a caller blocked in
/// [`EventSignal::wait`] wakes, clears the flag and returns. Any number of
/// signals raised before a wait are consumed by that single wait.
#[derive(Debug, Default)]
pub struct EventSignal {
    state: Mutex<SignalState>,
    cond: Condvar,
}

#[derive(Debug, Default)]
struct SignalState {
    pending: bool,
    closed: bool,
}

impl EventSignal {
    /// Create a new signal with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an event as pending and wake waiters.
    pub fn signal(&self) {
        let mut state = self.lock();
        state.pending = true;
        self.cond.notify_all();
    }

    /// Block until an event is pending, then consume it.
    ///
    /// Returns [`WatcherError::Closed`] once the signal is closed and nothing
    /// is left to consume.
    pub fn wait(&self) -> Result<()> {
        let mut state = self.lock();
        loop {
            if let Some(outcome) = state.take() {
                return outcome;
            }
            state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`EventSignal::wait`] but gives up after `timeout`, returning
    /// `Ok(false)` without touching the flag.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(outcome) = state.take() {
                return outcome.map(|()| true);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            state = self
                .cond
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Whether an event is pending. Does not consume it.
    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    /// Release all current and future waiters. A pending event is still
    /// handed out once.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.cond.notify_all();
    }

    /// Whether [`EventSignal::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SignalState {
    fn take(&mut self) -> Option<Result<()>> {
        if self.pending {
            self.pending = false;
            Some(Ok(()))
        } else if self.closed {
            Some(Err(WatcherError::Closed))
        } else {
            None
        }
    }
}

/// Set-once readiness flag.
#[derive(Debug, Default)]
pub struct Readiness {
    ready: AtomicBool,
}

impl Readiness {
    /// Create a new, not yet ready, flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark ready. Later calls are no-ops.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Whether the flag has been set.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;

    const SHORT: Duration = Duration::from_millis(50);
    const LONG: Duration = Duration::from_secs(5);

    #[test]
    fn test_wait_times_out_without_signal() {
        let signal = EventSignal::new();
        assert!(!signal.wait_timeout(SHORT).unwrap());
        assert!(!signal.is_pending());
    }

    #[test]
    fn test_signal_before_wait_is_not_lost() {
        let signal = EventSignal::new();
        signal.signal();
        assert!(signal.is_pending());
        assert!(signal.wait_timeout(SHORT).unwrap());
        assert!(!signal.is_pending());
    }

    #[test]
    fn test_signals_coalesce_into_one_wakeup() {
        let signal = EventSignal::new();
        signal.signal();
        signal.signal();

        assert!(signal.wait_timeout(SHORT).unwrap());
        assert!(!signal.wait_timeout(SHORT).unwrap());
    }

    #[test]
    fn test_blocked_waiter_is_woken() {
        let signal = Arc::new(EventSignal::new());
        let (tx, rx) = mpsc::channel();

        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || {
                let outcome = signal.wait();
                tx.send(()).unwrap();
                outcome
            })
        };

        // Still blocked: nothing signalled yet.
        assert!(rx.recv_timeout(SHORT).is_err());

        signal.signal();
        rx.recv_timeout(LONG).unwrap();
        waiter.join().unwrap().unwrap();
        assert!(!signal.is_pending());
    }

    #[test]
    fn test_close_releases_blocked_waiter() {
        let signal = Arc::new(EventSignal::new());
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait())
        };

        thread::sleep(SHORT);
        signal.close();

        let outcome = waiter.join().unwrap();
        assert!(matches!(outcome, Err(WatcherError::Closed)));
    }

    #[test]
    fn test_pending_event_survives_close() {
        let signal = EventSignal::new();
        signal.signal();
        signal.close();

        assert!(signal.is_closed());
        signal.wait().unwrap();
        assert!(matches!(signal.wait(), Err(WatcherError::Closed)));
        assert!(matches!(
            signal.wait_timeout(SHORT),
            Err(WatcherError::Closed)
        ));
    }

    #[test]
    fn test_every_signal_round_is_observed() {
        let signal = Arc::new(EventSignal::new());
        let (ack_tx, ack_rx) = mpsc::channel();

        let producer = {
            let signal = signal.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    signal.signal();
                    ack_rx.recv().unwrap();
                }
                signal.close();
            })
        };

        let mut wakeups = 0;
        while signal.wait().is_ok() {
            wakeups += 1;
            let _ = ack_tx.send(());
        }

        producer.join().unwrap();
        assert_eq!(wakeups, 100);
    }

    #[test]
    fn test_readiness_is_set_once() {
        let readiness = Readiness::new();
        assert!(!readiness.is_ready());
        readiness.mark_ready();
        readiness.mark_ready();
        assert!(readiness.is_ready());
    }
}
