use crate::prelude::{LocalizerError, LocalizerResult};
use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Debug, Default, Clone, Copy)]
struct Gates {
    initialize: bool,
    start: bool,
    aborted: bool,
}

/// Two-phase, one-shot start gate shared by every worker of a session.
///
/// `initialize` releases the packet-capture launch; `start` releases all
/// time-critical work and is only set once capture output is confirmed.
/// Gates never reset. `abort` wakes every waiter with
/// [`LocalizerError::Cancelled`].
#[derive(Debug, Default)]
pub struct SessionBarrier {
    gates: Mutex<Gates>,
    changed: Condvar,
}

impl SessionBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A barrier with both gates already open, for work outside a session.
    pub fn released() -> Self {
        let barrier = Self::new();
        barrier.set_initialize();
        barrier.set_start();
        barrier
    }

    pub fn set_initialize(&self) {
        self.update(|gates| gates.initialize = true);
    }

    pub fn set_start(&self) {
        self.update(|gates| gates.start = true);
    }

    pub fn abort(&self) {
        self.update(|gates| gates.aborted = true);
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().aborted
    }

    pub fn wait_initialize(&self) -> LocalizerResult<()> {
        self.wait_for(|gates| gates.initialize)
    }

    pub fn wait_start(&self) -> LocalizerResult<()> {
        self.wait_for(|gates| gates.start)
    }

    fn update(&self, apply: impl FnOnce(&mut Gates)) {
        let mut gates = self.lock();
        apply(&mut gates);
        self.changed.notify_all();
    }

    fn wait_for(&self, open: impl Fn(&Gates) -> bool) -> LocalizerResult<()> {
        let mut gates = self.lock();
        loop {
            if gates.aborted {
                return Err(LocalizerError::Cancelled);
            }
            if open(&gates) {
                return Ok(());
            }
            gates = self
                .changed
                .wait(gates)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn lock(&self) -> MutexGuard<'_, Gates> {
        // Gates are plain flags; a poisoned lock still holds a consistent value.
        self.gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn start_waiters_are_released_only_by_start() {
        let barrier = Arc::new(SessionBarrier::new());
        let (tx, rx) = mpsc::channel();

        let waiter = {
            let barrier = barrier.clone();
            thread::spawn(move || {
                let outcome = barrier.wait_start();
                tx.send(outcome.is_ok()).unwrap();
            })
        };

        barrier.set_initialize();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        barrier.set_start();
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        waiter.join().unwrap();
    }

    #[test]
    fn gates_stay_open_once_set() {
        let barrier = SessionBarrier::new();
        barrier.set_initialize();
        barrier.set_initialize();
        assert!(barrier.wait_initialize().is_ok());
        assert!(barrier.wait_initialize().is_ok());
    }

    #[test]
    fn abort_wakes_blocked_waiters() {
        let barrier = Arc::new(SessionBarrier::new());
        let waiter = {
            let barrier = barrier.clone();
            thread::spawn(move || barrier.wait_initialize())
        };

        thread::sleep(Duration::from_millis(20));
        barrier.abort();
        assert!(matches!(
            waiter.join().unwrap(),
            Err(LocalizerError::Cancelled)
        ));
        assert!(barrier.is_aborted());
    }

    #[test]
    fn released_barrier_does_not_block() {
        let barrier = SessionBarrier::released();
        assert!(barrier.wait_initialize().is_ok());
        assert!(barrier.wait_start().is_ok());
    }
}
