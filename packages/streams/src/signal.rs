//! Start signals.
//!
//! A stream is not usable until its start signal resolves. Body and script
//! adapters get an already-resolved signal; the two halves of a transform
//! stream share one signal so neither side is usable before the other.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::StreamError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalState {
    Pending,
    Resolved,
    Rejected(StreamError),
}

/// A shared, settle-once start signal.
#[derive(Debug, Clone)]
pub struct StartSignal(Rc<RefCell<SignalState>>);

impl StartSignal {
    pub fn pending() -> Self {
        Self(Rc::new(RefCell::new(SignalState::Pending)))
    }

    pub fn resolved() -> Self {
        Self(Rc::new(RefCell::new(SignalState::Resolved)))
    }

    /// Settle as resolved. No effect once settled.
    pub fn resolve(&self) {
        let mut state = self.0.borrow_mut();
        if *state == SignalState::Pending {
            *state = SignalState::Resolved;
        }
    }

    /// Settle as rejected. No effect once settled.
    pub fn reject(&self, error: StreamError) {
        let mut state = self.0.borrow_mut();
        if *state == SignalState::Pending {
            *state = SignalState::Rejected(error);
        }
    }

    pub fn state(&self) -> SignalState {
        self.0.borrow().clone()
    }

    pub fn is_resolved(&self) -> bool {
        *self.0.borrow() == SignalState::Resolved
    }

    /// True if both signals are the same shared cell.
    pub fn same_as(&self, other: &StartSignal) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_signal_settles_once() {
        let a = StartSignal::pending();
        let b = a.clone();
        assert!(a.same_as(&b));
        assert_eq!(b.state(), SignalState::Pending);

        a.resolve();
        assert!(b.is_resolved());

        b.reject(StreamError::Aborted);
        assert!(a.is_resolved());
    }

    #[test]
    fn rejection_is_visible_to_both_halves() {
        let a = StartSignal::pending();
        let b = a.clone();
        a.reject(StreamError::algorithm("start failed"));
        assert_eq!(
            b.state(),
            SignalState::Rejected(StreamError::algorithm("start failed"))
        );
    }
}
