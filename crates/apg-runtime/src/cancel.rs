//! Cooperative cancellation: a cheap, clonable flag checked at opcode
//! dispatch boundaries. A caller hands a clone of the token to another
//! thread (or a timer); calling `cancel()` there causes the in-progress
//! parse to terminate with `ApgError::Cancelled` at the next opcode
//! boundary. Parsing itself has no suspension points, so this is the
//! only way to stop a parse early.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_clone_observes_cancellation_set_on_the_original() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
