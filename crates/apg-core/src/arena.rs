//! Scoped acquisition of parser working memory, a thin allocator
//! layered over the host allocator so one destructor frees everything.
//!
//! Concretely a wrapper over [`bumpalo::Bump`]. The parser facade owns
//! one `Arena` for the life of the instance and calls [`Arena::reset`]
//! between parses rather than rebuilding it, so that installed
//! callbacks and the arena's already-warmed chunk capacity survive
//! reuse (`radlr_core`'s config objects are reused the same way).

use bumpalo::Bump;

pub struct Arena {
    bump: Bump,
}

impl Arena {
    pub fn new() -> Self {
        Self { bump: Bump::new() }
    }

    /// Releases every allocation made through this arena since the
    /// last reset (or construction) in one bulk operation, without
    /// giving back the underlying chunks to the host allocator.
    pub fn reset(&mut self) {
        self.bump.reset();
    }

    /// Total bytes currently allocated through this arena. Exposed for
    /// the arena-discipline tests in the runtime crate.
    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }

    pub(crate) fn bump(&self) -> &Bump {
        &self.bump
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena").field("allocated_bytes", &self.allocated_bytes()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::DynamicSequence;

    #[test]
    fn reset_frees_prior_allocations() {
        let mut arena = Arena::new();
        {
            let mut seq: DynamicSequence<'_, u32> = DynamicSequence::new_in(&arena);
            for i in 0..64 {
                seq.push(i);
            }
            assert_eq!(seq.len(), 64);
        }
        let used_before = arena.allocated_bytes();
        assert!(used_before > 0);
        arena.reset();
        // A fresh sequence should be able to reuse the same chunk.
        let seq: DynamicSequence<'_, u32> = DynamicSequence::new_in(&arena);
        assert_eq!(seq.len(), 0);
    }
}
