//! Back-reference registries. A BKR opcode reads the last phrase
//! matched by a given rule or UDT under one of two scoping
//! disciplines: the universal registry tracks the single most recent
//! match regardless of where in the parse tree it happened, while a
//! frame snapshot captures only the matches made directly inside one
//! RNM activation, shadowing the universal table for that frame's
//! children.

use std::collections::HashMap;

use crate::rule::{RuleIndex, UdtIndex};

/// The matched span of a single back-reference target, recorded as
/// `(cursor, length)` rather than a borrowed slice so it survives
/// cursor movement elsewhere in the parse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackrefEntry {
    pub cursor: usize,
    pub length: usize,
}

enum UndoEntry {
    Rule(RuleIndex, Option<BackrefEntry>),
    Udt(UdtIndex, Option<BackrefEntry>),
}

/// Tracks the single most recent match per rule/UDT across the entire
/// parse. Entries are written only when a rule or UDT match is
/// *accepted* by its enclosing opcode; a rolled-back CAT or ALT branch
/// must not leave behind an entry from a branch that was abandoned,
/// which is why every write also pushes its prior value onto an undo
/// log that [`Self::rollback_to`] can unwind precisely.
#[derive(Debug, Default)]
pub struct UniversalRegistry {
    rules: HashMap<RuleIndex, BackrefEntry>,
    udts: HashMap<UdtIndex, BackrefEntry>,
    undo_log: Vec<UndoEntry>,
}

impl UniversalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rule(&mut self, rule: RuleIndex, entry: BackrefEntry) {
        let prior = self.rules.insert(rule, entry);
        self.undo_log.push(UndoEntry::Rule(rule, prior));
    }

    pub fn record_udt(&mut self, udt: UdtIndex, entry: BackrefEntry) {
        let prior = self.udts.insert(udt, entry);
        self.undo_log.push(UndoEntry::Udt(udt, prior));
    }

    pub fn rule(&self, rule: RuleIndex) -> Option<BackrefEntry> {
        self.rules.get(&rule).copied()
    }

    pub fn udt(&self, udt: UdtIndex) -> Option<BackrefEntry> {
        self.udts.get(&udt).copied()
    }

    /// A mark that [`Self::rollback_to`] can later undo back to.
    pub fn watermark(&self) -> usize {
        self.undo_log.len()
    }

    /// Undoes every write recorded since `mark`, restoring each key's
    /// prior value (or removing it, if it had none). Used when a rule
    /// match ultimately fails: any registry entries its successful
    /// sub-matches wrote must not survive the abandoned attempt.
    pub fn rollback_to(&mut self, mark: usize) {
        while self.undo_log.len() > mark {
            match self.undo_log.pop().unwrap() {
                UndoEntry::Rule(rule, Some(prior)) => {
                    self.rules.insert(rule, prior);
                }
                UndoEntry::Rule(rule, None) => {
                    self.rules.remove(&rule);
                }
                UndoEntry::Udt(udt, Some(prior)) => {
                    self.udts.insert(udt, prior);
                }
                UndoEntry::Udt(udt, None) => {
                    self.udts.remove(&udt);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.rules.clear();
        self.udts.clear();
        self.undo_log.clear();
    }
}

/// Matches recorded directly inside one RNM activation, for BKR
/// opcodes scoped to the parent frame rather than the whole parse.
/// Built fresh per activation and discarded with it; a frame's table
/// never sees matches its children's own child frames made.
#[derive(Debug, Default)]
pub struct FrameSnapshot {
    rules: HashMap<RuleIndex, BackrefEntry>,
    udts: HashMap<UdtIndex, BackrefEntry>,
}

impl FrameSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rule(&mut self, rule: RuleIndex, entry: BackrefEntry) {
        self.rules.insert(rule, entry);
    }

    pub fn record_udt(&mut self, udt: UdtIndex, entry: BackrefEntry) {
        self.udts.insert(udt, entry);
    }

    pub fn rule(&self, rule: RuleIndex) -> Option<BackrefEntry> {
        self.rules.get(&rule).copied()
    }

    pub fn udt(&self, udt: UdtIndex) -> Option<BackrefEntry> {
        self.udts.get(&udt).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universal_registry_keeps_only_the_latest_entry() {
        let mut reg = UniversalRegistry::new();
        reg.record_rule(3, BackrefEntry { cursor: 0, length: 2 });
        reg.record_rule(3, BackrefEntry { cursor: 5, length: 1 });
        assert_eq!(reg.rule(3), Some(BackrefEntry { cursor: 5, length: 1 }));
    }

    #[test]
    fn rollback_undoes_writes_since_the_mark() {
        let mut reg = UniversalRegistry::new();
        reg.record_rule(1, BackrefEntry { cursor: 0, length: 1 });
        let mark = reg.watermark();
        reg.record_rule(1, BackrefEntry { cursor: 5, length: 2 });
        reg.record_rule(2, BackrefEntry { cursor: 6, length: 1 });
        reg.rollback_to(mark);
        assert_eq!(reg.rule(1), Some(BackrefEntry { cursor: 0, length: 1 }));
        assert_eq!(reg.rule(2), None);
    }

    #[test]
    fn frame_snapshot_is_independent_of_universal_registry() {
        let mut reg = UniversalRegistry::new();
        reg.record_rule(1, BackrefEntry { cursor: 0, length: 4 });
        let mut frame = FrameSnapshot::new();
        frame.record_rule(1, BackrefEntry { cursor: 9, length: 1 });
        assert_ne!(reg.rule(1), frame.rule(1));
    }
}
