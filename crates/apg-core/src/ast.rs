//! The abstract syntax tree recorder: a flat, paired PRE/POST log of
//! every captured rule and UDT match, plus a `translate` replay API
//! that walks the pairs in order without ever materializing a tree.
//!
//! Capture is opt-in per rule/UDT (an empty capture set records
//! nothing, matching the "AST recording costs nothing when unused"
//! requirement) and each captured match may additionally be vetoed by
//! a caller-supplied filter, which sees the PRE record before deciding
//! whether its POST counterpart should also be suppressed.

use std::collections::HashSet;

use crate::arena::Arena;
use crate::sequence::DynamicSequence;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AstEventKind {
    Pre,
    Post,
}

/// One half of a PRE/POST pair. `sibling_pair_index` points at the
/// record's other half so `translate` can walk forward or backward
/// from either one without a separate index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AstRecord {
    pub kind: AstEventKind,
    pub is_udt: bool,
    pub index: u32,
    pub phrase_offset: usize,
    pub phrase_length: usize,
    pub sibling_pair_index: usize,
}

/// What a caller's filter callback decides for one captured match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AstFilterResult {
    /// Keep both the PRE and POST records.
    Keep,
    /// Drop both records for this match (its children, if also
    /// captured, are unaffected).
    Skip,
}

/// A `(is_udt, index)` key identifying one rule or UDT for capture-set
/// membership.
pub type CaptureKey = (bool, u32);

pub struct AstRecorder<'a> {
    records: DynamicSequence<'a, AstRecord>,
    captured: HashSet<CaptureKey>,
}

impl<'a> AstRecorder<'a> {
    pub fn new_in(arena: &'a Arena) -> Self {
        Self { records: DynamicSequence::new_in(arena), captured: HashSet::new() }
    }

    /// Enables capture for one rule or UDT. Matches of rules/UDTs never
    /// added here produce no records at all.
    pub fn capture(&mut self, is_udt: bool, index: u32) {
        self.captured.insert((is_udt, index));
    }

    pub fn is_captured(&self, is_udt: bool, index: u32) -> bool {
        self.captured.contains(&(is_udt, index))
    }

    /// Records the PRE half of a match about to be attempted, returning
    /// its index for later use by [`Self::record_post`]. Callers must
    /// truncate back to this index if the match ultimately fails.
    pub fn record_pre(&mut self, is_udt: bool, index: u32, phrase_offset: usize) -> usize {
        self.records.push(AstRecord {
            kind: AstEventKind::Pre,
            is_udt,
            index,
            phrase_offset,
            phrase_length: 0,
            sibling_pair_index: usize::MAX,
        })
    }

    /// Records the POST half for a match that succeeded, linking it
    /// back to its PRE record.
    pub fn record_post(&mut self, pre_index: usize, phrase_length: usize) {
        let post_index = self.records.push(AstRecord {
            kind: AstEventKind::Post,
            is_udt: self.records.get(pre_index).unwrap().is_udt,
            index: self.records.get(pre_index).unwrap().index,
            phrase_offset: self.records.get(pre_index).unwrap().phrase_offset,
            phrase_length,
            sibling_pair_index: pre_index,
        });
        self.records.get_mut(pre_index).unwrap().sibling_pair_index = post_index;
        self.records.get_mut(pre_index).unwrap().phrase_length = phrase_length;
    }

    /// Discards every record at or beyond `len`, used to roll back a
    /// PRE record whose match ultimately failed.
    pub fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[AstRecord] {
        self.records.as_slice()
    }

    /// Replays the recorded PRE/POST pairs in order, calling `visit`
    /// once per event. A record whose filter returns
    /// [`AstFilterResult::Skip`] at its PRE event has both halves
    /// suppressed; `visit` is simply not called for either. Without a
    /// filter every captured record is visited, which is the default
    /// full traversal.
    pub fn translate<F, V>(&self, filter: Option<F>, visit: V)
    where
        F: FnMut(&AstRecord) -> AstFilterResult,
        V: FnMut(&AstRecord),
    {
        translate(self.records.as_slice(), filter, visit)
    }
}

/// The same replay `AstRecorder::translate` performs, but over a plain
/// slice — used to replay a log that has already been copied out of
/// its arena (see `apg_runtime::Parser::translate_ast`).
pub fn translate<F, V>(records: &[AstRecord], mut filter: Option<F>, mut visit: V)
where
    F: FnMut(&AstRecord) -> AstFilterResult,
    V: FnMut(&AstRecord),
{
    let mut skip_until: Option<usize> = None;
    for (i, record) in records.iter().enumerate() {
        if let Some(end) = skip_until {
            if i <= end {
                if i == end {
                    skip_until = None;
                }
                continue;
            }
        }
        if record.kind == AstEventKind::Pre {
            if let Some(f) = filter.as_mut() {
                if f(record) == AstFilterResult::Skip {
                    skip_until = Some(record.sibling_pair_index);
                    continue;
                }
            }
        }
        visit(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecorded_rules_produce_nothing() {
        let arena = Arena::new();
        let rec = AstRecorder::new_in(&arena);
        assert!(!rec.is_captured(false, 0));
    }

    #[test]
    fn pre_post_pairs_link_to_each_other() {
        let arena = Arena::new();
        let mut rec = AstRecorder::new_in(&arena);
        rec.capture(false, 1);
        let pre = rec.record_pre(false, 1, 0);
        rec.record_post(pre, 3);
        let records = rec.records();
        assert_eq!(records[pre].sibling_pair_index, pre + 1);
        assert_eq!(records[pre + 1].sibling_pair_index, pre);
        assert_eq!(records[pre + 1].phrase_length, 3);
    }

    #[test]
    fn truncate_rolls_back_a_failed_match() {
        let arena = Arena::new();
        let mut rec = AstRecorder::new_in(&arena);
        rec.capture(false, 1);
        let mark = rec.len();
        rec.record_pre(false, 1, 0);
        rec.truncate(mark);
        assert_eq!(rec.len(), mark);
    }

    #[test]
    fn filter_skip_suppresses_both_halves() {
        let arena = Arena::new();
        let mut rec = AstRecorder::new_in(&arena);
        rec.capture(false, 1);
        rec.capture(false, 2);
        let outer_pre = rec.record_pre(false, 1, 0);
        let inner_pre = rec.record_pre(false, 2, 0);
        rec.record_post(inner_pre, 1);
        rec.record_post(outer_pre, 1);

        let mut visited = Vec::new();
        rec.translate(
            Some(|r: &AstRecord| {
                if r.index == 1 {
                    AstFilterResult::Skip
                } else {
                    AstFilterResult::Keep
                }
            }),
            |r| visited.push((r.index, r.kind)),
        );
        assert!(visited.is_empty());
    }

    #[test]
    fn no_filter_visits_every_record() {
        let arena = Arena::new();
        let mut rec = AstRecorder::new_in(&arena);
        rec.capture(false, 1);
        let pre = rec.record_pre(false, 1, 0);
        rec.record_post(pre, 2);

        let mut visited = Vec::new();
        rec.translate(None::<fn(&AstRecord) -> AstFilterResult>, |r| visited.push(r.kind));
        assert_eq!(visited, vec![AstEventKind::Pre, AstEventKind::Post]);
    }
}
