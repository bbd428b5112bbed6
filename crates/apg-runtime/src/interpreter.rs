//! The non-recursive recursive-descent interpreter. Evaluation is
//! driven by an explicit stack of [`Activation`]s rather than the host
//! call stack, so a pathological or adversarial grammar exhausts a
//! configured depth budget and returns
//! [`apg_core::ApgError::DepthExceeded`] instead of overflowing the
//! real stack.
//!
//! Every activation records a watermark into the universal
//! back-reference registry and the AST log at the moment it is
//! pushed; if it ultimately resolves to `NoMatch`, both are rolled
//! back to that watermark before the result is handed to its parent.
//! This is what lets an abandoned ALT branch or a failed REP iteration
//! disappear completely rather than leaking partial back-reference or
//! AST state into whichever sibling eventually succeeds.

use apg_core::{
    ascii_fold_eq, AlphabetChar, ApgResult, AstFilterResult, BackrefEntry, BackrefScope,
    BackrefTarget, ConfigError, FrameSnapshot, GrammarImage, Opcode, OpcodeIndex, PpptState,
    RuleIndex, UdtContractError, UniversalRegistry,
};

use crate::callbacks::{AstFilter, RuleHook, StatsHook, TraceHook, UdtCallbackTable};
use crate::cancel::CancellationToken;
use crate::config::ParserState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Progress {
    Start,
    WaitChild,
}

/// Which kind of zero-consumption predicate, if any, is currently being
/// evaluated. While the stack of these is non-empty, AST recording and
/// statistics hits are suppressed: a match found only while probing a
/// predicate must not appear as if it were a real match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LookaroundMode {
    Ahead,
    Behind,
}

struct Activation {
    op: OpcodeIndex,
    entry_cursor: usize,
    progress: Progress,
    child_pos: u32,
    consumed_so_far: usize,
    candidate: usize,
    frame_pushed: bool,
    ast_pre_mark: Option<usize>,
    universal_mark: usize,
    ast_rollback_mark: usize,
}

enum Action {
    Push(OpcodeIndex, usize),
    Finish(ParserState, usize),
}

pub struct Interpreter<'g, 'i, 'a, A: AlphabetChar> {
    image: &'g GrammarImage<A>,
    input: &'i [A],
    substring_begin: usize,
    substring_end: usize,
    max_depth: usize,
    max_lookbehind: usize,
    udts: &'g UdtCallbackTable<A>,
    rule_hook: Option<&'a mut dyn RuleHook>,
    trace_hook: Option<&'a mut dyn TraceHook>,
    stats_hook: Option<&'a mut dyn StatsHook>,
    ast_filter: Option<&'a mut dyn AstFilter>,
    cancel: CancellationToken,
    universal: UniversalRegistry,
    frame_stack: Vec<FrameSnapshot>,
    ast: Option<apg_core::AstRecorder<'a>>,
    exec_stack: Vec<Activation>,
    lookaround_stack: Vec<LookaroundMode>,
    max_depth_reached: usize,
    node_visit_count: u64,
}

/// What a completed top-level parse produced, before it's wrapped into
/// a [`crate::config::ParseOutcome`] by the facade.
pub struct RunResult {
    pub state: ParserState,
    pub consumed: usize,
    pub max_depth_reached: usize,
    pub node_visit_count: u64,
}

impl<'g, 'i, 'a, A: AlphabetChar> Interpreter<'g, 'i, 'a, A> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        image: &'g GrammarImage<A>,
        input: &'i [A],
        substring_begin: usize,
        substring_end: usize,
        max_depth: usize,
        max_lookbehind: usize,
        udts: &'g UdtCallbackTable<A>,
        ast: Option<apg_core::AstRecorder<'a>>,
        rule_hook: Option<&'a mut dyn RuleHook>,
        trace_hook: Option<&'a mut dyn TraceHook>,
        stats_hook: Option<&'a mut dyn StatsHook>,
        ast_filter: Option<&'a mut dyn AstFilter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            image,
            input,
            substring_begin,
            substring_end,
            max_depth,
            max_lookbehind,
            udts,
            rule_hook,
            trace_hook,
            stats_hook,
            ast_filter,
            cancel,
            universal: UniversalRegistry::new(),
            frame_stack: Vec::new(),
            ast,
            exec_stack: Vec::new(),
            lookaround_stack: Vec::new(),
            max_depth_reached: 0,
            node_visit_count: 0,
        }
    }

    fn in_lookaround(&self) -> bool {
        !self.lookaround_stack.is_empty()
    }

    /// Consults the live pruning filter, if one is installed, for a
    /// captured match about to begin at `cursor`. `true` (`Skip`) means
    /// the PRE record is still written but the match is immediately
    /// synthesized as an empty success without ever evaluating the
    /// rule/UDT body; `false` (`Keep`, or no filter installed at all)
    /// means evaluate normally.
    fn ast_filter_skips(&mut self, is_udt: bool, index: u32, cursor: usize) -> bool {
        self.ast_filter
            .as_deref_mut()
            .map(|f| f.filter_pre(is_udt, index, cursor) == AstFilterResult::Skip)
            .unwrap_or(false)
    }

    /// Copies the recorded AST log out of the arena-backed recorder
    /// into a plain owned `Vec`, decoupling it from the arena's
    /// lifetime so it can outlive this interpreter and the `parse()`
    /// call that created it.
    pub fn into_ast(self) -> Vec<apg_core::AstRecord> {
        self.ast.map(|ast| ast.records().to_vec()).unwrap_or_default()
    }

    /// Runs the interpreter starting at `rule`'s first opcode from
    /// `cursor`, wrapping the call the same way an `RNM` opcode would:
    /// a back-reference frame is pushed for the duration, and the
    /// rule's own match (if any) is recorded into both registries and,
    /// if captured, the AST log.
    pub fn run(&mut self, rule: RuleIndex, cursor: usize) -> ApgResult<RunResult> {
        let captured = self
            .ast
            .as_ref()
            .map(|ast| ast.is_captured(false, rule))
            .unwrap_or(false);

        if captured && self.ast_filter_skips(false, rule, cursor) {
            if let Some(ast) = self.ast.as_mut() {
                let pre = ast.record_pre(false, rule, cursor);
                ast.record_post(pre, 0);
            }
            return Ok(RunResult {
                state: ParserState::Empty,
                consumed: 0,
                max_depth_reached: self.max_depth_reached,
                node_visit_count: self.node_visit_count,
            });
        }

        self.frame_stack.push(FrameSnapshot::new());
        let ast_pre_mark = if captured {
            self.ast.as_mut().map(|ast| ast.record_pre(false, rule, cursor))
        } else {
            None
        };

        let rule_def = self.image.rule(rule).expect("validated starting rule");
        self.exec_stack.push(Activation {
            op: rule_def.first_opcode,
            entry_cursor: cursor,
            progress: Progress::Start,
            child_pos: 0,
            consumed_so_far: 0,
            candidate: 0,
            frame_pushed: false,
            ast_pre_mark: None,
            universal_mark: self.universal.watermark(),
            ast_rollback_mark: self.ast.as_ref().map(|a| a.len()).unwrap_or(0),
        });

        let (state, consumed) = self.drive()?;

        self.frame_stack.pop();
        if state.is_success() {
            let entry = BackrefEntry { cursor, length: consumed };
            self.universal.record_rule(rule, entry);
            if let Some(parent) = self.frame_stack.last_mut() {
                parent.record_rule(rule, entry);
            }
            if let (Some(pre), Some(ast)) = (ast_pre_mark, self.ast.as_mut()) {
                ast.record_post(pre, consumed);
            }
        } else if let (Some(pre), Some(ast)) = (ast_pre_mark, self.ast.as_mut()) {
            ast.truncate(pre);
        }

        Ok(RunResult {
            state,
            consumed,
            max_depth_reached: self.max_depth_reached,
            node_visit_count: self.node_visit_count,
        })
    }

    fn drive(&mut self) -> ApgResult<(ParserState, usize)> {
        let mut pending: Option<(ParserState, usize)> = None;
        loop {
            if self.exec_stack.is_empty() {
                let (state, consumed) = pending.expect("exec stack empty without a result");
                return Ok((state, consumed));
            }
            let idx = self.exec_stack.len() - 1;
            let action = self.step(idx, pending.take())?;
            match action {
                Action::Push(op, cursor) => {
                    if self.exec_stack.len() >= self.max_depth {
                        return Err(apg_core::ApgError::DepthExceeded { max_depth: self.max_depth });
                    }
                    self.exec_stack.push(Activation {
                        op,
                        entry_cursor: cursor,
                        progress: Progress::Start,
                        child_pos: 0,
                        consumed_so_far: 0,
                        candidate: 0,
                        frame_pushed: false,
                        ast_pre_mark: None,
                        universal_mark: self.universal.watermark(),
                        ast_rollback_mark: self.ast.as_ref().map(|a| a.len()).unwrap_or(0),
                    });
                    self.max_depth_reached = self.max_depth_reached.max(self.exec_stack.len());
                }
                Action::Finish(state, consumed) => {
                    let act = self.exec_stack.pop().unwrap();
                    if state == ParserState::NoMatch {
                        self.universal.rollback_to(act.universal_mark);
                        if let Some(ast) = self.ast.as_mut() {
                            ast.truncate(act.ast_rollback_mark);
                        }
                    }
                    if let Some(hook) = self.trace_hook.as_deref_mut() {
                        let kind = self.image.opcode(act.op).unwrap().kind();
                        hook.on_exit(kind, act.op, act.entry_cursor, state);
                    }
                    pending = Some((state, consumed));
                }
            }
        }
    }

    fn pppt_no_match(&self, opcode: &Opcode<A>, cursor: usize) -> bool {
        if let Some(offset) = opcode.pppt_offset() {
            if cursor < self.substring_end {
                let code = self.input[cursor].to_u64();
                if code < self.image.alphabet_range() as u64 {
                    let map = self.image.pppt_map(offset);
                    return map[code as usize] == PpptState::NoMatch;
                }
            }
        }
        false
    }

    fn step(&mut self, idx: usize, pending: Option<(ParserState, usize)>) -> ApgResult<Action> {
        if self.cancel.is_cancelled() {
            return Err(apg_core::ApgError::Cancelled);
        }

        let op = self.exec_stack[idx].op;
        let opcode = self.image.opcode(op).expect("valid opcode index").clone();
        let entry_cursor = self.exec_stack[idx].entry_cursor;

        if self.exec_stack[idx].progress == Progress::Start {
            if !self.in_lookaround() {
                self.node_visit_count += 1;
                if let Some(hook) = self.stats_hook.as_deref_mut() {
                    hook.on_opcode_enter(opcode.kind(), op);
                }
            }
            if let Some(hook) = self.trace_hook.as_deref_mut() {
                hook.on_enter(opcode.kind(), op, entry_cursor);
            }
        }

        match &opcode {
            Opcode::Alt { children, .. } => {
                if self.exec_stack[idx].progress == Progress::Start {
                    if children.count == 0 || self.pppt_no_match(&opcode, entry_cursor) {
                        if !self.in_lookaround() {
                            if let Some(hook) = self.stats_hook.as_deref_mut() {
                                hook.on_alt_resolved(op, None);
                            }
                        }
                        return Ok(Action::Finish(ParserState::NoMatch, 0));
                    }
                    let first = self.image.children(*children)[0];
                    self.exec_stack[idx].progress = Progress::WaitChild;
                    return Ok(Action::Push(first, entry_cursor));
                }
                let (state, consumed) = pending.unwrap();
                if state.is_success() {
                    if !self.in_lookaround() {
                        if let Some(hook) = self.stats_hook.as_deref_mut() {
                            hook.on_alt_resolved(op, Some(self.exec_stack[idx].child_pos));
                        }
                    }
                    return Ok(Action::Finish(state, consumed));
                }
                let next_pos = self.exec_stack[idx].child_pos + 1;
                let kids = self.image.children(*children);
                if (next_pos as usize) < kids.len() {
                    self.exec_stack[idx].child_pos = next_pos;
                    return Ok(Action::Push(kids[next_pos as usize], entry_cursor));
                }
                if !self.in_lookaround() {
                    if let Some(hook) = self.stats_hook.as_deref_mut() {
                        hook.on_alt_resolved(op, None);
                    }
                }
                Ok(Action::Finish(ParserState::NoMatch, 0))
            }

            Opcode::Cat { children, .. } => {
                if self.exec_stack[idx].progress == Progress::Start {
                    if children.count == 0 {
                        return Ok(Action::Finish(ParserState::Empty, 0));
                    }
                    if self.pppt_no_match(&opcode, entry_cursor) {
                        return Ok(Action::Finish(ParserState::NoMatch, 0));
                    }
                    let first = self.image.children(*children)[0];
                    self.exec_stack[idx].progress = Progress::WaitChild;
                    return Ok(Action::Push(first, entry_cursor));
                }
                let (state, consumed) = pending.unwrap();
                if !state.is_success() {
                    return Ok(Action::Finish(ParserState::NoMatch, 0));
                }
                self.exec_stack[idx].consumed_so_far += consumed;
                let next_pos = self.exec_stack[idx].child_pos + 1;
                let kids = self.image.children(*children);
                if (next_pos as usize) < kids.len() {
                    self.exec_stack[idx].child_pos = next_pos;
                    let cursor = entry_cursor + self.exec_stack[idx].consumed_so_far;
                    return Ok(Action::Push(kids[next_pos as usize], cursor));
                }
                let total = self.exec_stack[idx].consumed_so_far;
                Ok(Action::Finish(
                    if total == 0 { ParserState::Empty } else { ParserState::Match },
                    total,
                ))
            }

            Opcode::Rep { min, max, child, .. } => {
                if self.exec_stack[idx].progress == Progress::Start {
                    if self.pppt_no_match(&opcode, entry_cursor) {
                        return Ok(Action::Finish(
                            if *min == 0 { ParserState::Empty } else { ParserState::NoMatch },
                            0,
                        ));
                    }
                    self.exec_stack[idx].progress = Progress::WaitChild;
                    return Ok(Action::Push(*child, entry_cursor));
                }
                let (state, consumed) = pending.unwrap();
                let finished = if state.is_success() {
                    self.exec_stack[idx].child_pos += 1;
                    self.exec_stack[idx].consumed_so_far += consumed;
                    let at_max = max.map(|m| self.exec_stack[idx].child_pos >= m).unwrap_or(false);
                    consumed == 0 || at_max
                } else {
                    true
                };
                if !finished {
                    let cursor = entry_cursor + self.exec_stack[idx].consumed_so_far;
                    return Ok(Action::Push(*child, cursor));
                }
                let count = self.exec_stack[idx].child_pos;
                let total = self.exec_stack[idx].consumed_so_far;
                Ok(Action::Finish(
                    if count >= *min {
                        if total == 0 { ParserState::Empty } else { ParserState::Match }
                    } else {
                        ParserState::NoMatch
                    },
                    total,
                ))
            }

            Opcode::Rnm { rule, .. } => {
                if self.exec_stack[idx].progress == Progress::Start {
                    if self.pppt_no_match(&opcode, entry_cursor) {
                        return Ok(Action::Finish(ParserState::NoMatch, 0));
                    }
                    let captured = !self.in_lookaround()
                        && self.ast.as_ref().map(|a| a.is_captured(false, *rule)).unwrap_or(false);
                    self.frame_stack.push(FrameSnapshot::new());
                    self.exec_stack[idx].frame_pushed = true;
                    self.exec_stack[idx].ast_pre_mark = if captured {
                        self.ast.as_mut().map(|a| a.record_pre(false, *rule, entry_cursor))
                    } else {
                        None
                    };

                    if captured && self.ast_filter_skips(false, *rule, entry_cursor) {
                        self.exec_stack[idx].progress = Progress::WaitChild;
                        return self.finish_rnm(idx, *rule, ParserState::Empty, 0);
                    }

                    if let Some(hook) = self.rule_hook.as_deref_mut() {
                        if let Some((state, consumed)) = hook.on_enter(*rule, entry_cursor) {
                            if entry_cursor + consumed > self.substring_end {
                                return Err(apg_core::ApgError::RuleHookRange {
                                    rule: *rule,
                                    length: consumed,
                                    substring_end: self.substring_end,
                                });
                            }
                            self.exec_stack[idx].progress = Progress::WaitChild;
                            return self.finish_rnm(idx, *rule, state, consumed);
                        }
                    }

                    let rule_def = self.image.rule(*rule).expect("validated rule reference");
                    self.exec_stack[idx].progress = Progress::WaitChild;
                    return Ok(Action::Push(rule_def.first_opcode, entry_cursor));
                }
                let (state, consumed) = pending.unwrap();
                self.finish_rnm(idx, *rule, state, consumed)
            }

            Opcode::Trg { min, max, .. } => {
                if let Some(&c) = self.input.get(entry_cursor) {
                    if entry_cursor < self.substring_end && c >= *min && c <= *max {
                        return Ok(Action::Finish(ParserState::Match, 1));
                    }
                }
                Ok(Action::Finish(ParserState::NoMatch, 0))
            }

            Opcode::Tls { offset, len, .. } => {
                if *len == 0 {
                    return Ok(Action::Finish(ParserState::Empty, 0));
                }
                let end = entry_cursor + *len as usize;
                if end > self.substring_end || end > self.input.len() {
                    return Ok(Action::Finish(ParserState::NoMatch, 0));
                }
                let literal = self.image.literal(*offset, *len);
                let candidate = &self.input[entry_cursor..end];
                if literal.iter().zip(candidate).all(|(a, b)| ascii_fold_eq(*a, *b)) {
                    Ok(Action::Finish(ParserState::Match, *len as usize))
                } else {
                    Ok(Action::Finish(ParserState::NoMatch, 0))
                }
            }

            Opcode::Tbs { offset, len, .. } => {
                if *len == 0 {
                    return Ok(Action::Finish(ParserState::Empty, 0));
                }
                let end = entry_cursor + *len as usize;
                if end > self.substring_end || end > self.input.len() {
                    return Ok(Action::Finish(ParserState::NoMatch, 0));
                }
                let literal = self.image.literal(*offset, *len);
                let candidate = &self.input[entry_cursor..end];
                if literal == candidate {
                    Ok(Action::Finish(ParserState::Match, *len as usize))
                } else {
                    Ok(Action::Finish(ParserState::NoMatch, 0))
                }
            }

            Opcode::Udt { udt } => {
                let udt_def = self.image.udt(*udt).expect("validated UDT reference");

                let captured = !self.in_lookaround()
                    && self.ast.as_ref().map(|a| a.is_captured(true, *udt)).unwrap_or(false);

                if captured && self.ast_filter_skips(true, *udt, entry_cursor) {
                    if let Some(ast) = self.ast.as_mut() {
                        let pre = ast.record_pre(true, *udt, entry_cursor);
                        ast.record_post(pre, 0);
                    }
                    return Ok(Action::Finish(ParserState::Empty, 0));
                }

                let name = self.image.udt_name(udt_def).to_string();
                let callback = self
                    .udts
                    .get(*udt)
                    .ok_or_else(|| ConfigError::MissingUdtCallback { udt: *udt, name })?;

                let ast_pre = if captured {
                    self.ast.as_mut().map(|a| a.record_pre(true, *udt, entry_cursor))
                } else {
                    None
                };

                let (state, len) = callback
                    .call(self.input, entry_cursor, self.substring_end)
                    .map_err(|reason| apg_core::ApgError::UdtCallback { udt: *udt, reason })?;

                if state == ParserState::Active {
                    return Err(UdtContractError::ReturnedActive { udt: *udt }.into());
                }
                if state.is_success() {
                    if !udt_def.may_be_empty && len == 0 {
                        return Err(UdtContractError::NonEmptyUdtMatchedEmpty { udt: *udt }.into());
                    }
                    if entry_cursor + len > self.substring_end {
                        return Err(UdtContractError::MatchRunsPastSubstringEnd {
                            udt: *udt,
                            length: len,
                            substring_end: self.substring_end,
                        }
                        .into());
                    }
                    let entry = BackrefEntry { cursor: entry_cursor, length: len };
                    self.universal.record_udt(*udt, entry);
                    if let Some(parent) = self.frame_stack.last_mut() {
                        parent.record_udt(*udt, entry);
                    }
                    if let (Some(pre), Some(ast)) = (ast_pre, self.ast.as_mut()) {
                        ast.record_post(pre, len);
                    }
                } else if let (Some(pre), Some(ast)) = (ast_pre, self.ast.as_mut()) {
                    ast.truncate(pre);
                }
                Ok(Action::Finish(state, len))
            }

            Opcode::And { child, .. } => {
                if self.exec_stack[idx].progress == Progress::Start {
                    if self.pppt_no_match(&opcode, entry_cursor) {
                        return Ok(Action::Finish(ParserState::NoMatch, 0));
                    }
                    self.exec_stack[idx].progress = Progress::WaitChild;
                    self.lookaround_stack.push(LookaroundMode::Ahead);
                    return Ok(Action::Push(*child, entry_cursor));
                }
                self.lookaround_stack.pop();
                let (state, _) = pending.unwrap();
                Ok(Action::Finish(
                    if state.is_success() { ParserState::Empty } else { ParserState::NoMatch },
                    0,
                ))
            }

            Opcode::Not { child, .. } => {
                if self.exec_stack[idx].progress == Progress::Start {
                    if self.pppt_no_match(&opcode, entry_cursor) {
                        return Ok(Action::Finish(ParserState::NoMatch, 0));
                    }
                    self.exec_stack[idx].progress = Progress::WaitChild;
                    self.lookaround_stack.push(LookaroundMode::Ahead);
                    return Ok(Action::Push(*child, entry_cursor));
                }
                self.lookaround_stack.pop();
                let (state, _) = pending.unwrap();
                Ok(Action::Finish(
                    if state.is_success() { ParserState::NoMatch } else { ParserState::Empty },
                    0,
                ))
            }

            Opcode::Bkr { target, case_insensitive, scope } => {
                let entry = match scope {
                    BackrefScope::Universal => match target {
                        BackrefTarget::Rule(r) => self.universal.rule(*r),
                        BackrefTarget::Udt(u) => self.universal.udt(*u),
                    },
                    BackrefScope::ParentFrame => self.frame_stack.last().and_then(|frame| match target {
                        BackrefTarget::Rule(r) => frame.rule(*r),
                        BackrefTarget::Udt(u) => frame.udt(*u),
                    }),
                };
                let Some(BackrefEntry { cursor, length }) = entry else {
                    return Ok(Action::Finish(ParserState::Empty, 0));
                };
                if length == 0 {
                    return Ok(Action::Finish(ParserState::Empty, 0));
                }
                let end = entry_cursor + length;
                if end > self.substring_end || cursor + length > self.input.len() {
                    return Ok(Action::Finish(ParserState::NoMatch, 0));
                }
                let recorded = &self.input[cursor..cursor + length];
                let candidate = &self.input[entry_cursor..end];
                let matches = if *case_insensitive {
                    recorded.iter().zip(candidate).all(|(a, b)| ascii_fold_eq(*a, *b))
                } else {
                    recorded == candidate
                };
                Ok(Action::Finish(
                    if matches { ParserState::Match } else { ParserState::NoMatch },
                    if matches { length } else { 0 },
                ))
            }

            Opcode::Bka { child } | Opcode::Bkn { child } => {
                let is_bka = matches!(opcode, Opcode::Bka { .. });
                if self.exec_stack[idx].progress == Progress::Start {
                    if entry_cursor == self.substring_begin {
                        return Ok(Action::Finish(
                            if is_bka { ParserState::NoMatch } else { ParserState::Empty },
                            0,
                        ));
                    }
                    let candidate = entry_cursor - 1;
                    self.exec_stack[idx].candidate = candidate;
                    self.exec_stack[idx].progress = Progress::WaitChild;
                    self.lookaround_stack.push(LookaroundMode::Behind);
                    return Ok(Action::Push(*child, candidate));
                }
                self.lookaround_stack.pop();
                let (state, consumed) = pending.unwrap();
                let candidate = self.exec_stack[idx].candidate;
                if state.is_success() && candidate + consumed == entry_cursor {
                    return Ok(Action::Finish(
                        if is_bka { ParserState::Empty } else { ParserState::NoMatch },
                        0,
                    ));
                }
                let floor = entry_cursor.saturating_sub(self.max_lookbehind).max(self.substring_begin);
                if candidate <= floor {
                    return Ok(Action::Finish(
                        if is_bka { ParserState::NoMatch } else { ParserState::Empty },
                        0,
                    ));
                }
                let next = candidate - 1;
                self.exec_stack[idx].candidate = next;
                self.lookaround_stack.push(LookaroundMode::Behind);
                Ok(Action::Push(*child, next))
            }

            Opcode::Abg => Ok(Action::Finish(
                if entry_cursor == self.substring_begin { ParserState::Empty } else { ParserState::NoMatch },
                0,
            )),

            Opcode::Aen => Ok(Action::Finish(
                if entry_cursor == self.substring_end { ParserState::Empty } else { ParserState::NoMatch },
                0,
            )),
        }
    }

    fn finish_rnm(
        &mut self,
        idx: usize,
        rule: RuleIndex,
        state: ParserState,
        consumed: usize,
    ) -> ApgResult<Action> {
        let entry_cursor = self.exec_stack[idx].entry_cursor;
        if let Some(hook) = self.rule_hook.as_deref_mut() {
            hook.on_exit(rule, entry_cursor, state, consumed);
        }
        // This rule's own frame only ever existed to give its children
        // a target for parent-scoped back-references; once the rule is
        // done, nothing further reads it.
        if self.exec_stack[idx].frame_pushed {
            self.frame_stack.pop();
        }
        if state.is_success() {
            let entry = BackrefEntry { cursor: entry_cursor, length: consumed };
            self.universal.record_rule(rule, entry);
            if let Some(parent) = self.frame_stack.last_mut() {
                parent.record_rule(rule, entry);
            }
            if let Some(pre) = self.exec_stack[idx].ast_pre_mark {
                if let Some(ast) = self.ast.as_mut() {
                    ast.record_post(pre, consumed);
                }
            }
        } else if let Some(pre) = self.exec_stack[idx].ast_pre_mark {
            if let Some(ast) = self.ast.as_mut() {
                ast.truncate(pre);
            }
        }
        Ok(Action::Finish(state, consumed))
    }
}
