//! The public parser type: a builder for one-time setup (grammar
//! image, UDT callbacks, optional hooks, AST capture set) and a
//! `Parser` that can be driven through any number of `parse()` calls,
//! each one reusing the same arena rather than rebuilding it.

use std::sync::Arc;

use apg_core::{AlphabetChar, ApgResult, Arena, AstFilterResult, AstRecord, AstRecorder, GrammarImage, RuleIndex, UdtIndex};

use crate::callbacks::{AstFilter, RuleHook, StatsHook, TraceHook, UdtCallback, UdtCallbackTable};
use crate::cancel::CancellationToken;
use crate::config::{ParseConfig, ParseOutcome};
use crate::interpreter::Interpreter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Fresh,
    Configured,
    Done,
}

/// Assembles a [`Parser`] from a grammar image, the UDT callbacks it
/// requires, and whichever optional hooks and AST capture settings the
/// caller wants. Mirrors the config-object builder style used
/// elsewhere in this engine.
pub struct ParserBuilder<A: AlphabetChar> {
    image: Arc<GrammarImage<A>>,
    udts: UdtCallbackTable<A>,
    capture: Vec<(bool, u32)>,
    rule_hook: Option<Box<dyn RuleHook>>,
    trace_hook: Option<Box<dyn TraceHook>>,
    stats_hook: Option<Box<dyn StatsHook>>,
    ast_filter: Option<Box<dyn AstFilter>>,
}

impl<A: AlphabetChar> ParserBuilder<A> {
    pub fn new(image: Arc<GrammarImage<A>>) -> Self {
        Self {
            image,
            udts: UdtCallbackTable::new(),
            capture: Vec::new(),
            rule_hook: None,
            trace_hook: None,
            stats_hook: None,
            ast_filter: None,
        }
    }

    pub fn register_udt(mut self, udt: UdtIndex, callback: impl UdtCallback<A> + 'static) -> Self {
        self.udts.register(udt, callback);
        self
    }

    /// Enables AST capture for a rule. Uncaptured rules leave no trace
    /// in the AST log.
    pub fn capture_rule(mut self, rule: RuleIndex) -> Self {
        self.capture.push((false, rule));
        self
    }

    pub fn capture_udt(mut self, udt: UdtIndex) -> Self {
        self.capture.push((true, udt));
        self
    }

    pub fn rule_hook(mut self, hook: impl RuleHook + 'static) -> Self {
        self.rule_hook = Some(Box::new(hook));
        self
    }

    pub fn trace_hook(mut self, hook: impl TraceHook + 'static) -> Self {
        self.trace_hook = Some(Box::new(hook));
        self
    }

    pub fn stats_hook(mut self, hook: impl StatsHook + 'static) -> Self {
        self.stats_hook = Some(Box::new(hook));
        self
    }

    /// Installs a live pruning filter: consulted at the moment each
    /// captured rule/UDT is about to record its PRE event. A `Skip`
    /// synthesizes an immediate empty match and skips evaluating the
    /// rule/UDT body entirely, unlike [`Parser::translate_ast`]'s
    /// filter, which only hides already-recorded events during replay.
    pub fn ast_filter(mut self, filter: impl AstFilter + 'static) -> Self {
        self.ast_filter = Some(Box::new(filter));
        self
    }

    pub fn build(self) -> Parser<A> {
        log::debug!("parser built with {} captured rule/udt entries", self.capture.len());
        Parser {
            image: self.image,
            udts: self.udts,
            capture: self.capture,
            rule_hook: self.rule_hook,
            trace_hook: self.trace_hook,
            stats_hook: self.stats_hook,
            ast_filter: self.ast_filter,
            arena: Arena::new(),
            last_ast: Vec::new(),
            state: Lifecycle::Fresh,
            cancellation: CancellationToken::new(),
        }
    }
}

/// A reusable parser instance bound to one grammar image. Safe to call
/// [`Self::parse`] any number of times; each call reuses the same
/// arena for its scratch AST storage (see [`Self::reset`]) and
/// overwrites whatever AST log the previous call produced.
pub struct Parser<A: AlphabetChar> {
    image: Arc<GrammarImage<A>>,
    udts: UdtCallbackTable<A>,
    capture: Vec<(bool, u32)>,
    rule_hook: Option<Box<dyn RuleHook>>,
    trace_hook: Option<Box<dyn TraceHook>>,
    stats_hook: Option<Box<dyn StatsHook>>,
    ast_filter: Option<Box<dyn AstFilter>>,
    arena: Arena,
    last_ast: Vec<AstRecord>,
    state: Lifecycle,
    cancellation: CancellationToken,
}

impl<A: AlphabetChar> Parser<A> {
    pub fn rule_index_by_name(&self, name: &str) -> Option<RuleIndex> {
        self.image.rule_index_by_name(name)
    }

    pub fn udt_index_by_name(&self, name: &str) -> Option<UdtIndex> {
        self.image.udt_index_by_name(name)
    }

    /// Returns a clone of this parser's cooperative cancellation token.
    /// Hand it to another thread (or a timer) and call
    /// [`CancellationToken::cancel`] there to stop an in-progress
    /// `parse()` call at its next opcode dispatch boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Releases all arena memory used by the previous parse and
    /// discards its AST log. `parse` calls this automatically when
    /// invoked in the `Done` state, so most callers never need to call
    /// it directly; it exists for callers that want to reclaim memory
    /// without immediately starting another parse.
    pub fn reset(&mut self) {
        self.arena.reset();
        self.last_ast.clear();
        self.state = Lifecycle::Configured;
        self.cancellation = CancellationToken::new();
    }

    pub fn parse(&mut self, config: ParseConfig<'_, A>) -> ApgResult<ParseOutcome> {
        if self.state == Lifecycle::Done {
            self.reset();
        }

        let outcome = self.run_parse(config);
        // A fatal error still ends the parse: the facade never leaves a
        // failed attempt in `Fresh`/`Configured`, matching the lifecycle
        // the caller observes from `Parser::parse`'s own contract.
        self.state = Lifecycle::Done;
        outcome
    }

    fn run_parse(&mut self, config: ParseConfig<'_, A>) -> ApgResult<ParseOutcome> {
        let (rule, begin, end) =
            config.resolve(self.image.starting_rule(), self.image.rule_count() as u32)?;

        let ast = if self.capture.is_empty() {
            None
        } else {
            let mut recorder = AstRecorder::new_in(&self.arena);
            for (is_udt, index) in &self.capture {
                recorder.capture(*is_udt, *index);
            }
            Some(recorder)
        };

        let mut interp: Interpreter<'_, '_, '_, A> = Interpreter::new(
            &self.image,
            config.input,
            begin,
            end,
            config.max_depth,
            config.max_lookbehind,
            &self.udts,
            ast,
            self.rule_hook.as_deref_mut(),
            self.trace_hook.as_deref_mut(),
            self.stats_hook.as_deref_mut(),
            self.ast_filter.as_deref_mut(),
            self.cancellation.clone(),
        );

        let result = interp.run(rule, begin)?;
        self.last_ast = interp.into_ast();

        log::trace!(
            "parse finished: state={:?} consumed={} depth_reached={}",
            result.state,
            result.consumed,
            result.max_depth_reached
        );

        Ok(ParseOutcome {
            state: result.state,
            consumed_all: begin + result.consumed == end,
            matched_length: result.consumed,
            input_length: config.input.len(),
            max_depth_reached: result.max_depth_reached,
            node_visit_count: result.node_visit_count,
        })
    }

    /// Replays the AST log from the most recently completed parse. A
    /// no-op if nothing was captured or no parse has run yet.
    pub fn translate_ast<F, V>(&self, filter: Option<F>, visit: V)
    where
        F: FnMut(&AstRecord) -> AstFilterResult,
        V: FnMut(&AstRecord),
    {
        apg_core::translate_ast_records(&self.last_ast, filter, visit);
    }

    pub fn ast_records(&self) -> &[AstRecord] {
        &self.last_ast
    }
}
