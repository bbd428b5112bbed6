//! Hook traits through which callers observe or extend a parse: UDT
//! terminal callbacks (mandatory, the only way a UDT opcode can ever
//! match), rule hooks (optional, for memoization or instrumentation),
//! and trace/stats hooks (optional, pure observers with no influence
//! over the parse result).

use std::collections::HashMap;

use apg_core::{AstFilterResult, OpcodeIndex, OpcodeKind, RuleIndex, UdtIndex};

use crate::config::ParserState;

/// A UDT's match logic, supplied by the embedding application. Called
/// with the full input, the cursor to start matching from, and the
/// exclusive end of the configured substring; returns the terminal
/// state and, for `Match`/`Empty`, how many characters were consumed.
///
/// Must never return [`ParserState::Active`] and must never report a
/// non-empty match for a UDT declared empty-capable-only in its name
/// (`u_` prefix) — both are checked by the interpreter and surfaced as
/// [`apg_core::UdtContractError`] rather than trusted blindly.
pub trait UdtCallback<A>: Send + Sync {
    fn call(&self, input: &[A], cursor: usize, substring_end: usize) -> Result<(ParserState, usize), String>;
}

impl<A, F> UdtCallback<A> for F
where
    F: Fn(&[A], usize, usize) -> Result<(ParserState, usize), String> + Send + Sync,
{
    fn call(&self, input: &[A], cursor: usize, substring_end: usize) -> Result<(ParserState, usize), String> {
        self(input, cursor, substring_end)
    }
}

/// Optional per-rule hook, e.g. for memoizing a packrat-style cache or
/// short-circuiting known-expensive rules. Default implementations
/// make every method optional.
pub trait RuleHook: Send + Sync {
    /// Called before the interpreter attempts `rule` at `cursor`. A
    /// `Some` return is taken as the rule's result without running its
    /// opcodes at all.
    fn on_enter(&mut self, _rule: RuleIndex, _cursor: usize) -> Option<(ParserState, usize)> {
        None
    }

    /// Called after `rule` finishes, whether or not `on_enter` short
    /// circuited it.
    fn on_exit(&mut self, _rule: RuleIndex, _cursor: usize, _state: ParserState, _length: usize) {}
}

/// A trace hook sees every opcode activation and its resolution. Purely
/// observational: nothing it returns can change the parse result.
pub trait TraceHook: Send + Sync {
    fn on_enter(&mut self, kind: OpcodeKind, opcode: OpcodeIndex, cursor: usize);
    fn on_exit(&mut self, kind: OpcodeKind, opcode: OpcodeIndex, cursor: usize, state: ParserState);
}

/// A stats hook counts opcode activity without paying for per-event
/// formatting the way a full trace does.
pub trait StatsHook: Send + Sync {
    fn on_opcode_enter(&mut self, kind: OpcodeKind, opcode: OpcodeIndex);

    /// Called once an ALT resolves, naming which child (by position
    /// among the ALT's children, not by opcode index) matched, or
    /// `None` if every alternative failed.
    fn on_alt_resolved(&mut self, alt: OpcodeIndex, winning_child: Option<u32>);
}

/// A live pruning filter consulted at the moment a captured rule or UDT
/// is about to record its PRE event, before the match is even attempted.
/// `Keep` records the PRE event and lets the interpreter evaluate the
/// rule/UDT as usual. `Skip` still records the PRE event, but
/// immediately synthesizes the matching POST event as an empty match
/// and does not evaluate the rule/UDT body at all — the interpreter
/// never descends into it.
///
/// This is unlike [`apg_core::translate_ast_records`]'s post-hoc
/// filter, which only hides already-recorded events during replay and
/// has no way to change what was actually parsed; this one runs live
/// and can turn a would-be match into an immediate empty success.
pub trait AstFilter: Send + Sync {
    fn filter_pre(&mut self, is_udt: bool, index: u32, phrase_offset: usize) -> AstFilterResult;
}

/// Every UDT a grammar references must have a callback registered here
/// before [`crate::facade::Parser::parse`] is called; a UDT opcode
/// with no registered callback is a configuration error, not a parse
/// failure.
#[derive(Default)]
pub struct UdtCallbackTable<A> {
    callbacks: HashMap<UdtIndex, Box<dyn UdtCallback<A>>>,
}

impl<A> UdtCallbackTable<A> {
    pub fn new() -> Self {
        Self { callbacks: HashMap::new() }
    }

    pub fn register(&mut self, udt: UdtIndex, callback: impl UdtCallback<A> + 'static) {
        self.callbacks.insert(udt, Box::new(callback));
    }

    pub fn get(&self, udt: UdtIndex) -> Option<&dyn UdtCallback<A>> {
        self.callbacks.get(&udt).map(|b| b.as_ref())
    }
}
