//! Per-parse configuration: which rule to start from, which substring
//! of the input is in play, and the depth guard that bounds the
//! explicit execution-item stack.

use apg_core::{ApgResult, ConfigError, RuleIndex};

/// Terminal state of a match attempt against one opcode, rule, or UDT.
/// `Active` never escapes the interpreter; it is an intermediate state
/// of an in-progress activation and is never a valid UDT callback
/// result or a value stored in a back-reference registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParserState {
    Active,
    Match,
    Empty,
    NoMatch,
}

impl ParserState {
    pub fn is_success(self) -> bool {
        matches!(self, ParserState::Match | ParserState::Empty)
    }
}

/// Configuration for one call to [`crate::facade::Parser::parse`].
/// Built with the builder methods below rather than constructed by
/// field literal, matching the config-object style the interpreter's
/// other builder types use.
#[derive(Clone, Debug)]
pub struct ParseConfig<'i, A> {
    pub(crate) input: &'i [A],
    pub(crate) starting_rule: Option<RuleIndex>,
    pub(crate) substring_begin: usize,
    pub(crate) substring_end: Option<usize>,
    pub(crate) max_lookbehind: usize,
    pub(crate) max_depth: usize,
}

const DEFAULT_MAX_LOOKBEHIND: usize = 4096;
const DEFAULT_MAX_DEPTH: usize = 8192;

impl<'i, A> ParseConfig<'i, A> {
    pub fn new(input: &'i [A]) -> Self {
        Self {
            input,
            starting_rule: None,
            substring_begin: 0,
            substring_end: None,
            max_lookbehind: DEFAULT_MAX_LOOKBEHIND,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Overrides the grammar's declared starting rule.
    pub fn starting_rule(mut self, rule: RuleIndex) -> Self {
        self.starting_rule = Some(rule);
        self
    }

    /// Restricts the parse to `input[begin..end]`. ABG/AEN and
    /// look-ahead/look-behind all measure against this sub-string, not
    /// against the full input buffer.
    pub fn substring(mut self, begin: usize, end: usize) -> Self {
        self.substring_begin = begin;
        self.substring_end = Some(end);
        self
    }

    /// Bounds how far BKA/BKN may walk backward from the current
    /// cursor before giving up and reporting a match, preventing a
    /// pathological look-behind from scanning the entire input for
    /// every character consumed.
    pub fn max_lookbehind(mut self, max: usize) -> Self {
        self.max_lookbehind = max;
        self
    }

    /// Bounds the depth of the explicit execution-item stack. Exceeding
    /// this returns [`apg_core::ApgError::DepthExceeded`] rather than
    /// overflowing the host stack or spinning forever on a left
    /// recursive grammar.
    pub fn max_depth(mut self, max: usize) -> Self {
        self.max_depth = max;
        self
    }

    pub(crate) fn resolve(
        &self,
        default_starting_rule: RuleIndex,
        rule_count: u32,
    ) -> ApgResult<(RuleIndex, usize, usize)> {
        let rule = self.starting_rule.unwrap_or(default_starting_rule);
        if rule >= rule_count {
            return Err(ConfigError::InvalidStartingRule { rule, rule_count }.into());
        }
        let end = self.substring_end.unwrap_or(self.input.len());
        if self.substring_begin > end || end > self.input.len() {
            return Err(ConfigError::SubstringOutOfRange {
                begin: self.substring_begin,
                end,
                input_len: self.input.len(),
            }
            .into());
        }
        Ok((rule, self.substring_begin, end))
    }
}

/// Summary of a completed parse attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParseOutcome {
    pub state: ParserState,
    /// Whether the match consumed the entire configured substring.
    pub consumed_all: bool,
    pub matched_length: usize,
    pub input_length: usize,
    /// Deepest the execution-item stack reached during this parse.
    pub max_depth_reached: usize,
    /// Number of opcode activations performed, for coarse profiling
    /// without requiring a [`crate::callbacks::StatsHook`].
    pub node_visit_count: u64,
}
