//! Non-recursive recursive-descent interpreter for compiled APG
//! grammar images. [`apg_core`] owns the grammar and the arena; this
//! crate owns the explicit execution-item stack that walks the
//! grammar's opcodes against an input buffer.

mod callbacks;
mod cancel;
mod config;
mod facade;
mod interpreter;

pub use apg_core::{
    AlphabetChar, ApgError, ApgResult, Arena, AstEventKind, AstFilterResult, AstRecord,
    ConfigError, GrammarImage, GrammarImageBuilder, OpcodeKind, RuleIndex, UdtContractError,
    UdtIndex,
};
pub use callbacks::{AstFilter, RuleHook, StatsHook, TraceHook, UdtCallback, UdtCallbackTable};
pub use cancel::CancellationToken;
pub use config::{ParseConfig, ParseOutcome, ParserState};
pub use facade::{Parser, ParserBuilder};
