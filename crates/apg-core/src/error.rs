//! Error taxonomy shared by the grammar image loader and the runtime
//! interpreter. One variant per fatal-error kind named in the parsing
//! engine's error handling design; each carries the context a caller
//! needs instead of a pre-formatted string.

use thiserror::Error;

/// Crate-wide result alias, named the way the teacher workspace names
/// its own `SherpaResult`/`RadlrResult` aliases.
pub type ApgResult<T> = Result<T, ApgError>;

/// Every fatal error the engine can produce. All of these are fatal to
/// the current parse: the interpreter unwinds, the arena is reset, and
/// exactly one of these is handed back to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApgError {
    #[error("grammar image: {0}")]
    GrammarImage(#[from] GrammarImageError),

    #[error("parser configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("UDT contract violation: {0}")]
    UdtContract(#[from] UdtContractError),

    #[error("UDT callback signalled failure for udt #{udt}: {reason}")]
    UdtCallback { udt: u32, reason: String },

    #[error("execution-item stack exceeded configured depth of {max_depth}")]
    DepthExceeded { max_depth: usize },

    #[error("parse cancelled")]
    Cancelled,

    #[error("integer overflow while computing cursor/length ({context})")]
    IntegerOverflow { context: &'static str },

    #[error("rule hook override for rule #{rule} reported a match of length {length}, which runs past the substring end at {substring_end}")]
    RuleHookRange { rule: u32, length: usize, substring_end: usize },
}

/// Malformed compiled-grammar initializer blob (see the initializer
/// format section of the specification this crate implements).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarImageError {
    #[error("blob is truncated: expected at least {expected} bytes, found {found}")]
    UnexpectedEof { expected: usize, found: usize },

    #[error("bad magic number in header")]
    BadMagic,

    #[error("unsupported alphabet character width: {width} bytes")]
    UnsupportedCharWidth { width: u8 },

    #[error("unsupported compiled unsigned-integer width: {width} bytes")]
    UnsupportedUintWidth { width: u8 },

    #[error("index {index} out of range (table has {len} entries)")]
    IndexOutOfRange { index: u32, len: u32 },

    #[error("opcode at offset {offset} has unknown kind tag {kind}")]
    BadOpcodeKind { offset: usize, kind: u8 },

    #[error("opcode at offset {offset} claims a <prose> kind, which never compiles to opcodes")]
    ProseOpcode { offset: usize },

    #[error(
        "PPPT map for opcode at offset {offset} has length {map_len}, expected {expected} (the alphabet range)"
    )]
    PpptLengthMismatch { offset: usize, map_len: u32, expected: u32 },

    #[error("PPPT map entry {byte} at offset {offset} is not one of {{0,1,2,3}}")]
    BadPpptState { offset: usize, byte: u8 },

    #[error("RNM opcode at offset {offset} references rule {rule}, which does not exist")]
    DanglingRuleReference { offset: usize, rule: u32 },

    #[error("UDT opcode at offset {offset} references UDT {udt}, which does not exist")]
    DanglingUdtReference { offset: usize, udt: u32 },

    #[error("string table offset {offset} with length {len} runs past the end of the string table")]
    StringTableOverrun { offset: u32, len: u32 },

    #[error("character table offset {offset} with length {len} runs past the end of the character table")]
    CharTableOverrun { offset: u32, len: u32 },
}

/// Invalid parser configuration supplied to `parse()`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("starting rule index {rule} is out of range (grammar has {rule_count} rules)")]
    InvalidStartingRule { rule: u32, rule_count: u32 },

    #[error("substring bounds [{begin}, {end}) are out of range for an input of length {input_len}")]
    SubstringOutOfRange { begin: usize, end: usize, input_len: usize },

    #[error("UDT #{udt} (\"{name}\") has no registered callback")]
    MissingUdtCallback { udt: u32, name: String },
}

/// A UDT callback returned a value that violates its own contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UdtContractError {
    #[error("UDT #{udt} callback returned ACTIVE, which is never a valid callback result")]
    ReturnedActive { udt: u32 },

    #[error("UDT #{udt} is declared non-empty (\"u_\" prefix) but matched a zero-length phrase")]
    NonEmptyUdtMatchedEmpty { udt: u32 },

    #[error("UDT #{udt} callback reported a match of length {length}, which runs past the substring end at {substring_end}")]
    MatchRunsPastSubstringEnd { udt: u32, length: usize, substring_end: usize },
}
