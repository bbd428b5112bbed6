//! Grammar image, arena, and data model for the APG recursive-descent
//! parsing engine. This crate owns everything the interpreter treats
//! as read-only input (the compiled grammar) or scratch storage (the
//! arena and the structures built on top of it); `apg_runtime` owns
//! the interpreter itself.

pub mod alphabet;
pub mod arena;
pub mod ast;
pub mod backref;
pub mod error;
pub mod image;
pub mod opcode;
pub mod rule;
pub mod sequence;

pub use alphabet::{ascii_fold_eq, AlphabetChar};
pub use arena::Arena;
pub use ast::{translate as translate_ast_records, AstEventKind, AstFilterResult, AstRecord, AstRecorder, CaptureKey};
pub use backref::{BackrefEntry, FrameSnapshot, UniversalRegistry};
pub use error::{ApgError, ApgResult, ConfigError, GrammarImageError, UdtContractError};
pub use image::{GrammarImage, GrammarImageBuilder};
pub use opcode::{BackrefScope, BackrefTarget, ChildRange, Opcode, OpcodeKind, PpptState};
pub use rule::{OpcodeIndex, Rule, RuleIndex, Udt, UdtIndex};
pub use sequence::DynamicSequence;
