//! The fifteen opcode variants and the PPPT map state they carry.

use crate::alphabet::AlphabetChar;
use crate::rule::{OpcodeIndex, RuleIndex, UdtIndex};

/// One entry of a PPPT map. Matches the literal `{0,1,2,3}` encoding
/// the compiled-grammar blob uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PpptState {
    NoMatch = 0,
    Match = 1,
    Empty = 2,
    Active = 3,
}

impl PpptState {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::NoMatch),
            1 => Some(Self::Match),
            2 => Some(Self::Empty),
            3 => Some(Self::Active),
            _ => None,
        }
    }
}

/// `(offset, count)` into the child-index table, used by ALT and CAT.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChildRange {
    pub offset: u32,
    pub count: u32,
}

/// Which registry scope a BKR opcode reads from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackrefScope {
    /// Reads the most recent value regardless of position in the
    /// parse tree.
    Universal,
    /// Reads from the enclosing RNM frame's own table, ignoring
    /// matches made in sibling subtrees.
    ParentFrame,
}

/// What a BKR opcode refers back to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackrefTarget {
    Rule(RuleIndex),
    Udt(UdtIndex),
}

/// One compiled instruction. Each variant carries only the fields
/// relevant to it; only the nine variants that can short-circuit via
/// PPPT carry a `pppt` field (UDT, BKR, BKA, BKN, ABG, AEN never do).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Opcode<A: AlphabetChar> {
    /// Matches the first child that succeeds.
    Alt { children: ChildRange, pppt: Option<u32> },
    /// Matches all children in order; restores the cursor on failure.
    Cat { children: ChildRange, pppt: Option<u32> },
    /// Greedy longest repetition within `[min, max]`; `max = None`
    /// means unbounded.
    Rep { min: u32, max: Option<u32>, child: OpcodeIndex, pppt: Option<u32> },
    /// The phrase defined by the referenced rule.
    Rnm { rule: RuleIndex, pppt: Option<u32> },
    /// One alphabet char in `[min, max]`.
    Trg { min: A, max: A, pppt: Option<u32> },
    /// Case-insensitive ASCII literal; `(offset, len)` into the
    /// character table.
    Tls { offset: u32, len: u32, pppt: Option<u32> },
    /// Case-sensitive literal; `(offset, len)` into the character
    /// table.
    Tbs { offset: u32, len: u32, pppt: Option<u32> },
    /// Whatever the registered callback accepts.
    Udt { udt: UdtIndex },
    /// Succeeds iff the child succeeds; consumes nothing.
    And { child: OpcodeIndex, pppt: Option<u32> },
    /// Succeeds iff the child fails; consumes nothing.
    Not { child: OpcodeIndex, pppt: Option<u32> },
    /// The last phrase matched by the referenced rule/UDT under the
    /// given scope.
    Bkr { target: BackrefTarget, case_insensitive: bool, scope: BackrefScope },
    /// Positive look-behind; consumes nothing.
    Bka { child: OpcodeIndex },
    /// Negative look-behind; consumes nothing.
    Bkn { child: OpcodeIndex },
    /// Succeeds iff the cursor is at the sub-string start.
    Abg,
    /// Succeeds iff the cursor is at the sub-string end.
    Aen,
}

/// Opcode kind tag without payload, used by trace/stats hooks so they
/// don't need to match on the alphabet-parameterized `Opcode<A>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpcodeKind {
    Alt,
    Cat,
    Rep,
    Rnm,
    Trg,
    Tls,
    Tbs,
    Udt,
    And,
    Not,
    Bkr,
    Bka,
    Bkn,
    Abg,
    Aen,
}

impl<A: AlphabetChar> Opcode<A> {
    pub fn kind(&self) -> OpcodeKind {
        match self {
            Opcode::Alt { .. } => OpcodeKind::Alt,
            Opcode::Cat { .. } => OpcodeKind::Cat,
            Opcode::Rep { .. } => OpcodeKind::Rep,
            Opcode::Rnm { .. } => OpcodeKind::Rnm,
            Opcode::Trg { .. } => OpcodeKind::Trg,
            Opcode::Tls { .. } => OpcodeKind::Tls,
            Opcode::Tbs { .. } => OpcodeKind::Tbs,
            Opcode::Udt { .. } => OpcodeKind::Udt,
            Opcode::And { .. } => OpcodeKind::And,
            Opcode::Not { .. } => OpcodeKind::Not,
            Opcode::Bkr { .. } => OpcodeKind::Bkr,
            Opcode::Bka { .. } => OpcodeKind::Bka,
            Opcode::Bkn { .. } => OpcodeKind::Bkn,
            Opcode::Abg => OpcodeKind::Abg,
            Opcode::Aen => OpcodeKind::Aen,
        }
    }

    /// The PPPT map offset this opcode carries, if any. `None` for the
    /// six kinds the interpreter must never short-circuit (UDT, BKR,
    /// BKA, BKN, ABG, AEN) as well as for images built without PPPT.
    pub fn pppt_offset(&self) -> Option<u32> {
        match self {
            Opcode::Alt { pppt, .. }
            | Opcode::Cat { pppt, .. }
            | Opcode::Rep { pppt, .. }
            | Opcode::Rnm { pppt, .. }
            | Opcode::Trg { pppt, .. }
            | Opcode::Tls { pppt, .. }
            | Opcode::Tbs { pppt, .. }
            | Opcode::And { pppt, .. }
            | Opcode::Not { pppt, .. } => *pppt,
            Opcode::Udt { .. }
            | Opcode::Bkr { .. }
            | Opcode::Bka { .. }
            | Opcode::Bkn { .. }
            | Opcode::Abg
            | Opcode::Aen => None,
        }
    }
}
