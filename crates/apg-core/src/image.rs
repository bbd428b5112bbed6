//! The immutable, post-compile representation of a grammar: rule
//! table, UDT table, opcode table, child-index table, string table,
//! character table, and PPPT maps. Produced by an external bootstrap
//! compiler and consumed read-only by the interpreter; this module
//! only implements the loader for the compiled-grammar initializer
//! blob (the core's only contract with that external compiler) plus an
//! in-process builder used by this crate's own tests.

use std::collections::HashMap;
use std::marker::PhantomData;

use crate::alphabet::AlphabetChar;
use crate::error::{ApgResult, GrammarImageError};
use crate::opcode::{BackrefScope, BackrefTarget, ChildRange, Opcode, PpptState};
use crate::rule::{OpcodeIndex, Rule, RuleIndex, Udt, UdtIndex};

const MAGIC: [u8; 4] = *b"APG1";

/// The grammar image. Rule and UDT indices are dense, 0-based, stable
/// for the life of the image; the image is immutable after
/// construction and may be shared (via `Arc`) by any number of parser
/// instances concurrently.
#[derive(Debug)]
pub struct GrammarImage<A: AlphabetChar> {
    starting_rule: RuleIndex,
    alphabet_range: u32,
    rules: Vec<Rule>,
    udts: Vec<Udt>,
    opcodes: Vec<Opcode<A>>,
    child_index: Vec<u32>,
    strings: Vec<u8>,
    chars: Vec<A>,
    pppt_table: Vec<PpptState>,
    rule_names: HashMap<String, RuleIndex>,
    udt_names: HashMap<String, UdtIndex>,
}

impl<A: AlphabetChar> GrammarImage<A> {
    pub fn starting_rule(&self) -> RuleIndex {
        self.starting_rule
    }

    pub fn alphabet_range(&self) -> u32 {
        self.alphabet_range
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn udt_count(&self) -> usize {
        self.udts.len()
    }

    pub fn rule(&self, index: RuleIndex) -> Option<&Rule> {
        self.rules.get(index as usize)
    }

    pub fn udt(&self, index: UdtIndex) -> Option<&Udt> {
        self.udts.get(index as usize)
    }

    pub fn opcode(&self, index: OpcodeIndex) -> Option<&Opcode<A>> {
        self.opcodes.get(index as usize)
    }

    pub fn children(&self, range: ChildRange) -> &[u32] {
        let start = range.offset as usize;
        let end = start + range.count as usize;
        &self.child_index[start..end]
    }

    pub fn rule_name(&self, rule: &Rule) -> &str {
        self.str_at(rule.name_offset, rule.name_len)
    }

    pub fn udt_name(&self, udt: &Udt) -> &str {
        self.str_at(udt.name_offset, udt.name_len)
    }

    pub fn literal(&self, offset: u32, len: u32) -> &[A] {
        let start = offset as usize;
        let end = start.saturating_add(len as usize).min(self.chars.len());
        let start = start.min(end);
        &self.chars[start..end]
    }

    pub fn pppt_map(&self, offset: u32) -> &[PpptState] {
        let start = offset as usize;
        &self.pppt_table[start..start + self.alphabet_range as usize]
    }

    /// The only name-based lookups the core supports.
    pub fn rule_index_by_name(&self, name: &str) -> Option<RuleIndex> {
        self.rule_names.get(name).copied()
    }

    pub fn udt_index_by_name(&self, name: &str) -> Option<UdtIndex> {
        self.udt_names.get(name).copied()
    }

    fn str_at(&self, offset: u32, len: u32) -> &str {
        let start = offset as usize;
        let end = start.saturating_add(len as usize).min(self.strings.len());
        let start = start.min(end);
        std::str::from_utf8(&self.strings[start..end]).unwrap_or("")
    }

    fn check_string_range(&self, offset: u32, len: u32) -> ApgResult<()> {
        if (offset as usize).saturating_add(len as usize) > self.strings.len() {
            return Err(GrammarImageError::StringTableOverrun { offset, len }.into());
        }
        Ok(())
    }

    fn check_char_range(&self, offset: u32, len: u32) -> ApgResult<()> {
        if (offset as usize).saturating_add(len as usize) > self.chars.len() {
            return Err(GrammarImageError::CharTableOverrun { offset, len }.into());
        }
        Ok(())
    }

    /// Parses a compiled-grammar initializer blob (see the external
    /// interfaces section of the specification this crate implements).
    pub fn from_bytes(bytes: &[u8]) -> ApgResult<Self> {
        let mut r = Reader::new(bytes);

        let magic: [u8; 4] = r.take_array()?;
        if magic != MAGIC {
            log::error!("grammar image: bad magic number");
            return Err(GrammarImageError::BadMagic.into());
        }

        let char_width = r.take_u8()?;
        if char_width != A::WIDTH {
            return Err(GrammarImageError::UnsupportedCharWidth { width: char_width }.into());
        }
        let uint_width = r.take_u8()?;
        if uint_width != 4 && uint_width != 8 {
            return Err(GrammarImageError::UnsupportedUintWidth { width: uint_width }.into());
        }
        let _reserved = r.take_u16()?;

        let alphabet_range = r.take_u32()?;
        let starting_rule = r.take_u32()?;
        let rule_count = r.take_u32()?;
        let udt_count = r.take_u32()?;
        let opcode_count = r.take_u32()?;
        let child_index_count = r.take_u32()?;
        let string_table_len = r.take_u32()?;
        let char_table_count = r.take_u32()?;
        let pppt_table_len = r.take_u32()?;

        let mut rules = Vec::with_capacity(rule_count as usize);
        for _ in 0..rule_count {
            let index = r.take_u32()?;
            let pppt_map_offset = r.take_u32()?;
            let name_offset = r.take_u32()?;
            let name_len = r.take_u32()?;
            let first_opcode = r.take_u32()?;
            let opcode_count = r.take_u32()?;
            let empty_flag = r.take_u32()?;
            rules.push(Rule {
                index,
                name_offset,
                name_len,
                first_opcode,
                opcode_count,
                accepts_empty: empty_flag != 0,
                pppt: none_if_max(pppt_map_offset),
            });
        }

        let mut udts = Vec::with_capacity(udt_count as usize);
        for _ in 0..udt_count {
            let index = r.take_u32()?;
            let name_offset = r.take_u32()?;
            let name_len = r.take_u32()?;
            let empty_flag = r.take_u32()?;
            udts.push(Udt { index, name_offset, name_len, may_be_empty: empty_flag != 0 });
        }

        let mut opcodes = Vec::with_capacity(opcode_count as usize);
        for _ in 0..opcode_count {
            let offset = r.pos();
            let tag = r.take_u8()?;
            let opcode = decode_opcode::<A>(tag, offset, &mut r)?;
            opcodes.push(opcode);
        }

        let mut child_index = Vec::with_capacity(child_index_count as usize);
        for _ in 0..child_index_count {
            child_index.push(r.take_u32()?);
        }

        let strings = r.take_bytes(string_table_len as usize)?.to_vec();

        let mut chars = Vec::with_capacity(char_table_count as usize);
        for _ in 0..char_table_count {
            chars.push(A::from_u64(r.take_char_width(char_width)?));
        }

        let mut pppt_table = Vec::with_capacity(pppt_table_len as usize);
        for i in 0..pppt_table_len {
            let byte = r.take_u8()?;
            let state = PpptState::from_u8(byte)
                .ok_or(GrammarImageError::BadPpptState { offset: r.pos() - 1, byte })?;
            let _ = i;
            pppt_table.push(state);
        }

        let image = Self {
            starting_rule,
            alphabet_range,
            rules,
            udts,
            opcodes,
            child_index,
            strings,
            chars,
            pppt_table,
            rule_names: HashMap::new(),
            udt_names: HashMap::new(),
        };

        image.validate()
    }

    fn validate(mut self) -> ApgResult<Self> {
        for rule in &self.rules {
            if rule.index as usize >= self.rules.len() {
                return Err(GrammarImageError::IndexOutOfRange {
                    index: rule.index,
                    len: self.rules.len() as u32,
                }
                .into());
            }
            self.check_string_range(rule.name_offset, rule.name_len)?;
        }
        for udt in &self.udts {
            self.check_string_range(udt.name_offset, udt.name_len)?;
        }
        for opcode in &self.opcodes {
            match opcode {
                Opcode::Tls { offset, len, .. } | Opcode::Tbs { offset, len, .. } => {
                    self.check_char_range(*offset, *len)?;
                }
                _ => {}
            }
        }
        if self.starting_rule as usize >= self.rules.len() && !self.rules.is_empty() {
            return Err(GrammarImageError::IndexOutOfRange {
                index: self.starting_rule,
                len: self.rules.len() as u32,
            }
            .into());
        }
        for (offset, opcode) in self.opcodes.iter().enumerate() {
            if let Opcode::Rnm { rule, .. } = opcode {
                if self.rule(*rule).is_none() {
                    return Err(
                        GrammarImageError::DanglingRuleReference { offset, rule: *rule }.into()
                    );
                }
            }
            if let Opcode::Udt { udt } = opcode {
                if self.udt(*udt).is_none() {
                    return Err(GrammarImageError::DanglingUdtReference { offset, udt: *udt }.into());
                }
            }
            if let Some(pppt) = opcode.pppt_offset() {
                let end = pppt as usize + self.alphabet_range as usize;
                if end > self.pppt_table.len() {
                    return Err(GrammarImageError::PpptLengthMismatch {
                        offset,
                        map_len: (self.pppt_table.len() as u32).saturating_sub(pppt),
                        expected: self.alphabet_range,
                    }
                    .into());
                }
            }
        }

        let mut rule_names = HashMap::with_capacity(self.rules.len());
        for rule in &self.rules {
            rule_names.insert(self.rule_name(rule).to_string(), rule.index);
        }
        let mut udt_names = HashMap::with_capacity(self.udts.len());
        for udt in &self.udts {
            udt_names.insert(self.udt_name(udt).to_string(), udt.index);
        }
        self.rule_names = rule_names;
        self.udt_names = udt_names;

        log::debug!(
            "loaded grammar image: {} rules, {} udts, {} opcodes",
            self.rules.len(),
            self.udts.len(),
            self.opcodes.len()
        );

        Ok(self)
    }
}

fn none_if_max(v: u32) -> Option<u32> {
    if v == u32::MAX {
        None
    } else {
        Some(v)
    }
}

fn decode_opcode<A: AlphabetChar>(
    tag: u8,
    offset: usize,
    r: &mut Reader<'_>,
) -> ApgResult<Opcode<A>> {
    Ok(match tag {
        0 => Opcode::Alt {
            pppt: none_if_max(r.take_u32()?),
            children: ChildRange { offset: r.take_u32()?, count: r.take_u32()? },
        },
        1 => Opcode::Cat {
            pppt: none_if_max(r.take_u32()?),
            children: ChildRange { offset: r.take_u32()?, count: r.take_u32()? },
        },
        2 => {
            let pppt = none_if_max(r.take_u32()?);
            let min = r.take_u32()?;
            let max = none_if_max(r.take_u32()?);
            let child = r.take_u32()?;
            Opcode::Rep { min, max, child, pppt }
        }
        3 => Opcode::Rnm { pppt: none_if_max(r.take_u32()?), rule: r.take_u32()? },
        4 => {
            let pppt = none_if_max(r.take_u32()?);
            let char_width = A::WIDTH;
            let min = A::from_u64(r.take_char_width(char_width)?);
            let max = A::from_u64(r.take_char_width(char_width)?);
            Opcode::Trg { min, max, pppt }
        }
        5 => Opcode::Tls {
            pppt: none_if_max(r.take_u32()?),
            offset: r.take_u32()?,
            len: r.take_u32()?,
        },
        6 => Opcode::Tbs {
            pppt: none_if_max(r.take_u32()?),
            offset: r.take_u32()?,
            len: r.take_u32()?,
        },
        7 => Opcode::Udt { udt: r.take_u32()? },
        8 => Opcode::And { pppt: none_if_max(r.take_u32()?), child: r.take_u32()? },
        9 => Opcode::Not { pppt: none_if_max(r.take_u32()?), child: r.take_u32()? },
        10 => {
            let target_is_udt = r.take_u8()?;
            let target_index = r.take_u32()?;
            let case_insensitive = r.take_u8()? != 0;
            let scope_is_parent = r.take_u8()? != 0;
            let target = if target_is_udt != 0 {
                BackrefTarget::Udt(target_index)
            } else {
                BackrefTarget::Rule(target_index)
            };
            let scope =
                if scope_is_parent { BackrefScope::ParentFrame } else { BackrefScope::Universal };
            Opcode::Bkr { target, case_insensitive, scope }
        }
        11 => Opcode::Bka { child: r.take_u32()? },
        12 => Opcode::Bkn { child: r.take_u32()? },
        13 => Opcode::Abg,
        14 => Opcode::Aen,
        15 => return Err(GrammarImageError::ProseOpcode { offset }.into()),
        kind => return Err(GrammarImageError::BadOpcodeKind { offset, kind }.into()),
    })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn take_bytes(&mut self, len: usize) -> ApgResult<&'a [u8]> {
        if self.pos + len > self.bytes.len() {
            return Err(GrammarImageError::UnexpectedEof {
                expected: self.pos + len,
                found: self.bytes.len(),
            }
            .into());
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> ApgResult<[u8; N]> {
        let slice = self.take_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn take_u8(&mut self) -> ApgResult<u8> {
        Ok(self.take_bytes(1)?[0])
    }

    fn take_u16(&mut self) -> ApgResult<u16> {
        let b = self.take_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn take_u32(&mut self) -> ApgResult<u32> {
        let b = self.take_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn take_char_width(&mut self, width: u8) -> ApgResult<u64> {
        Ok(match width {
            1 => self.take_u8()? as u64,
            2 => self.take_u16()? as u64,
            4 => self.take_u32()? as u64,
            8 => {
                let b = self.take_bytes(8)?;
                u64::from_le_bytes(b.try_into().unwrap())
            }
            w => return Err(GrammarImageError::UnsupportedCharWidth { width: w }.into()),
        })
    }
}

/// In-process builder used by this crate's own tests and by embedding
/// applications that already have a compiled grammar in memory and
/// would rather not round-trip it through the blob format. This is
/// scaffolding, not a grammar-file compiler: it does not parse ABNF
/// text, it only assembles the tables §6.1 describes.
#[derive(Default)]
pub struct GrammarImageBuilder<A: AlphabetChar> {
    starting_rule: RuleIndex,
    alphabet_range: u32,
    rules: Vec<Rule>,
    udts: Vec<Udt>,
    opcodes: Vec<Opcode<A>>,
    child_index: Vec<u32>,
    strings: Vec<u8>,
    chars: Vec<A>,
    pppt_table: Vec<PpptState>,
    _marker: PhantomData<A>,
}

impl<A: AlphabetChar> GrammarImageBuilder<A> {
    pub fn new(alphabet_range: u32) -> Self {
        Self { alphabet_range, ..Default::default() }
    }

    pub fn set_starting_rule(&mut self, rule: RuleIndex) -> &mut Self {
        self.starting_rule = rule;
        self
    }

    /// Interns `name` into the string table, returning `(offset, len)`.
    pub fn intern(&mut self, name: &str) -> (u32, u32) {
        let offset = self.strings.len() as u32;
        self.strings.extend_from_slice(name.as_bytes());
        (offset, name.len() as u32)
    }

    pub fn add_rule(
        &mut self,
        name: &str,
        first_opcode: OpcodeIndex,
        opcode_count: u32,
        accepts_empty: bool,
    ) -> RuleIndex {
        let (name_offset, name_len) = self.intern(name);
        let index = self.rules.len() as RuleIndex;
        self.rules.push(Rule {
            index,
            name_offset,
            name_len,
            first_opcode,
            opcode_count,
            accepts_empty,
            pppt: None,
        });
        index
    }

    pub fn add_udt(&mut self, name: &str, may_be_empty: bool) -> UdtIndex {
        let (name_offset, name_len) = self.intern(name);
        let index = self.udts.len() as UdtIndex;
        self.udts.push(Udt { index, name_offset, name_len, may_be_empty });
        index
    }

    pub fn add_opcode(&mut self, opcode: Opcode<A>) -> OpcodeIndex {
        let index = self.opcodes.len() as OpcodeIndex;
        self.opcodes.push(opcode);
        index
    }

    pub fn add_children(&mut self, children: &[OpcodeIndex]) -> ChildRange {
        let offset = self.child_index.len() as u32;
        self.child_index.extend_from_slice(children);
        ChildRange { offset, count: children.len() as u32 }
    }

    pub fn add_literal(&mut self, chars: &[A]) -> (u32, u32) {
        let offset = self.chars.len() as u32;
        self.chars.extend_from_slice(chars);
        (offset, chars.len() as u32)
    }

    pub fn add_pppt_map(&mut self, states: &[PpptState]) -> u32 {
        assert_eq!(states.len() as u32, self.alphabet_range, "PPPT map must span the alphabet range");
        let offset = self.pppt_table.len() as u32;
        self.pppt_table.extend_from_slice(states);
        offset
    }

    pub fn build(self) -> ApgResult<GrammarImage<A>> {
        let image = GrammarImage {
            starting_rule: self.starting_rule,
            alphabet_range: self.alphabet_range,
            rules: self.rules,
            udts: self.udts,
            opcodes: self.opcodes,
            child_index: self.child_index,
            strings: self.strings,
            chars: self.chars,
            pppt_table: self.pppt_table,
            rule_names: HashMap::new(),
            udt_names: HashMap::new(),
        };
        image.validate()
    }
}
