// Copyright (C) 2024 Ethan Uppal. All rights reserved.

//! The instruction set table: mnemonics, opcode bytes and operand roles.
//!
//! This is the only place the textual and binary shapes of an instruction are
//! written down. The assembler, the disassembler, and [`Op`]'s codec all read
//! it; none of them know a byte layout of their own.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use paste::paste;

use crate::{
    arch::{Register, PC, REGISTER_COUNT, SP},
    op::{Op, RawOpCode},
};

/// What an operand means to the instruction that carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Register read by the instruction.
    Source,
    /// Register written by the instruction.
    Destination,
    /// Byte literal.
    Immediate,
    /// Hilbert distance of a branch or jump destination.
    Target,
}

impl Role {
    pub const fn is_register(self) -> bool {
        matches!(self, Self::Source | Self::Destination)
    }
}

/// Operand byte of a cell. `A`, `B`, `C` are the G, B and A channels; R
/// always holds the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    A = 0,
    B = 1,
    C = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub role: Role,
    pub slot: Slot,
}

/// One row of the instruction set. `operands` is in source order.
#[derive(Debug, PartialEq, Eq)]
pub struct InstructionInfo {
    pub opcode: RawOpCode,
    pub mnemonic: &'static str,
    pub operands: &'static [Operand],
}

impl InstructionInfo {
    pub fn arity(&self) -> usize {
        self.operands.len()
    }
}

macro_rules! instruction_set {
    ($($variant:ident: [$($role:ident @ $slot:ident),*]),* $(,)?) => {
        paste! {
            /// Every instruction, in opcode order.
            pub static INSTRUCTION_SET: &[InstructionInfo] = &[
                $(InstructionInfo {
                    opcode: Op::[<$variant:snake:upper _TAG>],
                    mnemonic: stringify!([<$variant:snake:upper>]),
                    operands: &[$(Operand { role: Role::$role, slot: Slot::$slot }),*],
                }),*
            ];
        }
    };
}

#[rustfmt::skip]
instruction_set! {
    Nop:        [],
    Mov:        [Destination @ C, Source @ A],
    Jmp:        [Target @ A],
    Halt:       [],
    Ldi:        [Destination @ C, Immediate @ A],
    Add:        [Destination @ C, Source @ A, Source @ B],
    Sub:        [Destination @ C, Source @ A, Source @ B],
    Mul:        [Destination @ C, Source @ A, Source @ B],
    Div:        [Destination @ C, Source @ A, Source @ B],
    Cmp:        [Source @ A, Source @ B],
    Beq:        [Source @ A, Source @ B, Target @ C],
    Addi:       [Destination @ C, Source @ A, Immediate @ B],
    Subi:       [Destination @ C, Source @ A, Immediate @ B],
    Ldp:        [Destination @ C, Source @ A],
    Stp:        [Source @ A, Source @ C],
    NativeExec: [Immediate @ A, Source @ B, Destination @ C],
}

static BY_MNEMONIC: Lazy<HashMap<&'static str, &'static InstructionInfo>> =
    Lazy::new(|| {
        INSTRUCTION_SET
            .iter()
            .map(|info| (info.mnemonic, info))
            .collect()
    });

static BY_OPCODE: Lazy<[Option<&'static InstructionInfo>; 256]> =
    Lazy::new(|| {
        let mut table = [None; 256];
        for info in INSTRUCTION_SET {
            table[info.opcode as usize] = Some(info);
        }
        table
    });

/// Looks up a mnemonic, ignoring case.
pub fn by_mnemonic(mnemonic: &str) -> Option<&'static InstructionInfo> {
    BY_MNEMONIC
        .get(mnemonic.to_ascii_uppercase().as_str())
        .copied()
}

pub fn by_opcode(opcode: RawOpCode) -> Option<&'static InstructionInfo> {
    BY_OPCODE[opcode as usize]
}

/// Reverse mapping used when rendering a cell back to text.
pub fn mnemonic(opcode: RawOpCode) -> Option<&'static str> {
    by_opcode(opcode).map(|info| info.mnemonic)
}

const REGISTER_ALIASES: &[(&str, Register)] = &[("sp", SP), ("pc", PC)];

/// Resolves `sp` and `pc` (any case).
pub fn register_alias(name: &str) -> Option<Register> {
    REGISTER_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
        .map(|&(_, register)| register)
}

pub fn is_valid_register(register: u8) -> bool {
    (register as usize) < REGISTER_COUNT
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn keeps_the_fixed_opcode_values() {
        let expected = [
            ("NOP", 0x00),
            ("MOV", 0x01),
            ("JMP", 0x06),
            ("HALT", 0x07),
            ("LDI", 0x08),
            ("ADD", 0x33),
            ("SUB", 0x34),
            ("MUL", 0x35),
            ("DIV", 0x36),
            ("CMP", 0x37),
            ("BEQ", 0x38),
            ("LDP", 0x47),
            ("STP", 0x48),
            ("NATIVE_EXEC", 0xF0),
        ];
        for (mnemonic, opcode) in expected {
            assert_eq!(Some(opcode), by_mnemonic(mnemonic).map(|i| i.opcode));
            assert_eq!(Some(mnemonic), super::mnemonic(opcode));
        }
    }

    #[test]
    fn table_covers_every_op_exactly_once() {
        let opcodes: HashSet<_> =
            INSTRUCTION_SET.iter().map(|info| info.opcode).collect();
        let mnemonics: HashSet<_> =
            INSTRUCTION_SET.iter().map(|info| info.mnemonic).collect();
        assert_eq!(INSTRUCTION_SET.len(), opcodes.len());
        assert_eq!(INSTRUCTION_SET.len(), mnemonics.len());
        assert_eq!(Op::TAGS.len(), INSTRUCTION_SET.len());
        for tag in Op::TAGS {
            assert!(by_opcode(*tag).is_some(), "no table row for 0x{tag:02X}");
        }
    }

    #[test]
    fn operand_slots_never_overlap() {
        for info in INSTRUCTION_SET {
            let slots: HashSet<_> =
                info.operands.iter().map(|operand| operand.slot).collect();
            assert_eq!(info.arity(), slots.len(), "{}", info.mnemonic);
        }
    }

    #[test]
    fn mnemonics_ignore_case() {
        assert_eq!(by_mnemonic("ldi"), by_mnemonic("LDI"));
        assert_eq!(by_mnemonic("Native_Exec"), by_mnemonic("NATIVE_EXEC"));
        assert!(by_mnemonic("PUSH").is_none());
        assert!(by_opcode(0x02).is_none());
    }

    #[test]
    fn resolves_register_aliases() {
        assert_eq!(Some(30), register_alias("sp"));
        assert_eq!(Some(31), register_alias("PC"));
        assert_eq!(None, register_alias("r1"));
        assert!(is_valid_register(31));
        assert!(!is_valid_register(32));
    }
}
