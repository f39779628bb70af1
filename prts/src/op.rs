// Copyright (C) 2024 Ethan Uppal. All rights reserved.

use std::fmt;

use enum_tags::enum_tags;
use static_assertions::const_assert_eq;
use thiserror::Error;

use crate::{
    arch::{Register, Word},
    decode, encode,
    isa::{self, Role},
};

/// Smallest sized integer type that can fit an op code.
pub type RawOpCode = u8;

/// Smallest sized integer type that can fit an immediate value.
pub type Immediate = u8;

/// A branch destination: the Hilbert distance of the instruction to run next.
pub type Target = u8;

/// Bits for opcode.
pub const OPCODE_BITS: usize = 8;
const_assert_eq!(OPCODE_BITS, RawOpCode::BITS as usize);

/// Bits for each operand slot.
pub const OPERAND_BITS: usize = 8;

/// Operand slots following the opcode.
pub const OPERAND_SLOTS: usize = 3;

#[rustfmt::skip]
mod encoding_layout {
    use super::*;

//  +------------------------------------------------------------------------------------+
//  | One `Op` is one cell of the grid, i.e. one RGBA pixel read as a little-endian      |
//  | `Word`:                                                                            |
//  |                                                                                    |
//  |    bits 0..8    R   opcode                                                         |
//  |    bits 8..16   G   slot A                                                         |
//  |    bits 16..24  B   slot B                                                         |
//  |    bits 24..32  A   slot C                                                         |
//  |                                                                                    |
//  | Which slot holds which operand is decided per opcode by `isa::INSTRUCTION_SET`.    |
//  +------------------------------------------------------------------------------------+
      const_assert_eq!(OPCODE_BITS + OPERAND_SLOTS * OPERAND_BITS, Word::BITS as usize);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("undefined opcode 0x{0:02X}")]
    UndefinedOpcode(RawOpCode),
    #[error("opcode 0x{opcode:02X} names register r{register}, which does not exist")]
    RegisterOutOfRange {
        opcode: RawOpCode,
        register: Register,
    },
}

/// A VM operation. Fields are in the order they are written in assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[enum_tags(public, repr(RawOpCode))]
#[repr(u8)]
pub enum Op {
    /// `Self::Nop` has no effect. An all-zero cell decodes to it.
    Nop = 0x00,
    /// `Self::Mov(a, b)` copies register `b` into register `a`.
    Mov(Register, Register) = 0x01,
    /// `Self::Jmp(t)` continues execution at distance `t`.
    Jmp(Target) = 0x06,
    /// `Self::Halt` stops the machine.
    Halt = 0x07,
    /// `Self::Ldi(a, i)` loads `i` into register `a`.
    Ldi(Register, Immediate) = 0x08,
    /// `Self::Add(a, b, c)` loads the sum of registers `b` and `c` into `a`.
    Add(Register, Register, Register) = 0x33,
    /// `Self::Sub(a, b, c)` loads `b - c` into `a`.
    Sub(Register, Register, Register) = 0x34,
    /// `Self::Mul(a, b, c)` loads `b * c` into `a`.
    Mul(Register, Register, Register) = 0x35,
    /// `Self::Div(a, b, c)` loads `b / c` into `a`.
    Div(Register, Register, Register) = 0x36,
    /// `Self::Cmp(a, b)` sets the flags from comparing `a` against `b`.
    Cmp(Register, Register) = 0x37,
    /// `Self::Beq(a, b, t)` continues at `t` when `a` and `b` are equal.
    Beq(Register, Register, Target) = 0x38,
    /// `Self::Addi(a, b, i)` loads `b + i` into `a`.
    Addi(Register, Register, Immediate) = 0x39,
    /// `Self::Subi(a, b, i)` loads `b - i` into `a`.
    Subi(Register, Register, Immediate) = 0x3A,
    /// `Self::Ldp(a, b)` loads the cell at the distance held in `b` into `a`.
    Ldp(Register, Register) = 0x47,
    /// `Self::Stp(a, b)` stores `a` into the cell at the distance held in `b`.
    Stp(Register, Register) = 0x48,
    /// `Self::NativeExec(f, a, b)` calls host function `f` with the value of
    /// `a` and stores the result in `b`.
    NativeExec(Immediate, Register, Register) = 0xF0,
}

impl Op {
    pub const fn opcode(&self) -> RawOpCode {
        self.tag()
    }

    /// Operand values in source order, zero-padded.
    pub const fn operands(&self) -> [u8; OPERAND_SLOTS] {
        match *self {
            Self::Nop | Self::Halt => [0, 0, 0],
            Self::Jmp(t) => [t, 0, 0],
            Self::Mov(a, b)
            | Self::Ldi(a, b)
            | Self::Cmp(a, b)
            | Self::Ldp(a, b)
            | Self::Stp(a, b) => [a, b, 0],
            Self::Add(a, b, c)
            | Self::Sub(a, b, c)
            | Self::Mul(a, b, c)
            | Self::Div(a, b, c)
            | Self::Beq(a, b, c)
            | Self::Addi(a, b, c)
            | Self::Subi(a, b, c)
            | Self::NativeExec(a, b, c) => [a, b, c],
        }
    }

    /// Builds an operation from its opcode and source-order operands. Extra
    /// operands are ignored.
    pub const fn from_operands(
        opcode: RawOpCode,
        [a, b, c]: [u8; OPERAND_SLOTS],
    ) -> Option<Self> {
        Some(match opcode {
            Self::NOP_TAG => Self::Nop,
            Self::MOV_TAG => Self::Mov(a, b),
            Self::JMP_TAG => Self::Jmp(a),
            Self::HALT_TAG => Self::Halt,
            Self::LDI_TAG => Self::Ldi(a, b),
            Self::ADD_TAG => Self::Add(a, b, c),
            Self::SUB_TAG => Self::Sub(a, b, c),
            Self::MUL_TAG => Self::Mul(a, b, c),
            Self::DIV_TAG => Self::Div(a, b, c),
            Self::CMP_TAG => Self::Cmp(a, b),
            Self::BEQ_TAG => Self::Beq(a, b, c),
            Self::ADDI_TAG => Self::Addi(a, b, c),
            Self::SUBI_TAG => Self::Subi(a, b, c),
            Self::LDP_TAG => Self::Ldp(a, b),
            Self::STP_TAG => Self::Stp(a, b),
            Self::NATIVE_EXEC_TAG => Self::NativeExec(a, b, c),
            _ => return None,
        })
    }

    /// Encodes this operation as a [`Word`].
    pub fn encode_packed(&self) -> Word {
        let mut slots = [0u8; OPERAND_SLOTS];
        if let Some(info) = isa::by_opcode(self.opcode()) {
            for (operand, value) in info.operands.iter().zip(self.operands()) {
                slots[operand.slot as usize] = value;
            }
        }

        encode!(Word;
            [..OPCODE_BITS..] = self.opcode(),
            [..OPERAND_BITS..] = slots[0],
            [..OPERAND_BITS..] = slots[1],
            [..OPERAND_BITS..] = slots[2]
        )
    }

    /// Decodes this operation from a [`Word`]. Slots the opcode does not use
    /// are ignored.
    pub fn decode_packed(word: Word) -> Result<Self, DecodeError> {
        decode!(word; Word;
            @(
                opcode: RawOpCode = [..OPCODE_BITS..],
                a: u8 = [..OPERAND_BITS..],
                b: u8 = [..OPERAND_BITS..],
                c: u8 = [..OPERAND_BITS..]
            ) => {
                let info = isa::by_opcode(opcode)
                    .ok_or(DecodeError::UndefinedOpcode(opcode))?;
                let slots = [a, b, c];

                let mut operands = [0u8; OPERAND_SLOTS];
                for (value, operand) in operands.iter_mut().zip(info.operands) {
                    *value = slots[operand.slot as usize];
                    if operand.role.is_register() && !isa::is_valid_register(*value) {
                        return Err(DecodeError::RegisterOutOfRange {
                            opcode,
                            register: *value,
                        });
                    }
                }

                Self::from_operands(opcode, operands)
                    .ok_or(DecodeError::UndefinedOpcode(opcode))
            }
        )
    }
}

/// Renders the operation as one line of assembly. Registers print as `rN`,
/// everything else as a decimal.
impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(info) = isa::by_opcode(self.opcode()) else {
            return write!(f, "<0x{:02X}>", self.opcode());
        };

        f.write_str(info.mnemonic)?;
        for (index, (operand, value)) in
            info.operands.iter().zip(self.operands()).enumerate()
        {
            f.write_str(if index == 0 { " " } else { ", " })?;
            match operand.role {
                Role::Source | Role::Destination => write!(f, "r{}", value)?,
                Role::Immediate | Role::Target => write!(f, "{}", value)?,
            }
        }
        Ok(())
    }
}
