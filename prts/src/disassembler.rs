// Copyright (C) 2024 Ethan Uppal. All rights reserved.

//! Recovers assembly text from a program image.
//!
//! Labels do not survive assembly, so branch and jump targets come back as
//! raw distances. Trailing all-zero cells are treated as padding, which means
//! a program that really ends in `NOP`s loses them on the way back.

use tracing::debug;

use crate::{
    arch::{Distance, Word},
    grid::{FormatError, Grid},
    op::{DecodeError, Op},
};

/// Decodes every cell up to the last non-zero one, in program order.
pub fn disassemble_instructions(
    grid: &Grid,
) -> Result<Vec<(Distance, Op)>, FormatError> {
    let words: Vec<Word> = grid.words().collect();
    let length = words.iter().rposition(|&word| word != 0).map_or(0, |i| i + 1);

    words[..length]
        .iter()
        .enumerate()
        .map(|(d, &word)| {
            let d = d as Distance;
            Op::decode_packed(word)
                .map(|op| (d, op))
                .map_err(|error| match error {
                    DecodeError::UndefinedOpcode(opcode) => {
                        FormatError::UndefinedOpcode { d, opcode }
                    }
                    DecodeError::RegisterOutOfRange { opcode, register } => {
                        FormatError::RegisterOutOfRange {
                            d,
                            opcode,
                            register,
                        }
                    }
                })
        })
        .collect()
}

/// Renders a program image as assembly, one instruction per line.
pub fn disassemble(grid: &Grid) -> Result<String, FormatError> {
    let program = disassemble_instructions(grid)?;
    debug!(
        side = grid.side(),
        instructions = program.len(),
        "disassembled program"
    );

    Ok(program
        .iter()
        .map(|(_, op)| op.to_string())
        .collect::<Vec<_>>()
        .join("\n"))
}
