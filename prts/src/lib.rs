// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

//! PixelRTS: programs stored as RGBA images, one instruction per pixel,
//! executed in Hilbert curve order.

#![forbid(unsafe_code)]

pub mod arch;
pub mod assembler;
pub mod coding;
pub mod disassembler;
pub mod grid;
pub mod hilbert;
pub mod isa;
pub mod op;
pub mod vm;

pub use assembler::{assemble, AssemblyError};
pub use disassembler::disassemble;
pub use grid::{FormatError, Grid};
pub use vm::{execute, ExecutionError, RegisterFile};
