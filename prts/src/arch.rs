// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

use static_assertions::const_assert;

/// One instruction cell, and also the width of a register.
pub type Word = u32;

/// Position of a cell along the Hilbert curve. The program counter holds one.
pub type Distance = u32;

/// Side length of a (square) grid, in cells.
pub type Side = u32;

/// Smallest sized integer type that can fit a register index.
pub type Register = u8;

pub const REGISTER_COUNT: usize = 32;
const_assert!(REGISTER_COUNT <= 1usize << Register::BITS);

/// Stack pointer, by convention.
pub const SP: Register = 30;
const_assert!((SP as usize) < REGISTER_COUNT);

/// Holds the Hilbert distance of the instruction being executed.
pub const PC: Register = 31;
const_assert!((PC as usize) < REGISTER_COUNT);

/// Bytes per grid cell (R, G, B, A).
pub const CHANNELS: usize = 4;
const_assert!(CHANNELS * 8 == Word::BITS as usize);

/// Largest grid side accepted. Keeps `side * side` within a [`Distance`].
pub const MAX_SIDE: Side = 1 << 15;
const_assert!((MAX_SIDE as u64) * (MAX_SIDE as u64) <= Distance::MAX as u64);
