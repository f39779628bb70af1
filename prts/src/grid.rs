// Copyright (C) 2024 Ethan Uppal. All rights reserved.

use thiserror::Error;

use crate::{
    arch::{Distance, Register, Side, Word, CHANNELS, MAX_SIDE},
    hilbert::{grid_side_for, HilbertCurve, HilbertError},
    op::RawOpCode,
};

/// Reasons a pixel buffer is not a usable program image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("image has no pixels")]
    Empty,
    #[error("image is {width}x{height}, but program images are square")]
    NotSquare { width: u32, height: u32 },
    #[error("image side {0} is not a power of two")]
    NotPowerOfTwo(Side),
    #[error("image side {0} exceeds the maximum of {max}", max = MAX_SIDE)]
    TooLarge(u64),
    #[error("expected {expected} bytes of RGBA data, found {actual}")]
    BufferSize { expected: usize, actual: usize },
    #[error("undefined opcode 0x{opcode:02X} at d={d}")]
    UndefinedOpcode { d: Distance, opcode: RawOpCode },
    #[error("opcode 0x{opcode:02X} at d={d} names register r{register}, which does not exist")]
    RegisterOutOfRange {
        d: Distance,
        opcode: RawOpCode,
        register: Register,
    },
}

/// Program memory: a square RGBA raster, one instruction [`Word`] per pixel,
/// addressed by Hilbert distance.
///
/// Pixels are stored row-major, four bytes each, which is the layout image
/// codecs hand out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    curve: HilbertCurve,
    pixels: Vec<u8>,
}

impl Grid {
    /// An all-zero grid with the given side.
    pub fn blank(side: Side) -> Result<Self, FormatError> {
        let curve = curve_for(side)?;
        Ok(Self {
            curve,
            pixels: vec![0; curve.area() as usize * CHANNELS],
        })
    }

    /// Lays `words` out along the curve of the smallest grid that holds them.
    /// Cells past the end of the program stay zero.
    pub fn from_program(words: &[Word]) -> Result<Self, FormatError> {
        let side = grid_side_for(words.len());
        if side > MAX_SIDE {
            return Err(FormatError::TooLarge(side as u64));
        }

        let mut grid = Self::blank(side)?;
        let curve = grid.curve;
        for ((x, y), &word) in curve.iter().zip(words) {
            grid.put(x, y, word);
        }
        Ok(grid)
    }

    /// Wraps raw RGBA8 bytes, as decoded from an image file.
    pub fn from_rgba(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    ) -> Result<Self, FormatError> {
        if width == 0 || height == 0 {
            return Err(FormatError::Empty);
        }
        if width != height {
            return Err(FormatError::NotSquare { width, height });
        }

        let curve = curve_for(width)?;
        let expected = curve.area() as usize * CHANNELS;
        if pixels.len() != expected {
            return Err(FormatError::BufferSize {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self { curve, pixels })
    }

    pub fn side(&self) -> Side {
        self.curve.side()
    }

    pub fn area(&self) -> u64 {
        self.curve.area()
    }

    pub fn curve(&self) -> &HilbertCurve {
        &self.curve
    }

    /// The cell at `(x, y)`, or `None` outside the grid.
    pub fn word_at(&self, x: u32, y: u32) -> Option<Word> {
        let offset = self.offset(x, y)?;
        let bytes = &self.pixels[offset..offset + CHANNELS];
        Some(Word::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Overwrites the cell at `(x, y)`. Returns `false` outside the grid.
    pub fn set_word(&mut self, x: u32, y: u32, word: Word) -> bool {
        match self.offset(x, y) {
            Some(_) => {
                self.put(x, y, word);
                true
            }
            None => false,
        }
    }

    pub fn word_at_distance(&self, d: Distance) -> Result<Word, HilbertError> {
        let (x, y) = self.curve.d2xy(d)?;
        Ok(self.word_at(x, y).unwrap_or_default())
    }

    pub fn set_word_at_distance(
        &mut self,
        d: Distance,
        word: Word,
    ) -> Result<(), HilbertError> {
        let (x, y) = self.curve.d2xy(d)?;
        self.put(x, y, word);
        Ok(())
    }

    /// Every cell in Hilbert order, i.e. in program order.
    pub fn words(&self) -> impl Iterator<Item = Word> + '_ {
        self.curve
            .iter()
            .map(|(x, y)| self.word_at(x, y).unwrap_or_default())
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|&byte| byte == 0)
    }

    pub fn as_rgba(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_rgba(self) -> Vec<u8> {
        self.pixels
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        let side = self.side();
        (x < side && y < side)
            .then(|| (y as usize * side as usize + x as usize) * CHANNELS)
    }

    fn put(&mut self, x: u32, y: u32, word: Word) {
        if let Some(offset) = self.offset(x, y) {
            self.pixels[offset..offset + CHANNELS]
                .copy_from_slice(&word.to_le_bytes());
        }
    }
}

fn curve_for(side: Side) -> Result<HilbertCurve, FormatError> {
    if side == 0 {
        return Err(FormatError::Empty);
    }
    if side > MAX_SIDE {
        return Err(FormatError::TooLarge(side as u64));
    }
    HilbertCurve::new(side).map_err(|_| FormatError::NotPowerOfTwo(side))
}
