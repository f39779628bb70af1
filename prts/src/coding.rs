// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

use crate::arch::Word;

/// Iteratively constructs a bitset of a given type from bit fields, least
/// significant field first.
#[macro_export]
macro_rules! encode {
    (
        $T:ty;
        $([..$($width:literal)?$($width2:ident)?..] = $int:expr),*
    ) => {
        {
            let mut offset = 0;
            let mut result: $T = 0;
            $(
                let encoded_int: $T = $crate::coding::CodeAsWord::encode_as_word(&$int);
                let mask: $T = (((1 as $T) << $($width)* $($width2)*) - 1) as $T;
                result |= ((encoded_int & mask) << offset);
                offset += $($width)* $($width2)*;
            )*
            let _ = offset;
            result
        }
    };
}

/// Traits for types that can occupy a field of an instruction [`Word`].
pub trait CodeAsWord {
    /// Encodes `self` into a `Word`. Higher bits are chopped off when the
    /// field is narrower than `Self`.
    fn encode_as_word(&self) -> Word;

    /// Decodes `self` from the least significant bits of `encoded`.
    fn decode_from_word(encoded: Word) -> Self;
}

impl CodeAsWord for u8 {
    fn encode_as_word(&self) -> Word {
        *self as Word
    }

    fn decode_from_word(encoded: Word) -> Self {
        encoded as u8
    }
}

/// Deconstructs a bitset of a given type into bitfields of given types.
#[macro_export]
macro_rules! decode {
    (
        $encoded:expr; $TEnc:ty;
        @($($out:ident: $T:ty =
            [..$($width:literal)?$($width2:ident)?..]),*)
        => $block:expr
    ) => {{
        let mut __offset = 0;
        $(
            let op_width = $($width)*$($width2)* as $TEnc;
            let mask = (1 as $TEnc).checked_shl(op_width).unwrap_or(0).wrapping_sub(1);
            let unsigned_out = ($encoded >> __offset) & mask;
            let $out = <$T as $crate::coding::CodeAsWord>::decode_from_word(unsigned_out);
            __offset += op_width;
        )*
        let _ = __offset;
        $block
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_rgba_order() {
        assert_eq!(
            u32::from_le_bytes([0x08, 10, 0, 1]),
            encode!(Word;
                [..8..] = 0x08u8,
                [..8..] = 10u8,
                [..8..] = 0u8,
                [..8..] = 1u8
            )
        );
    }

    #[test]
    fn truncates_wide_fields() {
        assert_eq!(0x0f, encode!(Word; [..4..] = 0xffu8));
    }

    #[test]
    fn unpacks_fields() {
        decode!(u32::from_le_bytes([0x33, 1, 2, 3]); Word;
            @(op: u8 = [..8..], a: u8 = [..8..], b: u8 = [..8..], c: u8 = [..8..]) => {
                assert_eq!(0x33, op);
                assert_eq!(1, a);
                assert_eq!(2, b);
                assert_eq!(3, c);
            }
        );
    }
}
