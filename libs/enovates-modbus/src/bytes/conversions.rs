//! Numeric and string conversions for register words
//!
//! Provides functions for converting between:
//! - Register pairs ([u16; 2]) ↔ 32-bit values (u32, i32), high word first
//! - Register arrays (u16[]) ↔ byte arrays, high byte first per register
//! - Register arrays ↔ NUL-padded Latin-1 strings

// ============================================================================
// 32-bit Conversions
// ============================================================================

/// Combine 2 registers into a u32 (first register = high 16 bits)
#[inline]
pub fn regs_to_u32(regs: [u16; 2]) -> u32 {
    (u32::from(regs[0]) << 16) | u32::from(regs[1])
}

/// Combine 2 registers into an i32 (two's complement, high word first)
#[inline]
pub fn regs_to_i32(regs: [u16; 2]) -> i32 {
    regs_to_u32(regs) as i32
}

/// Split a u32 into 2 registers (high word first)
#[inline]
pub fn u32_to_regs(value: u32) -> [u16; 2] {
    [(value >> 16) as u16, value as u16]
}

/// Split an i32 into 2 registers (two's complement, high word first)
#[inline]
pub fn i32_to_regs(value: i32) -> [u16; 2] {
    u32_to_regs(value as u32)
}

// ============================================================================
// Byte Conversions
// ============================================================================

/// Flatten registers into bytes, each register contributing high byte then low byte
pub fn regs_to_bytes(regs: &[u16]) -> Vec<u8> {
    regs.iter().flat_map(|reg| reg.to_be_bytes()).collect()
}

/// Pack bytes into registers, two bytes per register (high byte first)
///
/// An odd trailing byte is placed in the high half of the last register.
pub fn bytes_to_regs(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect()
}

// ============================================================================
// Padded String Conversions
// ============================================================================

/// Decode a NUL-padded Latin-1 string stored in registers
///
/// Only trailing NUL bytes are stripped; trailing spaces are part of the value.
/// Every byte maps to the code point of the same value, so decoding never fails.
pub fn regs_to_padded_string(regs: &[u16]) -> String {
    let mut bytes = regs_to_bytes(regs);
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    bytes.into_iter().map(char::from).collect()
}

/// Encode a Latin-1 string into exactly `registers` words, NUL-padded on the right
///
/// Returns `None` if a character is above U+00FF or the text does not fit
/// in `2 * registers` bytes.
pub fn padded_string_to_regs(text: &str, registers: u16) -> Option<Vec<u16>> {
    let width = usize::from(registers) * 2;
    let mut bytes = text
        .chars()
        .map(|c| u8::try_from(c).ok())
        .collect::<Option<Vec<u8>>>()?;
    if bytes.len() > width {
        return None;
    }
    bytes.resize(width, 0);
    Some(bytes_to_regs(&bytes))
}
