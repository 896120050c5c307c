//! 30-bit linear feedback shift register of the helicity generator.
//!
//! The feedback bit is the XOR of register stages 7, 28, 29 and 30 (stage 1 is
//! the least significant bit). Stage 30 is always tapped, so the step is a
//! bijection on the 30-bit states and no non-zero seed ever decays to zero.

/// Number of bits in the register.
pub const SEED_BITS: u8 = 30;
/// Mask of the register bits.
pub const SEED_MASK: u32 = 0x3FFF_FFFF;

const TAP_MASK: u32 = 0x0000_0040 | 0x0800_0000 | 0x1000_0000 | 0x2000_0000;

/// Advance the register by one step.
#[inline]
pub fn lfsr_step(seed: u32) -> u32 {
    let newbit = (seed & TAP_MASK).count_ones() & 1;
    ((seed << 1) | newbit) & SEED_MASK
}

/// Shift one reported bit into the register.
#[inline]
pub fn fold_bit(seed: u32, bit: bool) -> u32 {
    ((seed << 1) | u32::from(bit)) & SEED_MASK
}
