//! DSP56300 instruction set: word formats, operand tables, and the decoder.
//!
//! Program words are 24 bits wide, stored in the low bits of a `u32`. An
//! instruction is one word plus an optional extension word carrying a long
//! immediate or an absolute address. [`decode`] turns a word pair into an
//! [`Instr`]; anything outside the supported set is a [`DecodeError`].

mod decode;
mod fields;
mod ops;

pub use decode::{DecodeError, Instr, decode};
pub use fields::{
    AguMode, Cond, Ea, Reg, Space, StatusField, ctrl_reg_5, ctrl_reg_6, data_reg_5, data_reg_6,
};
pub use ops::{
    AluOp, AluSrc, BitOp, DmacMode, ExtractCtrl, ImmAlu, MoveCOperand, MoveXyHalf, Op,
    ParallelMove, RepCount, ShiftKind, mul_pair,
};

/// Width of a program word in bits.
pub const WORD_BITS: u32 = 24;

/// Mask for a 24-bit program word.
pub const WORD_MASK: u32 = 0x00FF_FFFF;

/// First peripheral-mapped address in X/Y space.
pub const PERIPH_BASE: u32 = 0xFFFF_80;
