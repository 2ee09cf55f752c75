//! AArch64 backend: encodes instruction words directly.

use crate::buffer::{CodeBuffer, Fixup, Label};
use crate::error::EmitError;
use crate::{CallArg, HostReg};

/// Register conventions for compiled blocks.
pub mod abi {
    use crate::HostReg;

    /// Core pointer, pinned for the whole block.
    pub const CTX: HostReg = HostReg(19);
    /// Register-file pointer, pinned for the whole block.
    pub const REGS: HostReg = HostReg(20);
    /// Registers managed by the virtual register pool (callee-saved).
    pub const POOL: [HostReg; 4] = [HostReg(21), HostReg(22), HostReg(23), HostReg(24)];
    /// Scratch registers; dead across helper calls.
    pub const SCRATCH0: HostReg = HostReg(9);
    pub const SCRATCH1: HostReg = HostReg(10);
    pub const SCRATCH2: HostReg = HostReg(11);
    /// Helper-call return value.
    pub const RET: HostReg = HostReg(0);

    pub(super) const ARGS: [HostReg; 4] =
        [HostReg(0), HostReg(1), HostReg(2), HostReg(3)];
}

const SP: u32 = 31;
const XZR: u32 = 31;
const FP: u32 = 29;
const LR: u32 = 30;
/// Intra-procedure-call scratch, used for absolute call targets.
const CALL_TMP: u32 = 16;

/// AArch64 block assembler.
pub struct BlockAssembler {
    buf: CodeBuffer,
}

impl BlockAssembler {
    pub fn new() -> Result<Self, EmitError> {
        Ok(Self { buf: CodeBuffer::new() })
    }

    fn emit(&mut self, word: u32) {
        self.buf.emit_u32(word);
    }

    /// `stp rt1, rt2, [sp, #imm]!`
    fn stp_pre(&mut self, rt1: u32, rt2: u32, imm: i32) {
        let scaled = ((imm / 8) as u32) & 0x7F;
        self.emit(0xA980_0000 | scaled << 15 | rt2 << 10 | SP << 5 | rt1);
    }

    /// `ldp rt1, rt2, [sp], #imm`
    fn ldp_post(&mut self, rt1: u32, rt2: u32, imm: i32) {
        let scaled = ((imm / 8) as u32) & 0x7F;
        self.emit(0xA8C0_0000 | scaled << 15 | rt2 << 10 | SP << 5 | rt1);
    }

    /// Save callee-saved registers and pin the core/register-file pointers.
    pub fn prologue(&mut self) -> Result<(), EmitError> {
        self.stp_pre(FP, LR, -16);
        self.stp_pre(19, 20, -16);
        self.stp_pre(21, 22, -16);
        self.stp_pre(23, 24, -16);
        self.mov(abi::CTX, HostReg(0))?;
        self.mov(abi::REGS, HostReg(1))?;
        Ok(())
    }

    /// Restore callee-saved registers and return.
    pub fn epilogue(&mut self) -> Result<(), EmitError> {
        self.ldp_post(23, 24, 16);
        self.ldp_post(21, 22, 16);
        self.ldp_post(19, 20, 16);
        self.ldp_post(FP, LR, 16);
        self.emit(0xD65F_03C0); // ret
        Ok(())
    }

    pub fn new_label(&mut self) -> Label {
        self.buf.new_label()
    }

    pub fn bind(&mut self, label: Label) -> Result<(), EmitError> {
        self.buf.bind(label)
    }

    /// `mov dst, src` (orr dst, xzr, src).
    pub fn mov(&mut self, dst: HostReg, src: HostReg) -> Result<(), EmitError> {
        self.emit(0xAA00_03E0 | u32::from(src.0) << 16 | u32::from(dst.0));
        Ok(())
    }

    /// Load a 64-bit immediate with movz/movk.
    pub fn mov_imm(&mut self, dst: HostReg, imm: u64) -> Result<(), EmitError> {
        let d = u32::from(dst.0);
        // movz dst, #chunk0
        self.emit(0xD280_0000 | ((imm & 0xFFFF) as u32) << 5 | d);
        for hw in 1..4u32 {
            let chunk = (imm >> (16 * hw)) & 0xFFFF;
            if chunk != 0 {
                self.emit(0xF280_0000 | hw << 21 | (chunk as u32) << 5 | d);
            }
        }
        Ok(())
    }

    /// `ldr dst, [REGS, #offset]` (64-bit field).
    pub fn load_field(&mut self, dst: HostReg, offset: i32) -> Result<(), EmitError> {
        debug_assert!(offset >= 0 && offset % 8 == 0);
        let scaled = (offset / 8) as u32;
        self.emit(0xF940_0000 | scaled << 10 | u32::from(abi::REGS.0) << 5 | u32::from(dst.0));
        Ok(())
    }

    /// `str src, [REGS, #offset]` (64-bit field).
    pub fn store_field(&mut self, offset: i32, src: HostReg) -> Result<(), EmitError> {
        debug_assert!(offset >= 0 && offset % 8 == 0);
        let scaled = (offset / 8) as u32;
        self.emit(0xF900_0000 | scaled << 10 | u32::from(abi::REGS.0) << 5 | u32::from(src.0));
        Ok(())
    }

    /// `ldr wdst, [REGS, #offset]` (32-bit field, zero-extended).
    pub fn load_field32(&mut self, dst: HostReg, offset: i32) -> Result<(), EmitError> {
        debug_assert!(offset >= 0 && offset % 4 == 0);
        let scaled = (offset / 4) as u32;
        self.emit(0xB940_0000 | scaled << 10 | u32::from(abi::REGS.0) << 5 | u32::from(dst.0));
        Ok(())
    }

    /// `str wsrc, [REGS, #offset]` (32-bit field).
    pub fn store_field32(&mut self, offset: i32, src: HostReg) -> Result<(), EmitError> {
        debug_assert!(offset >= 0 && offset % 4 == 0);
        let scaled = (offset / 4) as u32;
        self.emit(0xB900_0000 | scaled << 10 | u32::from(abi::REGS.0) << 5 | u32::from(src.0));
        Ok(())
    }

    pub fn add(&mut self, dst: HostReg, src: HostReg) -> Result<(), EmitError> {
        self.emit(
            0x8B00_0000
                | u32::from(src.0) << 16
                | u32::from(dst.0) << 5
                | u32::from(dst.0),
        );
        Ok(())
    }

    pub fn sub(&mut self, dst: HostReg, src: HostReg) -> Result<(), EmitError> {
        self.emit(
            0xCB00_0000
                | u32::from(src.0) << 16
                | u32::from(dst.0) << 5
                | u32::from(dst.0),
        );
        Ok(())
    }

    pub fn and(&mut self, dst: HostReg, src: HostReg) -> Result<(), EmitError> {
        self.emit(
            0x8A00_0000
                | u32::from(src.0) << 16
                | u32::from(dst.0) << 5
                | u32::from(dst.0),
        );
        Ok(())
    }

    pub fn or(&mut self, dst: HostReg, src: HostReg) -> Result<(), EmitError> {
        self.emit(
            0xAA00_0000
                | u32::from(src.0) << 16
                | u32::from(dst.0) << 5
                | u32::from(dst.0),
        );
        Ok(())
    }

    pub fn xor(&mut self, dst: HostReg, src: HostReg) -> Result<(), EmitError> {
        self.emit(
            0xCA00_0000
                | u32::from(src.0) << 16
                | u32::from(dst.0) << 5
                | u32::from(dst.0),
        );
        Ok(())
    }

    /// `dst += imm` for small immediates.
    pub fn add_imm(&mut self, dst: HostReg, imm: i32) -> Result<(), EmitError> {
        let d = u32::from(dst.0);
        let (base, mag) = if imm >= 0 {
            (0x9100_0000u32, imm as u32)
        } else {
            (0xD100_0000u32, imm.unsigned_abs())
        };
        debug_assert!(mag < 1 << 12);
        self.emit(base | (mag & 0xFFF) << 10 | d << 5 | d);
        Ok(())
    }

    /// Logical shift left by a constant (ubfm).
    pub fn shl_imm(&mut self, dst: HostReg, shift: u8) -> Result<(), EmitError> {
        if shift == 0 {
            return Ok(());
        }
        let d = u32::from(dst.0);
        let sh = u32::from(shift) & 63;
        let immr = 64 - sh & 63;
        let imms = 63 - sh;
        self.emit(0xD340_0000 | immr << 16 | imms << 10 | d << 5 | d);
        Ok(())
    }

    /// Logical shift right by a constant (ubfm).
    pub fn shr_imm(&mut self, dst: HostReg, shift: u8) -> Result<(), EmitError> {
        if shift == 0 {
            return Ok(());
        }
        let d = u32::from(dst.0);
        let sh = u32::from(shift) & 63;
        self.emit(0xD340_0000 | sh << 16 | 63 << 10 | d << 5 | d);
        Ok(())
    }

    /// Arithmetic shift right by a constant (sbfm).
    pub fn sar_imm(&mut self, dst: HostReg, shift: u8) -> Result<(), EmitError> {
        if shift == 0 {
            return Ok(());
        }
        let d = u32::from(dst.0);
        let sh = u32::from(shift) & 63;
        self.emit(0x9340_0000 | sh << 16 | 63 << 10 | d << 5 | d);
        Ok(())
    }

    /// Unconditional branch.
    pub fn jump(&mut self, label: Label) -> Result<(), EmitError> {
        self.buf.emit_fixup(0x1400_0000, label, Fixup::Branch26);
        Ok(())
    }

    /// Branch if `reg == 0` (cbz).
    pub fn jump_if_zero(&mut self, reg: HostReg, label: Label) -> Result<(), EmitError> {
        self.buf.emit_fixup(0xB400_0000 | u32::from(reg.0), label, Fixup::Branch19);
        Ok(())
    }

    /// Branch if `reg != 0` (cbnz).
    pub fn jump_if_not_zero(&mut self, reg: HostReg, label: Label) -> Result<(), EmitError> {
        self.buf.emit_fixup(0xB500_0000 | u32::from(reg.0), label, Fixup::Branch19);
        Ok(())
    }

    /// Call an absolute address with up to four arguments.
    ///
    /// Argument sources must not be ABI argument registers themselves (the
    /// register pool hands out callee-saved registers, so this holds by
    /// construction).
    pub fn call(&mut self, func: usize, args: &[CallArg]) -> Result<(), EmitError> {
        debug_assert!(args.len() <= abi::ARGS.len());
        for (i, arg) in args.iter().enumerate() {
            let dst = abi::ARGS[i];
            match *arg {
                CallArg::Reg(src) => {
                    debug_assert!(src.0 > 3, "argument source clobbered by argument setup");
                    self.mov(dst, src)?;
                }
                CallArg::Imm(imm) => self.mov_imm(dst, imm)?,
            }
        }
        self.mov_imm(HostReg(CALL_TMP as u8), func as u64)?;
        self.emit(0xD63F_0000 | CALL_TMP << 5); // blr x16
        Ok(())
    }

    /// Copy the helper return value out of x0.
    pub fn take_ret(&mut self, dst: HostReg) -> Result<(), EmitError> {
        self.mov(dst, abi::RET)
    }

    pub fn finish(self) -> Result<Vec<u8>, EmitError> {
        self.buf.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(code: &[u8]) -> Vec<u32> {
        code.chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn mov_is_orr_with_xzr() {
        let mut asm = BlockAssembler::new().unwrap();
        asm.mov(HostReg(0), HostReg(1)).unwrap();
        assert_eq!(words(&asm.finish().unwrap()), vec![0xAA01_03E0]);
    }

    #[test]
    fn mov_imm_uses_movz_movk() {
        let mut asm = BlockAssembler::new().unwrap();
        asm.mov_imm(HostReg(9), 0x1_0000).unwrap();
        let w = words(&asm.finish().unwrap());
        // movz x9, #0 ; movk x9, #1, lsl #16
        assert_eq!(w, vec![0xD280_0009, 0xF2A0_0029]);
    }

    #[test]
    fn field_access_scaled_offsets() {
        let mut asm = BlockAssembler::new().unwrap();
        asm.load_field(HostReg(21), 8).unwrap();
        asm.store_field32(4, HostReg(21)).unwrap();
        let w = words(&asm.finish().unwrap());
        // ldr x21, [x20, #8] ; str w21, [x20, #4]
        assert_eq!(w, vec![0xF940_0695, 0xB900_0695]);
    }

    #[test]
    fn cbz_forward_patch() {
        let mut asm = BlockAssembler::new().unwrap();
        let l = asm.new_label();
        asm.jump_if_zero(HostReg(9), l).unwrap();
        asm.add_imm(HostReg(9), 1).unwrap();
        asm.bind(l).unwrap();
        asm.epilogue().unwrap();
        let w = words(&asm.finish().unwrap());
        assert_eq!(w[0], 0xB400_0049); // cbz x9, +2
    }

    #[test]
    fn shifts_encode_as_bitfield_moves() {
        let mut asm = BlockAssembler::new().unwrap();
        asm.shl_imm(HostReg(9), 8).unwrap();
        asm.shr_imm(HostReg(9), 8).unwrap();
        asm.sar_imm(HostReg(9), 8).unwrap();
        let w = words(&asm.finish().unwrap());
        // lsl x9, x9, #8 ; lsr x9, x9, #8 ; asr x9, x9, #8
        assert_eq!(w, vec![0xD378_DD29, 0xD348_FD29, 0x9348_FD29]);
    }
}
