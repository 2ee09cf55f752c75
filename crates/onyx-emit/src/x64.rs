//! x86-64 backend: thin wrapper over the `iced-x86` code assembler.

use iced_x86::IcedError;
use iced_x86::code_asm::{AsmRegister32, AsmRegister64, CodeAssembler, CodeLabel, dword_ptr, qword_ptr, *};

use crate::error::EmitError;
use crate::{CallArg, HostReg};

/// Register conventions for compiled blocks (System V).
pub mod abi {
    use crate::HostReg;

    /// Core pointer (r15), pinned for the whole block.
    pub const CTX: HostReg = HostReg(15);
    /// Register-file pointer (r14), pinned for the whole block.
    pub const REGS: HostReg = HostReg(14);
    /// Registers managed by the virtual register pool (callee-saved:
    /// rbx, rbp, r12, r13).
    pub const POOL: [HostReg; 4] = [HostReg(3), HostReg(5), HostReg(12), HostReg(13)];
    /// Scratch registers; dead across helper calls.
    pub const SCRATCH0: HostReg = HostReg(0); // rax
    pub const SCRATCH1: HostReg = HostReg(10); // r10
    pub const SCRATCH2: HostReg = HostReg(11); // r11
    /// Helper-call return value (rax).
    pub const RET: HostReg = HostReg(0);

    /// System V integer argument order: rdi, rsi, rdx, rcx.
    pub(super) const ARGS: [HostReg; 4] = [HostReg(7), HostReg(6), HostReg(2), HostReg(1)];
}

const GP64: [AsmRegister64; 16] =
    [rax, rcx, rdx, rbx, rsp, rbp, rsi, rdi, r8, r9, r10, r11, r12, r13, r14, r15];

const GP32: [AsmRegister32; 16] = [
    eax, ecx, edx, ebx, esp, ebp, esi, edi, r8d, r9d, r10d, r11d, r12d, r13d, r14d, r15d,
];

fn gp64(reg: HostReg) -> AsmRegister64 {
    GP64[reg.0 as usize]
}

fn gp32(reg: HostReg) -> AsmRegister32 {
    GP32[reg.0 as usize]
}

impl From<IcedError> for EmitError {
    fn from(e: IcedError) -> Self {
        Self::Encode(e.to_string())
    }
}

/// An opaque label handle (mirrors the AArch64 backend's).
pub use crate::buffer::Label;

/// x86-64 block assembler.
pub struct BlockAssembler {
    asm: CodeAssembler,
    labels: Vec<CodeLabel>,
}

impl BlockAssembler {
    pub fn new() -> Result<Self, EmitError> {
        Ok(Self { asm: CodeAssembler::new(64)?, labels: Vec::new() })
    }

    /// Save callee-saved registers, align the stack for calls, and pin the
    /// core/register-file pointers out of the argument registers.
    pub fn prologue(&mut self) -> Result<(), EmitError> {
        self.asm.push(rbp)?;
        self.asm.push(rbx)?;
        self.asm.push(r12)?;
        self.asm.push(r13)?;
        self.asm.push(r14)?;
        self.asm.push(r15)?;
        self.asm.sub(rsp, 8)?;
        self.asm.mov(r15, rdi)?;
        self.asm.mov(r14, rsi)?;
        Ok(())
    }

    pub fn epilogue(&mut self) -> Result<(), EmitError> {
        self.asm.add(rsp, 8)?;
        self.asm.pop(r15)?;
        self.asm.pop(r14)?;
        self.asm.pop(r13)?;
        self.asm.pop(r12)?;
        self.asm.pop(rbx)?;
        self.asm.pop(rbp)?;
        self.asm.ret()?;
        Ok(())
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(self.asm.create_label());
        Label(self.labels.len() - 1)
    }

    pub fn bind(&mut self, label: Label) -> Result<(), EmitError> {
        let mut l = self.labels[label.0];
        self.asm.set_label(&mut l)?;
        self.labels[label.0] = l;
        Ok(())
    }

    pub fn mov(&mut self, dst: HostReg, src: HostReg) -> Result<(), EmitError> {
        self.asm.mov(gp64(dst), gp64(src))?;
        Ok(())
    }

    pub fn mov_imm(&mut self, dst: HostReg, imm: u64) -> Result<(), EmitError> {
        self.asm.mov(gp64(dst), imm)?;
        Ok(())
    }

    pub fn load_field(&mut self, dst: HostReg, offset: i32) -> Result<(), EmitError> {
        self.asm.mov(gp64(dst), qword_ptr(r14 + offset))?;
        Ok(())
    }

    pub fn store_field(&mut self, offset: i32, src: HostReg) -> Result<(), EmitError> {
        self.asm.mov(qword_ptr(r14 + offset), gp64(src))?;
        Ok(())
    }

    pub fn load_field32(&mut self, dst: HostReg, offset: i32) -> Result<(), EmitError> {
        self.asm.mov(gp32(dst), dword_ptr(r14 + offset))?;
        Ok(())
    }

    pub fn store_field32(&mut self, offset: i32, src: HostReg) -> Result<(), EmitError> {
        self.asm.mov(dword_ptr(r14 + offset), gp32(src))?;
        Ok(())
    }

    pub fn add(&mut self, dst: HostReg, src: HostReg) -> Result<(), EmitError> {
        self.asm.add(gp64(dst), gp64(src))?;
        Ok(())
    }

    pub fn sub(&mut self, dst: HostReg, src: HostReg) -> Result<(), EmitError> {
        self.asm.sub(gp64(dst), gp64(src))?;
        Ok(())
    }

    pub fn and(&mut self, dst: HostReg, src: HostReg) -> Result<(), EmitError> {
        self.asm.and(gp64(dst), gp64(src))?;
        Ok(())
    }

    pub fn or(&mut self, dst: HostReg, src: HostReg) -> Result<(), EmitError> {
        self.asm.or(gp64(dst), gp64(src))?;
        Ok(())
    }

    pub fn xor(&mut self, dst: HostReg, src: HostReg) -> Result<(), EmitError> {
        self.asm.xor(gp64(dst), gp64(src))?;
        Ok(())
    }

    pub fn add_imm(&mut self, dst: HostReg, imm: i32) -> Result<(), EmitError> {
        self.asm.add(gp64(dst), imm)?;
        Ok(())
    }

    pub fn shl_imm(&mut self, dst: HostReg, shift: u8) -> Result<(), EmitError> {
        if shift != 0 {
            self.asm.shl(gp64(dst), i32::from(shift))?;
        }
        Ok(())
    }

    pub fn shr_imm(&mut self, dst: HostReg, shift: u8) -> Result<(), EmitError> {
        if shift != 0 {
            self.asm.shr(gp64(dst), i32::from(shift))?;
        }
        Ok(())
    }

    pub fn sar_imm(&mut self, dst: HostReg, shift: u8) -> Result<(), EmitError> {
        if shift != 0 {
            self.asm.sar(gp64(dst), i32::from(shift))?;
        }
        Ok(())
    }

    pub fn jump(&mut self, label: Label) -> Result<(), EmitError> {
        self.asm.jmp(self.labels[label.0])?;
        Ok(())
    }

    pub fn jump_if_zero(&mut self, reg: HostReg, label: Label) -> Result<(), EmitError> {
        self.asm.test(gp64(reg), gp64(reg))?;
        self.asm.je(self.labels[label.0])?;
        Ok(())
    }

    pub fn jump_if_not_zero(&mut self, reg: HostReg, label: Label) -> Result<(), EmitError> {
        self.asm.test(gp64(reg), gp64(reg))?;
        self.asm.jne(self.labels[label.0])?;
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
                    debug_assert!(
                        !abi::ARGS.contains(&src),
                        "argument source clobbered by argument setup"
                    );
                    self.mov(dst, src)?;
                }
                CallArg::Imm(imm) => self.mov_imm(dst, imm)?,
            }
        }
        self.asm.mov(r11, func as u64)?;
        self.asm.call(r11)?;
        Ok(())
    }

    /// Copy the helper return value out of rax.
    pub fn take_ret(&mut self, dst: HostReg) -> Result<(), EmitError> {
        self.mov(dst, abi::RET)
    }

    pub fn finish(mut self) -> Result<Vec<u8>, EmitError> {
        // Branch targets are label-relative, so the assemble base is
        // irrelevant to the emitted bytes.
        Ok(self.asm.assemble(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mov_reg_reg_bytes() {
        let mut asm = BlockAssembler::new().unwrap();
        asm.mov(HostReg(0), HostReg(3)).unwrap();
        assert_eq!(asm.finish().unwrap(), vec![0x48, 0x89, 0xD8]);
    }

    #[test]
    fn field_load_uses_regs_base() {
        let mut asm = BlockAssembler::new().unwrap();
        asm.load_field(HostReg(3), 0x10).unwrap();
        // mov rbx, [r14+0x10]
        assert_eq!(asm.finish().unwrap(), vec![0x49, 0x8B, 0x5E, 0x10]);
    }

    #[test]
    fn forward_branch_resolves() {
        let mut asm = BlockAssembler::new().unwrap();
        let l = asm.new_label();
        asm.jump_if_zero(HostReg(0), l).unwrap();
        asm.add_imm(HostReg(0), 1).unwrap();
        asm.bind(l).unwrap();
        asm.epilogue().unwrap();
        let code = asm.finish().unwrap();
        // test rax, rax
        assert_eq!(&code[0..3], &[0x48, 0x85, 0xC0]);
    }

    #[test]
    fn prologue_pins_context() {
        let mut asm = BlockAssembler::new().unwrap();
        asm.prologue().unwrap();
        asm.epilogue().unwrap();
        let code = asm.finish().unwrap();
        assert_eq!(code[0], 0x55); // push rbp
        assert_eq!(*code.last().unwrap(), 0xC3); // ret
    }
}
