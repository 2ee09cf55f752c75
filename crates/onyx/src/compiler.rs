//! Block compiler.
//!
//! Translates a straight run of instructions starting at one program
//! counter into a compiled unit. Simple register traffic is emitted inline
//! through the register pool; everything with bit-exact arithmetic, memory
//! or status side effects calls the runtime helpers, with the pool flushed
//! across every call.
//!
//! Parallel-move words follow the single-cycle hardware model: all source
//! values (including accumulator reads through the limiter) are captured
//! before the data-ALU operation runs, and destination writes commit after
//! it.

use onyx_emit::{BlockAssembler, CallArg, ExecutableMemory, HostReg, abi};
use onyx_isa::{
    AluOp, AluSrc, Cond, DecodeError, DmacMode, Ea, ExtractCtrl, ImmAlu, MoveCOperand,
    MoveXyHalf, Op, ParallelMove, Reg, RepCount, ShiftKind, Space, decode,
};
use onyx_state::{Core, Registers, sr};
use rustc_hash::FxHashSet;
use std::mem::offset_of;

use crate::error::{Error, Result};
use crate::pool::{RegPool, inline_loc};
use crate::runtime::{self, AluCall, AluKind};

/// Upper bound on emulated instructions per compiled unit.
const MAX_BLOCK_INSTRS: usize = 64;

/// Runtime guard baked into a unit at compile time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// No guard: the unit cannot be invalidated behind our back.
    Direct,
    /// Re-check the compiled program words against memory on every call.
    CheckPMemWrite,
    /// Re-check the hardware-loop state on every call.
    CheckLoopEnd { la: u32 },
}

pub type BlockFn = unsafe extern "C" fn(*mut Core, *mut Registers);

/// One compiled unit.
pub struct CompiledBlock {
    // Held for its mapping; dropped with the block.
    _code: ExecutableMemory,
    entry: BlockFn,
    start: u32,
    words: Vec<u32>,
    run_mode: RunMode,
}

impl CompiledBlock {
    pub fn entry(&self) -> BlockFn {
        self.entry
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }
}

/// A value feeding a move or a helper argument.
#[derive(Clone, Copy)]
enum Val {
    Temp(HostReg),
    Imm(u32),
}

impl Val {
    fn arg(self) -> CallArg {
        match self {
            Self::Temp(r) => CallArg::Reg(r),
            Self::Imm(v) => CallArg::Imm(u64::from(v)),
        }
    }
}

/// Compile the unit starting at `start`.
pub fn compile(core: &Core, start: u32, volatile_p: &FxHashSet<u32>) -> Result<CompiledBlock> {
    let mut cg = CodeGen::new()?;
    cg.asm.prologue()?;

    let mem_words = core.mem.size() as u32;
    let loop_active = core.regs.sr & sr::LF != 0;
    let loop_la = core.regs.la;

    let mut pc = start;
    let mut words: Vec<u32> = Vec::new();
    let mut explicit_pc = false;
    let mut loop_end = false;

    for count in 0..MAX_BLOCK_INSTRS {
        if pc >= mem_words {
            if count == 0 {
                return Err(Error::OutOfProgramSpace { pc });
            }
            break;
        }
        let word = core.mem.read(Space::P, pc);
        let ext = (pc + 1 < mem_words).then(|| core.mem.read(Space::P, pc + 1));
        let instr = match decode(word, ext) {
            Ok(i) => i,
            // Extension word past the end of program memory: decode
            // boundary, close the block here.
            Err(DecodeError::MissingExtension { .. }) if ext.is_none() && count > 0 => break,
            Err(source) => return Err(Error::Decode { pc, source }),
        };

        let at_loop_end = loop_active && pc == loop_la;
        words.push(word);
        if instr.words == 2 {
            words.push(ext.expect("two-word instruction has its extension"));
        }
        let next_pc = pc + u32::from(instr.words);

        // `rep` wraps the following instruction in a host-side loop.
        let (ends, set_pc) = if let Op::Rep { count: rep_count } = instr.op {
            let inner_pc = next_pc;
            if inner_pc >= mem_words {
                return Err(Error::OutOfProgramSpace { pc: inner_pc });
            }
            let inner_word = core.mem.read(Space::P, inner_pc);
            let inner_ext = (inner_pc + 1 < mem_words).then(|| core.mem.read(Space::P, inner_pc + 1));
            let inner = decode(inner_word, inner_ext)
                .map_err(|source| Error::Decode { pc: inner_pc, source })?;
            words.push(inner_word);
            if inner.words == 2 {
                words.push(inner_ext.expect("two-word instruction has its extension"));
            }
            cg.emit_rep(rep_count, &inner.op, inner_pc)?;
            pc = inner_pc + u32::from(inner.words);
            (false, false)
        } else {
            let outcome = cg.emit_op(&instr.op, pc, next_pc)?;
            pc = next_pc;
            match outcome {
                Outcome::Continue => (false, false),
                Outcome::End => (true, true),
            }
        };
        cg.pool.unpin_all();

        if at_loop_end && !ends {
            cg.emit_loop_end()?;
            loop_end = true;
            break;
        }
        if ends {
            explicit_pc = set_pc;
            break;
        }
    }

    cg.pool.flush_and_reset(&mut cg.asm)?;
    if cg.flags_dirty {
        cg.raw_call(runtime::rt_materialize as usize, &[])?;
    }
    if !explicit_pc && !loop_end {
        cg.set_pc_imm(pc)?;
    }
    cg.asm.epilogue()?;

    let bytes = cg.asm.finish().map_err(Error::Emit)?;
    let code = ExecutableMemory::new(&bytes).map_err(Error::Emit)?;
    let entry: BlockFn = unsafe { std::mem::transmute(code.as_ptr()) };

    let run_mode = if loop_end {
        RunMode::CheckLoopEnd { la: loop_la }
    } else if (start..start + words.len() as u32).any(|a| volatile_p.contains(&a)) {
        RunMode::CheckPMemWrite
    } else {
        RunMode::Direct
    };

    Ok(CompiledBlock { _code: code, entry, start, words, run_mode })
}

enum Outcome {
    Continue,
    End,
}

struct CodeGen {
    asm: BlockAssembler,
    pool: RegPool,
    /// Compile-time mirror of the lazy-flag state machine: true when a
    /// pending recipe may exist at runtime.
    flags_dirty: bool,
}

impl CodeGen {
    fn new() -> Result<Self> {
        Ok(Self {
            asm: BlockAssembler::new().map_err(Error::Emit)?,
            pool: RegPool::new(),
            flags_dirty: false,
        })
    }

    // ===== Helper-call plumbing =====

    /// Flush the pool and call a runtime helper with the core pointer as
    /// first argument.
    fn call(&mut self, func: usize, args: &[CallArg], writes_regs: bool) -> Result<()> {
        self.pool.flush(&mut self.asm)?;
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(CallArg::Reg(abi::CTX));
        full.extend_from_slice(args);
        self.asm.call(func, &full)?;
        if writes_regs {
            self.pool.invalidate_dsp();
        }
        Ok(())
    }

    /// As [`Self::call`] for helpers that never touch the register file.
    fn raw_call(&mut self, func: usize, args: &[CallArg]) -> Result<()> {
        self.call(func, args, false)
    }

    /// Call a value-returning helper and park the result in a pool temp.
    fn call_ret(&mut self, func: usize, args: &[CallArg], writes_regs: bool) -> Result<HostReg> {
        self.call(func, args, writes_regs)?;
        let t = self.pool.temp(&mut self.asm)?;
        self.asm.take_ret(t)?;
        Ok(t)
    }

    fn set_pc_imm(&mut self, pc: u32) -> Result<()> {
        self.asm.mov_imm(abi::SCRATCH1, u64::from(pc))?;
        self.asm
            .store_field32(offset_of!(Registers, pc) as i32, abi::SCRATCH1)?;
        Ok(())
    }

    // ===== Register traffic =====

    /// Capture a register's move-path value into a pinned temporary.
    ///
    /// The copy (rather than handing out the binding itself) keeps the
    /// captured value alive across the ALU helper call, which drops all
    /// register-file bindings.
    fn read_reg(&mut self, reg: Reg) -> Result<HostReg> {
        if inline_loc(reg).is_some() {
            let h = self.pool.acquire(&mut self.asm, reg, true, false)?;
            let t = self.pool.temp(&mut self.asm)?;
            self.asm.mov(t, h)?;
            Ok(t)
        } else {
            self.call_ret(
                runtime::rt_reg_read as usize,
                &[CallArg::Imm(u64::from(runtime::reg_code(reg)))],
                true,
            )
        }
    }

    /// Commit a move-path write, consuming `val`.
    fn write_reg(&mut self, reg: Reg, val: Val) -> Result<()> {
        if inline_loc(reg).is_some() {
            let h = self.pool.acquire(&mut self.asm, reg, false, true)?;
            match val {
                Val::Temp(t) => self.asm.mov(h, t)?,
                Val::Imm(v) => self.asm.mov_imm(h, u64::from(v))?,
            }
        } else {
            self.call(
                runtime::rt_reg_write as usize,
                &[CallArg::Imm(u64::from(runtime::reg_code(reg))), val.arg()],
                true,
            )?;
        }
        self.free_val(val);
        Ok(())
    }

    fn free_val(&mut self, val: Val) {
        if let Val::Temp(t) = val {
            self.pool.free_temp(t);
        }
    }

    // ===== Effective addresses and memory =====

    /// Resolve an effective address to a value (performing any register
    /// post-modification).
    fn ea_addr(&mut self, ea: Ea) -> Result<Val> {
        match ea {
            Ea::Abs(a) => Ok(Val::Imm(a)),
            Ea::AbsShort(a) => Ok(Val::Imm(u32::from(a))),
            Ea::Imm(_) => unreachable!("immediate operand has no address"),
            Ea::Mode { mode, rrr } => {
                let t = self.call_ret(
                    runtime::rt_agu_update as usize,
                    &[
                        CallArg::Imm(u64::from(rrr)),
                        CallArg::Imm(u64::from(runtime::agu_mode_code(mode))),
                    ],
                    true,
                )?;
                Ok(Val::Temp(t))
            }
        }
    }

    /// Read one data word; consumes the address value.
    fn mem_read(&mut self, space: Space, addr: Val) -> Result<HostReg> {
        self.call(
            runtime::rt_mem_read as usize,
            &[CallArg::Imm(u64::from(runtime::space_code(space))), addr.arg()],
            false,
        )?;
        self.free_val(addr);
        let t = self.pool.temp(&mut self.asm)?;
        self.asm.take_ret(t)?;
        Ok(t)
    }

    /// Write one data word; consumes both values.
    fn mem_write(&mut self, space: Space, addr: Val, val: Val) -> Result<()> {
        self.call(
            runtime::rt_mem_write as usize,
            &[
                CallArg::Imm(u64::from(runtime::space_code(space))),
                addr.arg(),
                val.arg(),
            ],
            false,
        )?;
        self.free_val(addr);
        self.free_val(val);
        Ok(())
    }

    // ===== Data ALU =====

    fn alu_src_code(src: AluSrc, acc: u8) -> u32 {
        let reg = match src {
            AluSrc::OtherAcc => {
                if acc == 0 {
                    Reg::B
                } else {
                    Reg::A
                }
            }
            AluSrc::X => Reg::X,
            AluSrc::Y => Reg::Y,
            AluSrc::X0 => Reg::X0,
            AluSrc::Y0 => Reg::Y0,
            AluSrc::X1 => Reg::X1,
            AluSrc::Y1 => Reg::Y1,
        };
        runtime::reg_code(reg)
    }

    /// Emit one packed ALU helper call.
    fn emit_alu_call(&mut self, call: AluCall, imm: u32) -> Result<()> {
        let packed = call.pack();
        self.call(
            runtime::rt_alu as usize,
            &[CallArg::Imm(u64::from(packed)), CallArg::Imm(u64::from(imm))],
            true,
        )?;
        if call.update_ccr {
            self.flags_dirty = true;
        }
        Ok(())
    }

    fn emit_alu(&mut self, alu: AluOp, acc: u8, update_ccr: bool) -> Result<()> {
        let mut call = match alu {
            AluOp::None => return Ok(()),
            AluOp::Tfr(s) => AluCall { sel: Self::alu_src_code(s, acc), ..AluCall::new(AluKind::Tfr, acc) },
            AluOp::Add(s) => AluCall { sel: Self::alu_src_code(s, acc), ..AluCall::new(AluKind::Add, acc) },
            AluOp::Sub(s) => AluCall { sel: Self::alu_src_code(s, acc), ..AluCall::new(AluKind::Sub, acc) },
            AluOp::Cmp(s) => AluCall { sel: Self::alu_src_code(s, acc), ..AluCall::new(AluKind::Cmp, acc) },
            AluOp::Cmpm(s) => AluCall { sel: Self::alu_src_code(s, acc), ..AluCall::new(AluKind::Cmpm, acc) },
            AluOp::And(s) => AluCall { sel: Self::alu_src_code(s, acc), ..AluCall::new(AluKind::And, acc) },
            AluOp::Or(s) => AluCall { sel: Self::alu_src_code(s, acc), ..AluCall::new(AluKind::Or, acc) },
            AluOp::Eor(s) => AluCall { sel: Self::alu_src_code(s, acc), ..AluCall::new(AluKind::Eor, acc) },
            AluOp::Addr => AluCall {
                sel: Self::alu_src_code(AluSrc::OtherAcc, acc),
                ..AluCall::new(AluKind::Addr, acc)
            },
            AluOp::Addl => AluCall {
                sel: Self::alu_src_code(AluSrc::OtherAcc, acc),
                ..AluCall::new(AluKind::Addl, acc)
            },
            AluOp::Tst => AluCall::new(AluKind::Tst, acc),
            AluOp::Rnd => AluCall::new(AluKind::Rnd, acc),
            AluOp::Clr => AluCall::new(AluKind::Clr, acc),
            AluOp::Not => AluCall::new(AluKind::Not, acc),
            AluOp::Abs => AluCall::new(AluKind::Abs, acc),
            AluOp::Neg => AluCall::new(AluKind::Neg, acc),
            AluOp::Asl => AluCall::new(AluKind::Asl, acc),
            AluOp::Asr => AluCall::new(AluKind::Asr, acc),
            AluOp::Lsl => AluCall::new(AluKind::Lsl, acc),
            AluOp::Lsr => AluCall::new(AluKind::Lsr, acc),
            AluOp::Rol => AluCall::new(AluKind::Rol, acc),
            AluOp::Ror => AluCall::new(AluKind::Ror, acc),
            AluOp::Mul { pair, negate, accumulate, round } => AluCall {
                sel: runtime::reg_code(pair.0),
                sel2: runtime::reg_code(pair.1),
                negate,
                accumulate,
                round,
                ..AluCall::new(AluKind::Mul, acc)
            },
        };
        call.update_ccr = update_ccr;
        self.emit_alu_call(call, 0)
    }

    // ===== Parallel-move words =====

    fn emit_parallel(&mut self, alu: AluOp, acc: u8, mv: ParallelMove) -> Result<()> {
        match mv {
            ParallelMove::None => self.emit_alu(alu, acc, true),
            ParallelMove::Ifcc { cond, update_ccr } => self.emit_ifcc(alu, acc, cond, update_ccr),
            ParallelMove::UpdateEa { mode, rrr } => {
                self.ea_addr(Ea::Mode { mode, rrr })?;
                self.emit_alu(alu, acc, true)
            }
            ParallelMove::ImmShort { imm, dst } => {
                let value = imm_short_value(imm, dst);
                self.emit_alu(alu, acc, true)?;
                self.write_reg(dst, Val::Imm(value))
            }
            ParallelMove::RegToReg { src, dst } => {
                let t = self.read_reg(src)?;
                self.emit_alu(alu, acc, true)?;
                self.write_reg(dst, Val::Temp(t))
            }
            ParallelMove::Mem { space, ea, reg, to_reg } => {
                if let Ea::Imm(data) = ea {
                    self.emit_alu(alu, acc, true)?;
                    return self.write_reg(reg, Val::Imm(data));
                }
                if to_reg {
                    let addr = self.ea_addr(ea)?;
                    let t = self.mem_read(space, addr)?;
                    self.emit_alu(alu, acc, true)?;
                    self.write_reg(reg, Val::Temp(t))
                } else {
                    let v = self.read_reg(reg)?;
                    let addr = self.ea_addr(ea)?;
                    self.mem_write(space, addr, Val::Temp(v))?;
                    self.emit_alu(alu, acc, true)
                }
            }
            ParallelMove::Long { ea, reg, to_reg } => {
                if let Ea::Imm(_) = ea {
                    return Err(Error::Emit(onyx_emit::EmitError::Encode(
                        "long move with immediate operand".into(),
                    )));
                }
                let addr = self.ea_addr(ea)?;
                if to_reg {
                    self.emit_alu(alu, acc, true)?;
                    self.call(
                        runtime::rt_long_load as usize,
                        &[CallArg::Imm(u64::from(runtime::reg_code(reg))), addr.arg()],
                        true,
                    )
                } else {
                    self.call(
                        runtime::rt_long_store as usize,
                        &[CallArg::Imm(u64::from(runtime::reg_code(reg))), addr.arg()],
                        true,
                    )?;
                    self.emit_alu(alu, acc, true)
                }
            }
            ParallelMove::Xy { x, y } => {
                let mut commits: Vec<(Reg, HostReg)> = Vec::new();
                self.emit_xy_half(Space::X, x, &mut commits)?;
                self.emit_xy_half(Space::Y, y, &mut commits)?;
                self.emit_alu(alu, acc, true)?;
                for (reg, t) in commits {
                    self.write_reg(reg, Val::Temp(t))?;
                }
                Ok(())
            }
            ParallelMove::XWithY0 { ea, xreg, to_reg, src_acc } => {
                self.emit_combined(Space::X, ea, xreg, to_reg, src_acc, Reg::Y0, alu, acc)
            }
            ParallelMove::YWithX0 { ea, yreg, to_reg, src_acc } => {
                self.emit_combined(Space::Y, ea, yreg, to_reg, src_acc, Reg::X0, alu, acc)
            }
            ParallelMove::XStoreLoad { mode, rrr, acc: sacc } => {
                self.emit_store_load(Space::X, mode, rrr, sacc, Reg::X0, alu, acc)
            }
            ParallelMove::YStoreLoad { mode, rrr, acc: sacc } => {
                self.emit_store_load(Space::Y, mode, rrr, sacc, Reg::Y0, alu, acc)
            }
        }
    }

    fn emit_ifcc(&mut self, alu: AluOp, acc: u8, cond: Cond, update_ccr: bool) -> Result<()> {
        let skip = self.asm.new_label();
        self.pool.flush(&mut self.asm)?;
        self.call(
            runtime::rt_cond as usize,
            &[CallArg::Imm(u64::from(cond as u8))],
            true,
        )?;
        self.flags_dirty = false;
        self.asm.jump_if_zero(abi::RET, skip)?;
        self.emit_alu(alu, acc, update_ccr)?;
        self.asm.bind(skip)?;
        Ok(())
    }

    /// One half of a dual X:Y: move. Reads land in `commits` for the
    /// post-ALU phase; writes go straight to memory.
    fn emit_xy_half(
        &mut self,
        space: Space,
        half: MoveXyHalf,
        commits: &mut Vec<(Reg, HostReg)>,
    ) -> Result<()> {
        let ea = Ea::Mode { mode: half.mode, rrr: half.rrr };
        if half.to_reg {
            let addr = self.ea_addr(ea)?;
            let t = self.mem_read(space, addr)?;
            commits.push((half.reg, t));
        } else {
            let v = self.read_reg(half.reg)?;
            let addr = self.ea_addr(ea)?;
            self.mem_write(space, addr, Val::Temp(v))?;
        }
        Ok(())
    }

    /// `x:ea,D  S,y0` and friends.
    #[allow(clippy::too_many_arguments)]
    fn emit_combined(
        &mut self,
        space: Space,
        ea: Ea,
        mreg: Reg,
        to_reg: bool,
        src_acc: u8,
        side_dst: Reg,
        alu: AluOp,
        acc: u8,
    ) -> Result<()> {
        // the accumulator-to-input half always reads pre-ALU state
        let side = self.read_reg(if src_acc == 0 { Reg::A } else { Reg::B })?;
        let mem_val = if let Ea::Imm(data) = ea {
            Val::Imm(data)
        } else if to_reg {
            let addr = self.ea_addr(ea)?;
            Val::Temp(self.mem_read(space, addr)?)
        } else {
            let v = self.read_reg(mreg)?;
            let addr = self.ea_addr(ea)?;
            self.mem_write(space, addr, Val::Temp(v))?;
            Val::Imm(0)
        };
        self.emit_alu(alu, acc, true)?;
        if to_reg {
            self.write_reg(mreg, mem_val)?;
        }
        self.write_reg(side_dst, Val::Temp(side))
    }

    /// `S,x:ea  x0,S` one-word form.
    #[allow(clippy::too_many_arguments)]
    fn emit_store_load(
        &mut self,
        space: Space,
        mode: onyx_isa::AguMode,
        rrr: u8,
        sacc: u8,
        input: Reg,
        alu: AluOp,
        acc: u8,
    ) -> Result<()> {
        let acc_reg = if sacc == 0 { Reg::A } else { Reg::B };
        let stored = self.read_reg(acc_reg)?;
        let loaded = self.read_reg(input)?;
        let addr = self.ea_addr(Ea::Mode { mode, rrr })?;
        self.mem_write(space, addr, Val::Temp(stored))?;
        self.emit_alu(alu, acc, true)?;
        self.write_reg(acc_reg, Val::Temp(loaded))
    }

    // ===== Top-level operations =====

    fn emit_op(&mut self, op: &Op, pc: u32, next_pc: u32) -> Result<Outcome> {
        match *op {
            Op::Nop => Ok(Outcome::Continue),
            Op::Parallel { alu, acc, mv } => {
                self.emit_parallel(alu, acc, mv)?;
                Ok(Outcome::Continue)
            }
            Op::Inc { acc } => {
                self.emit_alu_call(AluCall::new(AluKind::Inc, acc), 0)?;
                Ok(Outcome::Continue)
            }
            Op::Dec { acc } => {
                self.emit_alu_call(AluCall::new(AluKind::Dec, acc), 0)?;
                Ok(Outcome::Continue)
            }
            Op::AluImm { op, imm, acc } => {
                let kind = match op {
                    ImmAlu::Add => AluKind::AddImm,
                    ImmAlu::Sub => AluKind::SubImm,
                    ImmAlu::Cmp => AluKind::CmpImm,
                    ImmAlu::And => AluKind::AndImm,
                    ImmAlu::Or => AluKind::OrImm,
                    ImmAlu::Eor => AluKind::EorImm,
                };
                self.emit_alu_call(AluCall::new(kind, acc), imm)?;
                Ok(Outcome::Continue)
            }
            Op::MulImm { src, shift, acc, negate, accumulate } => {
                let call = AluCall {
                    sel: runtime::reg_code(src),
                    negate,
                    accumulate,
                    count: shift,
                    ..AluCall::new(AluKind::MulImm, acc)
                };
                self.emit_alu_call(call, 0)?;
                Ok(Outcome::Continue)
            }
            Op::Dmac { mode, pair, acc, negate } => {
                let count = match mode {
                    DmacMode::SignedSigned => 0,
                    DmacMode::SignedUnsigned => 1,
                    DmacMode::UnsignedUnsigned => 2,
                };
                let call = AluCall {
                    sel: runtime::reg_code(pair.0),
                    sel2: runtime::reg_code(pair.1),
                    negate,
                    count,
                    ..AluCall::new(AluKind::Dmac, acc)
                };
                self.emit_alu_call(call, 0)?;
                Ok(Outcome::Continue)
            }
            Op::Div { src, acc } => {
                let call =
                    AluCall { sel: runtime::reg_code(src), ..AluCall::new(AluKind::Div, acc) };
                self.emit_alu_call(call, 0)?;
                self.flags_dirty = false;
                Ok(Outcome::Continue)
            }
            Op::ExtractU { ctrl, src_acc, acc } => {
                let (call, imm) = match ctrl {
                    ExtractCtrl::Reg(r) => (
                        AluCall {
                            sel: runtime::reg_code(r),
                            sel2: u32::from(src_acc),
                            ..AluCall::new(AluKind::Extract, acc)
                        },
                        0,
                    ),
                    ExtractCtrl::Imm(v) => (
                        AluCall {
                            sel2: u32::from(src_acc),
                            round: true,
                            ..AluCall::new(AluKind::Extract, acc)
                        },
                        v,
                    ),
                };
                self.emit_alu_call(call, imm)?;
                Ok(Outcome::Continue)
            }
            Op::ShiftImm { kind, bits, acc } => {
                let k = match kind {
                    ShiftKind::Asl => AluKind::AslN,
                    ShiftKind::Asr => AluKind::AsrN,
                    ShiftKind::Lsl => AluKind::LslN,
                    ShiftKind::Lsr => AluKind::LsrN,
                };
                let call = AluCall {
                    sel2: u32::from(acc),
                    count: bits,
                    ..AluCall::new(k, acc)
                };
                self.emit_alu_call(call, 0)?;
                Ok(Outcome::Continue)
            }
            Op::ShiftReg { kind, ctrl, src_acc, acc } => {
                let k = match kind {
                    ShiftKind::Asl => AluKind::AslN,
                    ShiftKind::Asr => AluKind::AsrN,
                    ShiftKind::Lsl => AluKind::LslN,
                    ShiftKind::Lsr => AluKind::LsrN,
                };
                let call = AluCall {
                    sel: runtime::reg_code(ctrl),
                    sel2: u32::from(src_acc),
                    accumulate: true,
                    ..AluCall::new(k, acc)
                };
                self.emit_alu_call(call, 0)?;
                Ok(Outcome::Continue)
            }
            Op::Andi { imm, target } => {
                self.emit_status(imm, target, false)?;
                Ok(Outcome::Continue)
            }
            Op::Ori { imm, target } => {
                self.emit_status(imm, target, true)?;
                Ok(Outcome::Continue)
            }
            Op::BitMem { op, bit, space, ea } => {
                let packed = runtime::bit_op_code(op)
                    | u32::from(bit) << 2
                    | runtime::space_code(space) << 7;
                let addr = self.ea_addr(ea)?;
                self.call(
                    runtime::rt_bit_mem as usize,
                    &[CallArg::Imm(u64::from(packed)), addr.arg()],
                    true,
                )?;
                self.flags_dirty = false;
                Ok(Outcome::Continue)
            }
            Op::BitReg { op, bit, reg } => {
                let packed = runtime::bit_op_code(op)
                    | u32::from(bit) << 2
                    | runtime::reg_code(reg) << 7;
                self.call(
                    runtime::rt_bit_reg as usize,
                    &[CallArg::Imm(u64::from(packed))],
                    true,
                )?;
                self.flags_dirty = false;
                Ok(Outcome::Continue)
            }
            Op::Lua { mode, rrr, dst } => {
                let t = self.call_ret(
                    runtime::rt_agu_peek as usize,
                    &[
                        CallArg::Imm(u64::from(rrr)),
                        CallArg::Imm(u64::from(runtime::agu_mode_code(mode))),
                    ],
                    false,
                )?;
                self.write_reg(dst, Val::Temp(t))?;
                Ok(Outcome::Continue)
            }
            Op::LuaRel { rrr, disp, dst } => {
                let disp24 = (i32::from(disp) as u32) & 0xFF_FFFF;
                let t = self.call_ret(
                    runtime::rt_agu_indexed as usize,
                    &[CallArg::Imm(u64::from(rrr)), CallArg::Imm(u64::from(disp24))],
                    false,
                )?;
                self.write_reg(dst, Val::Temp(t))?;
                Ok(Outcome::Continue)
            }
            Op::Lra { disp, dst } => {
                let value = pc.wrapping_add(disp) & 0xFF_FFFF;
                self.write_reg(dst, Val::Imm(value))?;
                Ok(Outcome::Continue)
            }
            Op::MoveC { ctrl, operand, to_ctrl } => {
                self.emit_movec(ctrl, operand, to_ctrl)?;
                Ok(Outcome::Continue)
            }
            Op::MoveP { ea, reg, to_reg } => {
                if to_reg {
                    let addr = self.ea_addr(ea)?;
                    let t = self.mem_read(Space::P, addr)?;
                    self.write_reg(reg, Val::Temp(t))?;
                } else {
                    let v = self.read_reg(reg)?;
                    let addr = self.ea_addr(ea)?;
                    self.mem_write(Space::P, addr, Val::Temp(v))?;
                }
                Ok(Outcome::Continue)
            }
            Op::MoveDisp { space, rrr, disp, reg, to_reg } => {
                let addr = self.call_ret(
                    runtime::rt_agu_indexed as usize,
                    &[CallArg::Imm(u64::from(rrr)), CallArg::Imm(u64::from(disp))],
                    false,
                )?;
                if to_reg {
                    let t = self.mem_read(space, Val::Temp(addr))?;
                    self.write_reg(reg, Val::Temp(t))?;
                } else {
                    let v = self.read_reg(reg)?;
                    self.mem_write(space, Val::Temp(addr), Val::Temp(v))?;
                }
                Ok(Outcome::Continue)
            }
            Op::MovePeriph { space, addr, ea, ea_space, to_periph } => {
                if to_periph {
                    let v = match ea {
                        Ea::Imm(data) => Val::Imm(data),
                        ea => {
                            let a = self.ea_addr(ea)?;
                            Val::Temp(self.mem_read(ea_space, a)?)
                        }
                    };
                    self.mem_write(space, Val::Imm(addr), v)?;
                } else {
                    let v = self.mem_read(space, Val::Imm(addr))?;
                    let a = self.ea_addr(ea)?;
                    self.mem_write(ea_space, a, Val::Temp(v))?;
                }
                Ok(Outcome::Continue)
            }
            Op::MovePeriphReg { space, addr, reg, to_periph } => {
                if to_periph {
                    let v = self.read_reg(reg)?;
                    self.mem_write(space, Val::Imm(addr), Val::Temp(v))?;
                } else {
                    let t = self.mem_read(space, Val::Imm(addr))?;
                    self.write_reg(reg, Val::Temp(t))?;
                }
                Ok(Outcome::Continue)
            }
            Op::Do { count, last_addr } => {
                let count_arg = self.rep_count_val(count)?;
                self.call(
                    runtime::rt_do_begin as usize,
                    &[
                        count_arg.arg(),
                        CallArg::Imm(u64::from(last_addr)),
                        CallArg::Imm(u64::from(next_pc)),
                    ],
                    true,
                )?;
                self.flags_dirty = false;
                self.set_pc_imm(next_pc)?;
                Ok(Outcome::End)
            }
            Op::Enddo => {
                self.call(runtime::rt_enddo as usize, &[], true)?;
                self.set_pc_imm(next_pc)?;
                Ok(Outcome::End)
            }
            Op::Jmp { target } => {
                self.set_pc_imm(target)?;
                Ok(Outcome::End)
            }
            Op::Jsr { target } => {
                self.call(
                    runtime::rt_jsr as usize,
                    &[CallArg::Imm(u64::from(target)), CallArg::Imm(u64::from(next_pc))],
                    true,
                )?;
                self.flags_dirty = false;
                Ok(Outcome::End)
            }
            Op::Rts => {
                self.call(runtime::rt_rts as usize, &[], true)?;
                Ok(Outcome::End)
            }
            Op::Jcc { cond, target } => {
                self.call(
                    runtime::rt_cond as usize,
                    &[CallArg::Imm(u64::from(cond as u8))],
                    true,
                )?;
                self.flags_dirty = false;
                let not_taken = self.asm.new_label();
                let done = self.asm.new_label();
                self.asm.jump_if_zero(abi::RET, not_taken)?;
                self.set_pc_imm(target)?;
                self.asm.jump(done)?;
                self.asm.bind(not_taken)?;
                self.set_pc_imm(next_pc)?;
                self.asm.bind(done)?;
                Ok(Outcome::End)
            }
            Op::Rep { .. } => unreachable!("rep handled by the block loop"),
        }
    }

    fn emit_status(&mut self, imm: u8, target: onyx_isa::StatusField, is_or: bool) -> Result<()> {
        let sel = match target {
            onyx_isa::StatusField::Mr => 0,
            onyx_isa::StatusField::Ccr => 1,
            onyx_isa::StatusField::Omr => 2,
            onyx_isa::StatusField::Eom => 3,
        };
        let packed = sel | u32::from(is_or) << 2;
        self.call(
            runtime::rt_status_mask as usize,
            &[CallArg::Imm(u64::from(imm)), CallArg::Imm(u64::from(packed))],
            true,
        )?;
        if sel == 1 {
            self.flags_dirty = false;
        }
        Ok(())
    }

    fn emit_movec(&mut self, ctrl: Reg, operand: MoveCOperand, to_ctrl: bool) -> Result<()> {
        match operand {
            MoveCOperand::ImmShort(v) => self.write_reg(ctrl, Val::Imm(u32::from(v))),
            MoveCOperand::ImmLong(v) => self.write_reg(ctrl, Val::Imm(v)),
            MoveCOperand::Reg(r) => {
                if to_ctrl {
                    let t = self.read_reg(r)?;
                    self.write_reg(ctrl, Val::Temp(t))
                } else {
                    let t = self.read_reg(ctrl)?;
                    self.write_reg(r, Val::Temp(t))
                }
            }
            MoveCOperand::Mem { space, ea } => {
                if let Ea::Imm(data) = ea {
                    return self.write_reg(ctrl, Val::Imm(data));
                }
                if to_ctrl {
                    let addr = self.ea_addr(ea)?;
                    let t = self.mem_read(space, addr)?;
                    self.write_reg(ctrl, Val::Temp(t))
                } else {
                    let v = self.read_reg(ctrl)?;
                    let addr = self.ea_addr(ea)?;
                    self.mem_write(space, addr, Val::Temp(v))
                }
            }
        }
    }

    fn rep_count_val(&mut self, count: RepCount) -> Result<Val> {
        match count {
            RepCount::Imm(v) => Ok(Val::Imm(u32::from(v))),
            RepCount::Reg(r) => Ok(Val::Temp(self.read_reg(r)?)),
        }
    }

    /// `rep`: latch the count, then run the following instruction in a host
    /// loop.
    fn emit_rep(&mut self, count: RepCount, inner: &Op, inner_pc: u32) -> Result<()> {
        if matches!(
            inner,
            Op::Jmp { .. }
                | Op::Jsr { .. }
                | Op::Jcc { .. }
                | Op::Rts
                | Op::Do { .. }
                | Op::Rep { .. }
                | Op::Enddo
        ) {
            return Err(Error::Emit(onyx_emit::EmitError::Encode(
                "rep target cannot be a control transfer".into(),
            )));
        }
        let count_arg = self.rep_count_val(count)?;
        self.call(
            runtime::rt_rep_begin as usize,
            &[count_arg.arg()],
            true,
        )?;
        self.pool.unpin_all();

        let done = self.asm.new_label();
        let top = self.asm.new_label();
        self.asm.jump_if_zero(abi::RET, done)?;
        self.asm.bind(top)?;
        self.emit_op(inner, inner_pc, inner_pc + 1)?;
        self.pool.unpin_all();
        self.pool.flush_and_reset(&mut self.asm)?;
        self.call(runtime::rt_rep_step as usize, &[], true)?;
        self.asm.jump_if_not_zero(abi::RET, top)?;
        self.asm.bind(done)?;
        Ok(())
    }

    fn emit_loop_end(&mut self) -> Result<()> {
        self.call(runtime::rt_loop_end as usize, &[], true)?;
        Ok(())
    }
}

/// Short immediates are left-aligned into data registers, raw for address
/// registers.
fn imm_short_value(imm: u8, dst: Reg) -> u32 {
    match dst {
        Reg::R(_) | Reg::N(_) | Reg::M(_) => u32::from(imm),
        _ => u32::from(imm) << 16,
    }
}
