//! Runtime helpers called from compiled code.
//!
//! Every helper takes the core pointer that compiled blocks keep pinned in a
//! host register. Register identities and operation selectors cross the call
//! boundary as small integer codes packed by the block compiler.

use onyx_isa::{AguMode, BitOp, Cond, Reg, Space};
use onyx_state::{Core, Memory, sr};

use crate::alu::{self, FlagUpdate, MASK24, MASK48, MASK56};
use crate::{agu, ccr};

// ===== Register codes =====

/// Stable numeric code for a register operand.
pub(crate) fn reg_code(reg: Reg) -> u32 {
    match reg {
        Reg::X0 => 0,
        Reg::X1 => 1,
        Reg::Y0 => 2,
        Reg::Y1 => 3,
        Reg::A0 => 4,
        Reg::B0 => 5,
        Reg::A2 => 6,
        Reg::B2 => 7,
        Reg::A1 => 8,
        Reg::B1 => 9,
        Reg::A => 10,
        Reg::B => 11,
        Reg::X => 12,
        Reg::Y => 13,
        Reg::A10 => 14,
        Reg::B10 => 15,
        Reg::Ab => 16,
        Reg::Ba => 17,
        Reg::R(i) => 18 + u32::from(i),
        Reg::N(i) => 26 + u32::from(i),
        Reg::M(i) => 34 + u32::from(i),
        Reg::Sr => 42,
        Reg::Omr => 43,
        Reg::Sp => 44,
        Reg::Ssh => 45,
        Reg::Ssl => 46,
        Reg::La => 47,
        Reg::Lc => 48,
        Reg::Ep => 49,
        Reg::Vba => 50,
        Reg::Sc => 51,
        Reg::Sz => 52,
    }
}

fn reg_from_code(code: u32) -> Reg {
    match code {
        0 => Reg::X0,
        1 => Reg::X1,
        2 => Reg::Y0,
        3 => Reg::Y1,
        4 => Reg::A0,
        5 => Reg::B0,
        6 => Reg::A2,
        7 => Reg::B2,
        8 => Reg::A1,
        9 => Reg::B1,
        10 => Reg::A,
        11 => Reg::B,
        12 => Reg::X,
        13 => Reg::Y,
        14 => Reg::A10,
        15 => Reg::B10,
        16 => Reg::Ab,
        17 => Reg::Ba,
        18..=25 => Reg::R((code - 18) as u8),
        26..=33 => Reg::N((code - 26) as u8),
        34..=41 => Reg::M((code - 34) as u8),
        42 => Reg::Sr,
        43 => Reg::Omr,
        44 => Reg::Sp,
        45 => Reg::Ssh,
        46 => Reg::Ssl,
        47 => Reg::La,
        48 => Reg::Lc,
        49 => Reg::Ep,
        50 => Reg::Vba,
        51 => Reg::Sc,
        52 => Reg::Sz,
        _ => unreachable!("bad register code {code}"),
    }
}

pub(crate) fn space_code(space: Space) -> u32 {
    match space {
        Space::X => 0,
        Space::Y => 1,
        Space::P => 2,
    }
}

fn space_from_code(code: u32) -> Space {
    match code {
        0 => Space::X,
        1 => Space::Y,
        _ => Space::P,
    }
}

pub(crate) fn agu_mode_code(mode: AguMode) -> u32 {
    match mode {
        AguMode::PostDecrN => 0,
        AguMode::PostIncrN => 1,
        AguMode::PostDecr => 2,
        AguMode::PostIncr => 3,
        AguMode::NoUpdate => 4,
        AguMode::IndexNoUpdate => 5,
        AguMode::PreDecr => 6,
    }
}

fn agu_mode_from_code(code: u32) -> AguMode {
    match code {
        0 => AguMode::PostDecrN,
        1 => AguMode::PostIncrN,
        2 => AguMode::PostDecr,
        3 => AguMode::PostIncr,
        4 => AguMode::NoUpdate,
        5 => AguMode::IndexNoUpdate,
        _ => AguMode::PreDecr,
    }
}

// ===== Move-path register access (24-bit, limited) =====

/// Read a register through the move path: accumulators saturate and note
/// S/L, SR materializes first, SSH pops.
pub(crate) fn reg_read24(core: &mut Core, reg: Reg) -> u32 {
    let regs = &mut core.regs;
    match reg {
        Reg::X0 => (regs.x & MASK24) as u32,
        Reg::X1 => ((regs.x >> 24) & MASK24) as u32,
        Reg::Y0 => (regs.y & MASK24) as u32,
        Reg::Y1 => ((regs.y >> 24) & MASK24) as u32,
        Reg::A0 => (regs.a & MASK24) as u32,
        Reg::B0 => (regs.b & MASK24) as u32,
        Reg::A1 => ((regs.a >> 24) & MASK24) as u32,
        Reg::B1 => ((regs.b >> 24) & MASK24) as u32,
        Reg::A2 => (alu::sext24(((regs.a >> 48) & 0xFF) as u32) & MASK24) as u32,
        Reg::B2 => (alu::sext24(((regs.b >> 48) & 0xFF) as u32) & MASK24) as u32,
        Reg::A | Reg::B => {
            let acc = if reg == Reg::A { regs.a } else { regs.b };
            let (word, limited) = alu::saturate24(acc);
            ccr::note_limiting(regs, acc, limited);
            word
        }
        Reg::R(i) => regs.r[i as usize],
        Reg::N(i) => regs.n[i as usize],
        Reg::M(i) => regs.m[i as usize],
        Reg::Sr => {
            ccr::materialize(regs);
            regs.sr & MASK24 as u32
        }
        Reg::Omr => regs.omr,
        Reg::Sp => regs.sp,
        Reg::Ssh => {
            let v = regs.ssh_top();
            regs.sp = regs.sp.wrapping_sub(1) & MASK24 as u32;
            v
        }
        Reg::Ssl => regs.ssl_top(),
        Reg::La => regs.la,
        Reg::Lc => regs.lc,
        Reg::Ep => regs.ep,
        Reg::Vba => regs.vba,
        Reg::Sc => regs.sc,
        Reg::Sz => regs.sz,
        Reg::X | Reg::Y | Reg::A10 | Reg::B10 | Reg::Ab | Reg::Ba => {
            unreachable!("48-bit registers use the long move path")
        }
    }
}

/// Write a register through the move path: a 24-bit value into a full
/// accumulator sign-extends into the high word.
pub(crate) fn reg_write24(core: &mut Core, reg: Reg, value: u32) {
    let value = value & MASK24 as u32;
    let regs = &mut core.regs;
    match reg {
        Reg::X0 => regs.x = (regs.x & !MASK24) | u64::from(value),
        Reg::X1 => regs.x = (regs.x & !(MASK24 << 24)) | u64::from(value) << 24,
        Reg::Y0 => regs.y = (regs.y & !MASK24) | u64::from(value),
        Reg::Y1 => regs.y = (regs.y & !(MASK24 << 24)) | u64::from(value) << 24,
        Reg::A0 => regs.a = (regs.a & !MASK24) | u64::from(value),
        Reg::B0 => regs.b = (regs.b & !MASK24) | u64::from(value),
        Reg::A1 => regs.a = (regs.a & !(MASK24 << 24)) | u64::from(value) << 24,
        Reg::B1 => regs.b = (regs.b & !(MASK24 << 24)) | u64::from(value) << 24,
        Reg::A2 => regs.a = (regs.a & MASK48) | u64::from(value & 0xFF) << 48,
        Reg::B2 => regs.b = (regs.b & MASK48) | u64::from(value & 0xFF) << 48,
        Reg::A => regs.a = (alu::sext24(value) << 24) & MASK56,
        Reg::B => regs.b = (alu::sext24(value) << 24) & MASK56,
        Reg::R(i) => regs.r[i as usize] = value,
        Reg::N(i) => regs.n[i as usize] = value,
        Reg::M(i) => regs.m[i as usize] = value,
        Reg::Sr => {
            regs.ccr_dirty = 0;
            regs.sr = value;
        }
        Reg::Omr => regs.omr = value,
        Reg::Sp => regs.sp = value,
        Reg::Ssh => {
            regs.sp = regs.sp.wrapping_add(1) & MASK24 as u32;
            *regs.ssh_top_mut() = value;
        }
        Reg::Ssl => *regs.ssl_top_mut() = value,
        Reg::La => regs.la = value,
        Reg::Lc => regs.lc = value,
        Reg::Ep => regs.ep = value,
        Reg::Vba => regs.vba = value,
        Reg::Sc => regs.sc = value,
        Reg::Sz => regs.sz = value,
        Reg::X | Reg::Y | Reg::A10 | Reg::B10 | Reg::Ab | Reg::Ba => {
            unreachable!("48-bit registers use the long move path")
        }
    }
}

// ===== Helper entry points =====

unsafe fn core_mut<'a>(core: *mut Core) -> &'a mut Core {
    unsafe { &mut *core }
}

pub extern "C" fn rt_mem_read(core: *mut Core, space: u32, addr: u32) -> u32 {
    let core = unsafe { core_mut(core) };
    core.read(space_from_code(space), addr & MASK24 as u32)
}

pub extern "C" fn rt_mem_write(core: *mut Core, space: u32, addr: u32, value: u32) {
    let core = unsafe { core_mut(core) };
    core.write(space_from_code(space), addr & MASK24 as u32, value);
}

/// Compute an effective address and post-modify the offset register.
pub extern "C" fn rt_agu_update(core: *mut Core, rrr: u32, mode: u32) -> u32 {
    let core = unsafe { core_mut(core) };
    let i = (rrr & 7) as usize;
    let (ea, new_r) = agu::update(
        core.regs.r[i],
        core.regs.n[i],
        core.regs.m[i],
        agu_mode_from_code(mode),
    );
    core.regs.r[i] = new_r;
    ea
}

/// Post-modified offset value without write-back (`lua`).
pub extern "C" fn rt_agu_peek(core: *mut Core, rrr: u32, mode: u32) -> u32 {
    let core = unsafe { core_mut(core) };
    let i = (rrr & 7) as usize;
    agu::update(
        core.regs.r[i],
        core.regs.n[i],
        core.regs.m[i],
        agu_mode_from_code(mode),
    )
    .1
}

/// `(Rn + displacement)` without write-back.
pub extern "C" fn rt_agu_indexed(core: *mut Core, rrr: u32, disp: u32) -> u32 {
    let core = unsafe { core_mut(core) };
    let i = (rrr & 7) as usize;
    agu::indexed(core.regs.r[i], disp, core.regs.m[i])
}

pub extern "C" fn rt_reg_read(core: *mut Core, code: u32) -> u32 {
    let core = unsafe { core_mut(core) };
    reg_read24(core, reg_from_code(code))
}

pub extern "C" fn rt_reg_write(core: *mut Core, code: u32, value: u32) {
    let core = unsafe { core_mut(core) };
    reg_write24(core, reg_from_code(code), value);
}

/// Load one of the 48-bit views from `x:addr` / `y:addr`.
pub extern "C" fn rt_long_load(core: *mut Core, code: u32, addr: u32) {
    let core = unsafe { core_mut(core) };
    let hi = core.read(Space::X, addr);
    let lo = core.read(Space::Y, addr);
    let regs = &mut core.regs;
    match reg_from_code(code) {
        Reg::X => regs.x = u64::from(hi) << 24 | u64::from(lo),
        Reg::Y => regs.y = u64::from(hi) << 24 | u64::from(lo),
        Reg::A => regs.a = alu::sext48(u64::from(hi) << 24 | u64::from(lo)) & MASK56,
        Reg::B => regs.b = alu::sext48(u64::from(hi) << 24 | u64::from(lo)) & MASK56,
        Reg::A10 => regs.a = (regs.a & !MASK48) | u64::from(hi) << 24 | u64::from(lo),
        Reg::B10 => regs.b = (regs.b & !MASK48) | u64::from(hi) << 24 | u64::from(lo),
        Reg::Ab => {
            regs.a = (alu::sext24(hi) << 24) & MASK56;
            regs.b = (alu::sext24(lo) << 24) & MASK56;
        }
        Reg::Ba => {
            regs.b = (alu::sext24(hi) << 24) & MASK56;
            regs.a = (alu::sext24(lo) << 24) & MASK56;
        }
        other => unreachable!("not a long register: {other:?}"),
    }
}

/// Store one of the 48-bit views to `x:addr` / `y:addr`.
pub extern "C" fn rt_long_store(core: *mut Core, code: u32, addr: u32) {
    let core = unsafe { core_mut(core) };
    let (hi, lo) = {
        let regs = &mut core.regs;
        match reg_from_code(code) {
            Reg::X => (((regs.x >> 24) & MASK24) as u32, (regs.x & MASK24) as u32),
            Reg::Y => (((regs.y >> 24) & MASK24) as u32, (regs.y & MASK24) as u32),
            Reg::A | Reg::B => {
                let acc = if reg_from_code(code) == Reg::A { regs.a } else { regs.b };
                let (v48, limited) = alu::saturate48(acc);
                ccr::note_limiting(regs, acc, limited);
                (((v48 >> 24) & MASK24) as u32, (v48 & MASK24) as u32)
            }
            Reg::A10 => (((regs.a >> 24) & MASK24) as u32, (regs.a & MASK24) as u32),
            Reg::B10 => (((regs.b >> 24) & MASK24) as u32, (regs.b & MASK24) as u32),
            Reg::Ab => {
                let (a, la) = alu::saturate24(regs.a);
                let (b, lb) = alu::saturate24(regs.b);
                ccr::note_limiting(regs, regs.a, la);
                ccr::note_limiting(regs, regs.b, lb);
                (a, b)
            }
            Reg::Ba => {
                let (a, la) = alu::saturate24(regs.a);
                let (b, lb) = alu::saturate24(regs.b);
                ccr::note_limiting(regs, regs.a, la);
                ccr::note_limiting(regs, regs.b, lb);
                (b, a)
            }
            other => unreachable!("not a long register: {other:?}"),
        }
    };
    core.write(Space::X, addr, hi);
    core.write(Space::Y, addr, lo);
}

pub extern "C" fn rt_materialize(core: *mut Core) {
    let core = unsafe { core_mut(core) };
    ccr::materialize(&mut core.regs);
}

/// Materialize flags and evaluate a condition selector; returns 0 or 1.
pub extern "C" fn rt_cond(core: *mut Core, cccc: u32) -> u32 {
    let core = unsafe { core_mut(core) };
    u32::from(ccr::test_cond(&mut core.regs, Cond::from_cccc(cccc as u8)))
}

// ===== Packed ALU dispatch =====

/// ALU operation selectors for the packed helper call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum AluKind {
    Tfr = 0,
    Addr,
    Addl,
    Tst,
    Add,
    Sub,
    Cmp,
    Cmpm,
    And,
    Or,
    Eor,
    Rnd,
    Clr,
    Not,
    Abs,
    Neg,
    Asl,
    Asr,
    Lsl,
    Lsr,
    Rol,
    Ror,
    Mul,
    MulImm,
    Dmac,
    Div,
    Extract,
    AslN,
    AsrN,
    LslN,
    LsrN,
    Inc,
    Dec,
    AddImm,
    SubImm,
    CmpImm,
    AndImm,
    OrImm,
    EorImm,
}

/// Packed ALU call descriptor.
///
/// Layout: kind[7:0], sel[13:8], sel2[19:14], acc[20], negate[21],
/// accumulate[22], round[23], update_ccr[24], count[30:25].
#[derive(Clone, Copy)]
pub(crate) struct AluCall {
    pub kind: AluKind,
    pub sel: u32,
    pub sel2: u32,
    pub acc: u8,
    pub negate: bool,
    pub accumulate: bool,
    pub round: bool,
    pub update_ccr: bool,
    pub count: u8,
}

impl AluCall {
    pub(crate) fn new(kind: AluKind, acc: u8) -> Self {
        Self {
            kind,
            sel: 0,
            sel2: 0,
            acc,
            negate: false,
            accumulate: false,
            round: false,
            update_ccr: true,
            count: 0,
        }
    }

    pub(crate) fn pack(self) -> u32 {
        self.kind as u32
            | self.sel << 8
            | self.sel2 << 14
            | u32::from(self.acc) << 20
            | u32::from(self.negate) << 21
            | u32::from(self.accumulate) << 22
            | u32::from(self.round) << 23
            | u32::from(self.update_ccr) << 24
            | u32::from(self.count) << 25
    }

    fn unpack(packed: u32) -> Self {
        // Discriminants are dense, so the transmute-free match below keeps
        // this safe at the cost of a table.
        const KINDS: [AluKind; 39] = [
            AluKind::Tfr,
            AluKind::Addr,
            AluKind::Addl,
            AluKind::Tst,
            AluKind::Add,
            AluKind::Sub,
            AluKind::Cmp,
            AluKind::Cmpm,
            AluKind::And,
            AluKind::Or,
            AluKind::Eor,
            AluKind::Rnd,
            AluKind::Clr,
            AluKind::Not,
            AluKind::Abs,
            AluKind::Neg,
            AluKind::Asl,
            AluKind::Asr,
            AluKind::Lsl,
            AluKind::Lsr,
            AluKind::Rol,
            AluKind::Ror,
            AluKind::Mul,
            AluKind::MulImm,
            AluKind::Dmac,
            AluKind::Div,
            AluKind::Extract,
            AluKind::AslN,
            AluKind::AsrN,
            AluKind::LslN,
            AluKind::LsrN,
            AluKind::Inc,
            AluKind::Dec,
            AluKind::AddImm,
            AluKind::SubImm,
            AluKind::CmpImm,
            AluKind::AndImm,
            AluKind::OrImm,
            AluKind::EorImm,
        ];
        Self {
            kind: KINDS[(packed & 0xFF) as usize],
            sel: (packed >> 8) & 0x3F,
            sel2: (packed >> 14) & 0x3F,
            acc: ((packed >> 20) & 1) as u8,
            negate: packed & (1 << 21) != 0,
            accumulate: packed & (1 << 22) != 0,
            round: packed & (1 << 23) != 0,
            update_ccr: packed & (1 << 24) != 0,
            count: ((packed >> 25) & 0x3F) as u8,
        }
    }
}

/// 56-bit ALU operand for a JJJ-style source selector, aligned for full
/// width arithmetic.
fn arith_operand(core: &Core, sel: u32, acc: u8) -> u64 {
    let regs = &core.regs;
    match reg_from_code(sel) {
        Reg::A => regs.a,
        Reg::B => regs.b,
        Reg::X => alu::sext48(regs.x) & MASK56,
        Reg::Y => alu::sext48(regs.y) & MASK56,
        other => {
            let word = match other {
                Reg::X0 => (regs.x & MASK24) as u32,
                Reg::X1 => ((regs.x >> 24) & MASK24) as u32,
                Reg::Y0 => (regs.y & MASK24) as u32,
                Reg::Y1 => ((regs.y >> 24) & MASK24) as u32,
                _ => unreachable!("bad ALU operand {other:?}"),
            };
            (alu::sext24(word) << 24) & MASK56
        }
    }
}

/// Raw 24-bit word for logical operands and multiplier inputs.
fn word_operand(core: &Core, sel: u32) -> u32 {
    let regs = &core.regs;
    match reg_from_code(sel) {
        Reg::X0 => (regs.x & MASK24) as u32,
        Reg::X1 => ((regs.x >> 24) & MASK24) as u32,
        Reg::Y0 => (regs.y & MASK24) as u32,
        Reg::Y1 => ((regs.y >> 24) & MASK24) as u32,
        Reg::A1 => ((regs.a >> 24) & MASK24) as u32,
        Reg::B1 => ((regs.b >> 24) & MASK24) as u32,
        other => unreachable!("bad word operand {other:?}"),
    }
}

/// The packed data-ALU dispatcher.
pub extern "C" fn rt_alu(core: *mut Core, packed: u32, imm: u32) {
    let core = unsafe { core_mut(core) };
    let call = AluCall::unpack(packed);
    let d = core.regs.acc(call.acc);

    let (value, flags): (Option<u64>, Option<FlagUpdate>) = match call.kind {
        AluKind::Tfr => {
            let s = arith_operand(core, call.sel, call.acc);
            (Some(s), None)
        }
        AluKind::Add => {
            let (r, f) = alu::add56(d, arith_operand(core, call.sel, call.acc));
            (Some(r), Some(f))
        }
        AluKind::Sub => {
            let (r, f) = alu::sub56(d, arith_operand(core, call.sel, call.acc));
            (Some(r), Some(f))
        }
        AluKind::Cmp => (None, Some(alu::cmp56(d, arith_operand(core, call.sel, call.acc)))),
        AluKind::Cmpm => (None, Some(alu::cmpm56(d, arith_operand(core, call.sel, call.acc)))),
        AluKind::Addr => {
            let (r, f) = alu::addr56(d, arith_operand(core, call.sel, call.acc));
            (Some(r), Some(f))
        }
        AluKind::Addl => {
            let (r, f) = alu::addl56(d, arith_operand(core, call.sel, call.acc));
            (Some(r), Some(f))
        }
        AluKind::Tst => (None, Some(alu::tst56(d))),
        AluKind::Clr => {
            let (r, f) = alu::clr56();
            (Some(r), Some(f))
        }
        AluKind::And => {
            let (r, f) = alu::and24(d, word_operand(core, call.sel));
            (Some(r), Some(f))
        }
        AluKind::Or => {
            let (r, f) = alu::or24(d, word_operand(core, call.sel));
            (Some(r), Some(f))
        }
        AluKind::Eor => {
            let (r, f) = alu::eor24(d, word_operand(core, call.sel));
            (Some(r), Some(f))
        }
        AluKind::Not => {
            let (r, f) = alu::not24(d);
            (Some(r), Some(f))
        }
        AluKind::Abs => {
            let (r, f) = alu::abs56(d);
            (Some(r), Some(f))
        }
        AluKind::Neg => {
            let (r, f) = alu::neg56(d);
            (Some(r), Some(f))
        }
        AluKind::Rnd => {
            let (r, f) = alu::rnd56(d, core.regs.sr);
            (Some(r), Some(f))
        }
        AluKind::Asl => {
            let (r, f) = alu::asl56(d);
            (Some(r), Some(f))
        }
        AluKind::Asr => {
            let (r, f) = alu::asr56(d);
            (Some(r), Some(f))
        }
        AluKind::Lsl => {
            let (r, f) = alu::lsl24(d);
            (Some(r), Some(f))
        }
        AluKind::Lsr => {
            let (r, f) = alu::lsr24(d);
            (Some(r), Some(f))
        }
        AluKind::Rol => {
            ccr::materialize(&mut core.regs);
            let (r, f) = alu::rol24(d, core.regs.sr & sr::C != 0);
            (Some(r), Some(f))
        }
        AluKind::Ror => {
            ccr::materialize(&mut core.regs);
            let (r, f) = alu::ror24(d, core.regs.sr & sr::C != 0);
            (Some(r), Some(f))
        }
        AluKind::Inc => {
            let (r, f) = alu::add56(d, 1);
            (Some(r), Some(f))
        }
        AluKind::Dec => {
            let (r, f) = alu::sub56(d, 1);
            (Some(r), Some(f))
        }
        AluKind::AddImm => {
            let (r, f) = alu::add56(d, (alu::sext24(imm) << 24) & MASK56);
            (Some(r), Some(f))
        }
        AluKind::SubImm => {
            let (r, f) = alu::sub56(d, (alu::sext24(imm) << 24) & MASK56);
            (Some(r), Some(f))
        }
        AluKind::CmpImm => {
            (None, Some(alu::cmp56(d, (alu::sext24(imm) << 24) & MASK56)))
        }
        AluKind::AndImm => {
            let (r, f) = alu::and24(d, imm);
            (Some(r), Some(f))
        }
        AluKind::OrImm => {
            let (r, f) = alu::or24(d, imm);
            (Some(r), Some(f))
        }
        AluKind::EorImm => {
            let (r, f) = alu::eor24(d, imm);
            (Some(r), Some(f))
        }
        AluKind::Mul => {
            let s1 = word_operand(core, call.sel);
            let s2 = word_operand(core, call.sel2);
            let (mut r, mut f) = alu::mpy56(d, s1, s2, call.negate, call.accumulate);
            if call.round {
                let (rr, rf) = alu::rnd56(r, core.regs.sr);
                r = rr;
                f = rf;
            }
            (Some(r), Some(f))
        }
        AluKind::MulImm => {
            let s1 = word_operand(core, call.sel);
            let s2 = if call.count <= 23 { 1u32 << (23 - call.count) } else { 0 };
            let (r, f) = alu::mpy56(d, s1, s2, call.negate, call.accumulate);
            (Some(r), Some(f))
        }
        AluKind::Dmac => {
            let s1 = word_operand(core, call.sel);
            let s2 = word_operand(core, call.sel2);
            let signed = match call.count {
                0 => (true, true),
                1 => (true, false),
                _ => (false, false),
            };
            let (r, f) = alu::dmac56(d, s1, s2, call.negate, signed);
            (Some(r), Some(f))
        }
        AluKind::Div => {
            ccr::materialize(&mut core.regs);
            let s = word_operand(core, call.sel);
            let carry_in = core.regs.sr & sr::C != 0;
            let (r, carry, overflow) = alu::div_step(d, s, carry_in);
            core.regs.sr = (core.regs.sr & !(sr::C | sr::V))
                | u32::from(carry) * sr::C
                | u32::from(overflow) * sr::V;
            if overflow {
                core.regs.sr |= sr::L;
            }
            core.regs.set_acc(call.acc, r);
            return;
        }
        AluKind::Extract => {
            let src = core.regs.acc((call.sel2 & 1) as u8);
            let control = if call.round { imm } else { word_operand(core, call.sel) };
            let (r, f) = alu::extractu56(src, control);
            (Some(r), Some(f))
        }
        AluKind::AslN => {
            let src = core.regs.acc((call.sel2 & 1) as u8);
            let n = shift_count(core, call, imm);
            let (r, f) = alu::asl56_n(src, n);
            (Some(r), Some(f))
        }
        AluKind::AsrN => {
            let src = core.regs.acc((call.sel2 & 1) as u8);
            let n = shift_count(core, call, imm);
            let (r, f) = alu::asr56_n(src, n);
            (Some(r), Some(f))
        }
        AluKind::LslN => {
            let n = shift_count(core, call, imm);
            let (r, f) = alu::lsl24_n(d, n);
            (Some(r), Some(f))
        }
        AluKind::LsrN => {
            let n = shift_count(core, call, imm);
            let (r, f) = alu::lsr24_n(d, n);
            (Some(r), Some(f))
        }
    };

    if let Some(v) = value {
        core.regs.set_acc(call.acc, v);
    }
    if call.update_ccr {
        if let Some(f) = flags {
            ccr::apply(&mut core.regs, f);
        }
    }
}

/// Shift amount: immediate from the descriptor, or the low six bits of a
/// control register.
fn shift_count(core: &mut Core, call: AluCall, imm: u32) -> u8 {
    if call.round {
        (imm & 0x3F) as u8
    } else if call.accumulate {
        (word_operand(core, call.sel) & 0x3F) as u8
    } else {
        call.count
    }
}

// ===== Bit operations =====

fn bit_op_from_code(code: u32) -> BitOp {
    match code & 3 {
        0 => BitOp::Clear,
        1 => BitOp::Set,
        2 => BitOp::Change,
        _ => BitOp::Test,
    }
}

pub(crate) fn bit_op_code(op: BitOp) -> u32 {
    match op {
        BitOp::Clear => 0,
        BitOp::Set => 1,
        BitOp::Change => 2,
        BitOp::Test => 3,
    }
}

/// Bit test/modify on a memory word. The tested bit lands in C.
pub extern "C" fn rt_bit_mem(core: *mut Core, packed: u32, addr: u32) {
    let core = unsafe { core_mut(core) };
    let op = bit_op_from_code(packed);
    let bit = ((packed >> 2) & 0x1F) as u8;
    let space = space_from_code((packed >> 7) & 3);
    let addr = addr & MASK24 as u32;

    let old = if Memory::is_peripheral(space, addr) {
        match op {
            BitOp::Clear => core.periph.bit_clear(space, addr, bit),
            BitOp::Set => core.periph.bit_set(space, addr, bit),
            BitOp::Change => core.periph.bit_change(space, addr, bit),
            BitOp::Test => core.periph.bit_test(space, addr, bit),
        }
    } else {
        let word = core.read(space, addr);
        let old = word & (1 << bit) != 0;
        let new = match op {
            BitOp::Clear => word & !(1 << bit),
            BitOp::Set => word | 1 << bit,
            BitOp::Change => word ^ 1 << bit,
            BitOp::Test => word,
        };
        if op != BitOp::Test {
            core.write(space, addr, new);
        }
        old
    };

    ccr::materialize(&mut core.regs);
    core.regs.sr = (core.regs.sr & !sr::C) | u32::from(old) * sr::C;
}

/// Bit test/modify on a register.
pub extern "C" fn rt_bit_reg(core: *mut Core, packed: u32) {
    let core = unsafe { core_mut(core) };
    let op = bit_op_from_code(packed);
    let bit = ((packed >> 2) & 0x1F) as u8;
    let reg = reg_from_code(packed >> 7);

    let word = reg_read24(core, reg);
    let old = word & (1 << bit) != 0;
    let new = match op {
        BitOp::Clear => word & !(1 << bit),
        BitOp::Set => word | 1 << bit,
        BitOp::Change => word ^ 1 << bit,
        BitOp::Test => word,
    };
    if op != BitOp::Test {
        reg_write24(core, reg, new);
    }
    ccr::materialize(&mut core.regs);
    core.regs.sr = (core.regs.sr & !sr::C) | u32::from(old) * sr::C;
}

/// andi/ori into a status field. Target codes: 0 = mr, 1 = ccr, 2 = omr,
/// 3 = eom; bit 2 selects or.
pub extern "C" fn rt_status_mask(core: *mut Core, imm: u32, packed: u32) {
    let core = unsafe { core_mut(core) };
    let is_or = packed & 4 != 0;
    let sel = packed & 3;
    if sel == 1 {
        ccr::materialize(&mut core.regs);
    }
    let shift = if sel == 0 || sel == 3 { 8 } else { 0 };
    let field_mask = 0xFFu32 << shift;
    let imm = (imm & 0xFF) << shift;
    let target = if sel <= 1 { &mut core.regs.sr } else { &mut core.regs.omr };
    if is_or {
        *target |= imm;
    } else {
        *target &= !field_mask | imm;
    }
}

// ===== Control transfers and hardware loops =====

pub extern "C" fn rt_jsr(core: *mut Core, target: u32, ret_addr: u32) {
    let core = unsafe { core_mut(core) };
    ccr::materialize(&mut core.regs);
    let sr_val = core.regs.sr;
    core.regs.stack_push(ret_addr, sr_val);
    core.regs.pc = target & MASK24 as u32;
}

pub extern "C" fn rt_rts(core: *mut Core) {
    let core = unsafe { core_mut(core) };
    let (ret, _) = core.regs.stack_pop();
    core.regs.pc = ret;
}

/// Enter a hardware loop: stack the previous LA/LC, then the loop start
/// address with the current SR, and set the loop flag.
pub extern "C" fn rt_do_begin(core: *mut Core, count: u32, last_addr: u32, start: u32) {
    let core = unsafe { core_mut(core) };
    ccr::materialize(&mut core.regs);
    let (la, lc, sr_val) = (core.regs.la, core.regs.lc, core.regs.sr);
    core.regs.stack_push(la, lc);
    core.regs.stack_push(start, sr_val);
    core.regs.lc = count & MASK24 as u32;
    core.regs.la = last_addr & MASK24 as u32;
    core.regs.sr |= sr::LF;
}

/// Close one loop iteration: jump back while the counter runs, otherwise
/// unwind the loop state and fall through.
pub extern "C" fn rt_loop_end(core: *mut Core) {
    let core = unsafe { core_mut(core) };
    if core.regs.lc > 1 {
        core.regs.lc = core.regs.lc.wrapping_sub(1) & MASK24 as u32;
        core.regs.pc = core.regs.ssh_top();
    } else {
        let exit_pc = core.regs.la.wrapping_add(1) & MASK24 as u32;
        unwind_loop(core);
        core.regs.pc = exit_pc;
    }
}

/// `enddo`: abandon the loop without iterating.
pub extern "C" fn rt_enddo(core: *mut Core) {
    let core = unsafe { core_mut(core) };
    unwind_loop(core);
}

fn unwind_loop(core: &mut Core) {
    let (_, saved_sr) = core.regs.stack_pop();
    core.regs.sr = (core.regs.sr & !sr::LF) | (saved_sr & sr::LF);
    let (la, lc) = core.regs.stack_pop();
    core.regs.la = la;
    core.regs.lc = lc;
}

/// Latch a repeat count into LC; returns the iteration count (zero skips).
pub extern "C" fn rt_rep_begin(core: *mut Core, count: u32) -> u32 {
    let core = unsafe { core_mut(core) };
    let count = count & MASK24 as u32;
    core.regs.lc = count;
    count
}

/// One repeat iteration done; returns nonzero while more remain.
pub extern "C" fn rt_rep_step(core: *mut Core) -> u32 {
    let core = unsafe { core_mut(core) };
    if core.regs.lc > 1 {
        core.regs.lc -= 1;
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reg_codes_round_trip() {
        for reg in [
            Reg::X0,
            Reg::B2,
            Reg::A,
            Reg::R(5),
            Reg::N(7),
            Reg::M(0),
            Reg::Sr,
            Reg::Lc,
            Reg::Ba,
        ] {
            assert_eq!(reg_from_code(reg_code(reg)), reg);
        }
    }

    #[test]
    fn alu_call_round_trip() {
        let mut call = AluCall::new(AluKind::Mul, 1);
        call.sel = reg_code(Reg::X1);
        call.sel2 = reg_code(Reg::Y0);
        call.negate = true;
        call.round = true;
        call.count = 0x15;
        let back = AluCall::unpack(call.pack());
        assert_eq!(back.kind, AluKind::Mul);
        assert_eq!(back.sel, reg_code(Reg::X1));
        assert_eq!(back.sel2, reg_code(Reg::Y0));
        assert_eq!(back.acc, 1);
        assert!(back.negate && back.round && !back.accumulate);
        assert!(back.update_ccr);
        assert_eq!(back.count, 0x15);
    }

    #[test]
    fn move_path_accumulator_semantics() {
        let mut core = Core::new(0x100);
        core.regs.b = 0x44AABBCCDDEEFF;
        // limited read
        assert_eq!(reg_read24(&mut core, Reg::B), 0x7FFFFF);
        assert!(core.regs.sr & sr::L != 0);
        // 24-bit write sign-extends into the high word
        reg_write24(&mut core, Reg::A, 0xFF0000);
        assert_eq!(core.regs.a, 0xFFFF0000000000);
        // a2 reads back sign-extended
        core.regs.a = 0xFF000000000000;
        assert_eq!(reg_read24(&mut core, Reg::A2), 0xFFFFFF);
    }

    #[test]
    fn rep_counter() {
        let mut core = Core::new(0x10);
        let p = &mut core as *mut Core;
        assert_eq!(rt_rep_begin(p, 3), 3);
        assert_eq!(rt_rep_step(p), 1);
        assert_eq!(rt_rep_step(p), 1);
        assert_eq!(rt_rep_step(p), 0);
        assert_eq!(core.regs.lc, 1);
    }

    #[test]
    fn loop_begin_end_round_trip() {
        let mut core = Core::new(0x10);
        let p = &mut core as *mut Core;
        core.regs.la = 0xAAA;
        core.regs.lc = 0xBBB;
        rt_do_begin(p, 2, 0x20, 0x10);
        assert!(core.regs.sr & sr::LF != 0);
        assert_eq!((core.regs.la, core.regs.lc), (0x20, 2));
        // first pass loops back
        rt_loop_end(p);
        assert_eq!(core.regs.pc, 0x10);
        assert_eq!(core.regs.lc, 1);
        // second pass exits and restores
        rt_loop_end(p);
        assert_eq!(core.regs.pc, 0x21);
        assert_eq!((core.regs.la, core.regs.lc), (0xAAA, 0xBBB));
        assert!(core.regs.sr & sr::LF == 0);
    }
}
