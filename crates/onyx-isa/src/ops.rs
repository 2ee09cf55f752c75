//! Decoded operation forms.

use crate::fields::{AguMode, Cond, Ea, Reg, Space, StatusField};

/// Source selector for two-operand ALU ops (the JJJ field, resolved).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluSrc {
    /// The accumulator that is not the destination.
    OtherAcc,
    /// 48-bit X pair.
    X,
    /// 48-bit Y pair.
    Y,
    X0,
    Y0,
    X1,
    Y1,
}

impl AluSrc {
    /// Resolve a JJJ field; `None` for encodings with no register source.
    pub fn from_jjj(jjj: u8) -> Option<Self> {
        Some(match jjj & 7 {
            0b010 => Self::X,
            0b011 => Self::Y,
            0b100 => Self::X0,
            0b101 => Self::Y0,
            0b110 => Self::X1,
            0b111 => Self::Y1,
            _ => return None,
        })
    }
}

/// Operand pair for the multiply unit (the QQQ field).
pub fn mul_pair(qqq: u8) -> (Reg, Reg) {
    match qqq & 7 {
        0b000 => (Reg::X0, Reg::X0),
        0b001 => (Reg::Y0, Reg::Y0),
        0b010 => (Reg::X1, Reg::X0),
        0b011 => (Reg::Y1, Reg::Y0),
        0b100 => (Reg::X0, Reg::Y1),
        0b101 => (Reg::Y0, Reg::X0),
        0b110 => (Reg::X1, Reg::Y0),
        _ => (Reg::Y1, Reg::X1),
    }
}

/// Data-ALU operation encoded in the low byte of a parallel-move word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluOp {
    /// No ALU activity (pure move word).
    None,
    /// Transfer source into destination accumulator (no CCR change except
    /// through the move-path limiter).
    Tfr(AluSrc),
    /// `D = D/2 + S` (the other accumulator).
    Addr,
    /// `D = 2*D + S`.
    Addl,
    Tst,
    Add(AluSrc),
    Sub(AluSrc),
    Cmp(AluSrc),
    Cmpm(AluSrc),
    And(AluSrc),
    Or(AluSrc),
    Eor(AluSrc),
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
    /// Multiply/accumulate: `D (=) ± s1*s2*2`, optionally rounded.
    Mul {
        pair: (Reg, Reg),
        negate: bool,
        accumulate: bool,
        round: bool,
    },
}

/// Parallel data-move half of an ALU word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParallelMove {
    /// No move.
    None,
    /// Conditional-execution prefix: the ALU op runs only if `cond` holds.
    Ifcc { cond: Cond, update_ccr: bool },
    /// Address-register update only.
    UpdateEa { mode: AguMode, rrr: u8 },
    /// `#xx,D` short immediate.
    ImmShort { imm: u8, dst: Reg },
    /// Register to register.
    RegToReg { src: Reg, dst: Reg },
    /// Single-space memory move, `X:`/`Y:` (covers ea, absolute short,
    /// absolute long and long-immediate operands).
    Mem {
        space: Space,
        ea: Ea,
        reg: Reg,
        /// true: memory (or immediate) to register.
        to_reg: bool,
    },
    /// `x:ea,D` (or `D,x:ea`) combined with `S -> y0`.
    XWithY0 { ea: Ea, xreg: Reg, to_reg: bool, src_acc: u8 },
    /// `S -> x0` combined with `y:ea,D` (or `D,y:ea`).
    YWithX0 { ea: Ea, yreg: Reg, to_reg: bool, src_acc: u8 },
    /// `S,x:ea  x0,S` one-word form.
    XStoreLoad { mode: AguMode, rrr: u8, acc: u8 },
    /// `S,y:ea  y0,S` one-word form.
    YStoreLoad { mode: AguMode, rrr: u8, acc: u8 },
    /// Long move, both halves of a 48-bit register through X and Y space.
    Long { ea: Ea, reg: Reg, to_reg: bool },
    /// Dual move, one X: and one Y: transfer in the same word.
    Xy { x: MoveXyHalf, y: MoveXyHalf },
}

/// One half of a dual X:Y: move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveXyHalf {
    pub mode: AguMode,
    pub rrr: u8,
    pub reg: Reg,
    pub to_reg: bool,
}

/// Immediate-operand ALU selector (short and long immediate forms).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImmAlu {
    Add,
    Sub,
    Cmp,
    And,
    Or,
    Eor,
}

impl ImmAlu {
    pub fn from_kkk(kkk: u8) -> Option<Self> {
        Some(match kkk & 7 {
            0b000 => Self::Add,
            0b010 => Self::Or,
            0b011 => Self::Eor,
            0b100 => Self::Sub,
            0b101 => Self::Cmp,
            0b110 => Self::And,
            _ => return None,
        })
    }
}

/// Bit-manipulation selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitOp {
    Set,
    Clear,
    Change,
    Test,
}

/// Sign treatment for `dmac`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DmacMode {
    SignedSigned,
    SignedUnsigned,
    UnsignedUnsigned,
}

/// Shift selector for the multi-bit shift class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShiftKind {
    Asl,
    Asr,
    Lsl,
    Lsr,
}

/// A fully decoded operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Nop,
    Rts,
    Enddo,
    Inc { acc: u8 },
    Dec { acc: u8 },
    Andi { imm: u8, target: StatusField },
    Ori { imm: u8, target: StatusField },
    /// Data-ALU word with its parallel move.
    Parallel { alu: AluOp, acc: u8, mv: ParallelMove },
    /// `add/sub/cmp/and/or/eor #imm,D` (short: 6-bit, long: extension word).
    AluImm { op: ImmAlu, imm: u32, acc: u8 },
    /// `mpy/mac (±)S,#n,D`: multiply by `2^-n`.
    MulImm { src: Reg, shift: u8, acc: u8, negate: bool, accumulate: bool },
    /// Double-precision multiply-accumulate: shift D right 24, then MAC.
    Dmac { mode: DmacMode, pair: (Reg, Reg), acc: u8, negate: bool },
    /// One division iteration.
    Div { src: Reg, acc: u8 },
    /// `extractu S1,S2,D` / `extractu #ctl,S,D`.
    ExtractU { ctrl: ExtractCtrl, src_acc: u8, acc: u8 },
    /// Multi-bit shift with immediate count.
    ShiftImm { kind: ShiftKind, bits: u8, acc: u8 },
    /// Multi-bit arithmetic shift with register count.
    ShiftReg { kind: ShiftKind, ctrl: Reg, src_acc: u8, acc: u8 },
    /// Bit op on a memory word (short-absolute, ea or peripheral target).
    BitMem { op: BitOp, bit: u8, space: Space, ea: Ea },
    /// Bit op on a register.
    BitReg { op: BitOp, bit: u8, reg: Reg },
    /// `lua (Rn)±[Nn],D`.
    Lua { mode: AguMode, rrr: u8, dst: Reg },
    /// `lua (Rn+aa),D` with a 7-bit signed displacement.
    LuaRel { rrr: u8, disp: i8, dst: Reg },
    /// `lra >*+aa,D`: PC-relative address into D.
    Lra { disp: u32, dst: Reg },
    /// Control-register move (all movec forms).
    MoveC { ctrl: Reg, operand: MoveCOperand, to_ctrl: bool },
    /// Program-space move.
    MoveP { ea: Ea, reg: Reg, to_reg: bool },
    /// `[xy]:(Rn+disp)` move, one-word (7-bit) and extension-word forms.
    MoveDisp { space: Space, rrr: u8, disp: u32, reg: Reg, to_reg: bool },
    /// Peripheral move, ea/immediate side.
    MovePeriph { space: Space, addr: u32, ea: Ea, ea_space: Space, to_periph: bool },
    /// Peripheral move, register side.
    MovePeriphReg { space: Space, addr: u32, reg: Reg, to_periph: bool },
    /// `rep` with immediate or register count.
    Rep { count: RepCount },
    /// `do` with immediate or register count; `last_addr` from the
    /// extension word is the address of the last loop instruction.
    Do { count: RepCount, last_addr: u32 },
    Jmp { target: u32 },
    Jsr { target: u32 },
    Jcc { cond: Cond, target: u32 },
}

/// Count operand of `rep`/`do`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepCount {
    Imm(u16),
    Reg(Reg),
}

/// Control operand of `extractu`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractCtrl {
    /// Width/offset packed `0x000WWOOO`-style in a register.
    Reg(Reg),
    /// Immediate control word from the extension word.
    Imm(u32),
}

/// Operand side of a control-register move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveCOperand {
    Mem { space: Space, ea: Ea },
    Reg(Reg),
    ImmShort(u8),
    ImmLong(u32),
}
