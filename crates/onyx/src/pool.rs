//! Virtual register pool.
//!
//! Binds emulated 24-bit registers (and anonymous temporaries) to the host
//! callee-saved registers for the lifetime of a compiled block. Values are
//! loaded lazily on acquire-for-read, marked dirty on acquire-for-write, and
//! spilled back to the register file on eviction, before helper calls, and
//! at block end. Eviction is least-recently-used among unpinned slots;
//! helper calls that may write the register file invalidate all resident
//! bindings (temporaries survive — they have no register-file identity).

use onyx_emit::{BlockAssembler, EmitError, HostReg, abi};
use onyx_isa::Reg;
use onyx_state::Registers;
use std::mem::offset_of;

use crate::alu::MASK24;

/// Where an inline-managed register lives inside [`Registers`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Loc {
    /// Subfield of a 64-bit field: `bits` wide at `shift`. Eight-bit fields
    /// (the accumulator extension bytes) read back sign-extended to 24 bits.
    F64 { off: i32, shift: u8, bits: u8 },
    /// Whole 32-bit field (kept masked to 24 bits in memory).
    F32 { off: i32 },
}

/// Inline location of a register, or `None` when access must go through a
/// runtime helper (full accumulators saturate, SR/SSH/SSL have side
/// effects).
pub(crate) fn inline_loc(reg: Reg) -> Option<Loc> {
    let a = offset_of!(Registers, a) as i32;
    let b = offset_of!(Registers, b) as i32;
    let x = offset_of!(Registers, x) as i32;
    let y = offset_of!(Registers, y) as i32;
    Some(match reg {
        Reg::X0 => Loc::F64 { off: x, shift: 0, bits: 24 },
        Reg::X1 => Loc::F64 { off: x, shift: 24, bits: 24 },
        Reg::Y0 => Loc::F64 { off: y, shift: 0, bits: 24 },
        Reg::Y1 => Loc::F64 { off: y, shift: 24, bits: 24 },
        Reg::A0 => Loc::F64 { off: a, shift: 0, bits: 24 },
        Reg::A1 => Loc::F64 { off: a, shift: 24, bits: 24 },
        Reg::A2 => Loc::F64 { off: a, shift: 48, bits: 8 },
        Reg::B0 => Loc::F64 { off: b, shift: 0, bits: 24 },
        Reg::B1 => Loc::F64 { off: b, shift: 24, bits: 24 },
        Reg::B2 => Loc::F64 { off: b, shift: 48, bits: 8 },
        Reg::R(i) => Loc::F32 { off: (offset_of!(Registers, r) + usize::from(i) * 4) as i32 },
        Reg::N(i) => Loc::F32 { off: (offset_of!(Registers, n) + usize::from(i) * 4) as i32 },
        Reg::M(i) => Loc::F32 { off: (offset_of!(Registers, m) + usize::from(i) * 4) as i32 },
        Reg::Omr => Loc::F32 { off: offset_of!(Registers, omr) as i32 },
        Reg::Sp => Loc::F32 { off: offset_of!(Registers, sp) as i32 },
        Reg::La => Loc::F32 { off: offset_of!(Registers, la) as i32 },
        Reg::Lc => Loc::F32 { off: offset_of!(Registers, lc) as i32 },
        Reg::Ep => Loc::F32 { off: offset_of!(Registers, ep) as i32 },
        Reg::Vba => Loc::F32 { off: offset_of!(Registers, vba) as i32 },
        Reg::Sc => Loc::F32 { off: offset_of!(Registers, sc) as i32 },
        Reg::Sz => Loc::F32 { off: offset_of!(Registers, sz) as i32 },
        _ => return None,
    })
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Key {
    Dsp(Reg),
    Temp(u32),
}

#[derive(Clone, Copy)]
struct Slot {
    host: HostReg,
    key: Option<Key>,
    dirty: bool,
    pinned: bool,
    stamp: u64,
}

/// The block-scoped register pool.
pub(crate) struct RegPool {
    slots: [Slot; 4],
    clock: u64,
    next_temp: u32,
}

impl RegPool {
    pub(crate) fn new() -> Self {
        let slot = |host| Slot { host, key: None, dirty: false, pinned: false, stamp: 0 };
        Self {
            slots: [
                slot(abi::POOL[0]),
                slot(abi::POOL[1]),
                slot(abi::POOL[2]),
                slot(abi::POOL[3]),
            ],
            clock: 0,
            next_temp: 0,
        }
    }

    fn touch(&mut self, idx: usize) {
        self.clock += 1;
        self.slots[idx].stamp = self.clock;
    }

    /// Bind `reg` to a host register. Loads on first read, marks dirty on
    /// write. The binding stays pinned until `unpin_all`.
    pub(crate) fn acquire(
        &mut self,
        asm: &mut BlockAssembler,
        reg: Reg,
        read: bool,
        write: bool,
    ) -> Result<HostReg, EmitError> {
        let loc = inline_loc(reg).ok_or_else(|| {
            EmitError::Encode(format!("register {reg:?} is not pool-managed"))
        })?;
        if let Some(idx) = self.slots.iter().position(|s| s.key == Some(Key::Dsp(reg))) {
            self.slots[idx].dirty |= write;
            self.slots[idx].pinned = true;
            self.touch(idx);
            return Ok(self.slots[idx].host);
        }
        let idx = self.evict_one(asm)?;
        let host = self.slots[idx].host;
        if read {
            load_loc(asm, loc, host)?;
        }
        self.slots[idx] = Slot {
            host,
            key: Some(Key::Dsp(reg)),
            dirty: write,
            pinned: true,
            stamp: 0,
        };
        self.touch(idx);
        Ok(host)
    }

    /// Claim an anonymous temporary. Temporaries are pinned and survive
    /// helper calls (the pool registers are callee-saved).
    pub(crate) fn temp(&mut self, asm: &mut BlockAssembler) -> Result<HostReg, EmitError> {
        let idx = self.evict_one(asm)?;
        self.next_temp += 1;
        let host = self.slots[idx].host;
        self.slots[idx] = Slot {
            host,
            key: Some(Key::Temp(self.next_temp)),
            dirty: false,
            pinned: true,
            stamp: 0,
        };
        self.touch(idx);
        Ok(host)
    }

    /// Find a victim slot, spilling its value if needed.
    fn evict_one(&mut self, asm: &mut BlockAssembler) -> Result<usize, EmitError> {
        if let Some(idx) = self.slots.iter().position(|s| s.key.is_none()) {
            return Ok(idx);
        }
        let idx = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.pinned)
            .min_by_key(|(_, s)| s.stamp)
            .map(|(i, _)| i)
            .ok_or_else(|| EmitError::Encode("register pool exhausted".into()))?;
        self.writeback(asm, idx)?;
        self.slots[idx].key = None;
        Ok(idx)
    }

    fn writeback(&mut self, asm: &mut BlockAssembler, idx: usize) -> Result<(), EmitError> {
        let slot = self.slots[idx];
        if slot.dirty {
            if let Some(Key::Dsp(reg)) = slot.key {
                let loc = inline_loc(reg).expect("dirty slot has an inline location");
                store_loc(asm, loc, slot.host)?;
            }
            self.slots[idx].dirty = false;
        }
        Ok(())
    }

    /// Spill every dirty register-file binding, keeping values resident.
    /// Required before any helper call that can observe the register file.
    pub(crate) fn flush(&mut self, asm: &mut BlockAssembler) -> Result<(), EmitError> {
        for idx in 0..self.slots.len() {
            self.writeback(asm, idx)?;
        }
        Ok(())
    }

    /// Drop register-file bindings after a helper that may have written the
    /// register file. Temporaries survive.
    pub(crate) fn invalidate_dsp(&mut self) {
        for slot in &mut self.slots {
            if let Some(Key::Dsp(_)) = slot.key {
                debug_assert!(!slot.dirty, "invalidate without flush");
                slot.key = None;
                slot.pinned = false;
            }
        }
    }

    /// Free one consumed temporary so its slot can be reused within the
    /// same instruction.
    pub(crate) fn free_temp(&mut self, host: HostReg) {
        for slot in &mut self.slots {
            if slot.host == host {
                if let Some(Key::Temp(_)) = slot.key {
                    slot.key = None;
                    slot.pinned = false;
                }
            }
        }
    }

    /// Release all pins (end of one emulated instruction). Temporaries are
    /// freed, named bindings stay resident for reuse.
    pub(crate) fn unpin_all(&mut self) {
        for slot in &mut self.slots {
            if let Some(Key::Temp(_)) = slot.key {
                slot.key = None;
            }
            slot.pinned = false;
        }
    }

    /// Spill everything and forget all bindings (block end).
    pub(crate) fn flush_and_reset(&mut self, asm: &mut BlockAssembler) -> Result<(), EmitError> {
        self.flush(asm)?;
        for slot in &mut self.slots {
            slot.key = None;
            slot.pinned = false;
        }
        Ok(())
    }
}

/// Load a register-file location into `dst`, zero-extended to 24 bits
/// (sign-extended for the 8-bit extension bytes).
pub(crate) fn load_loc(
    asm: &mut BlockAssembler,
    loc: Loc,
    dst: HostReg,
) -> Result<(), EmitError> {
    match loc {
        Loc::F32 { off } => asm.load_field32(dst, off),
        Loc::F64 { off, shift, bits: 24 } => {
            asm.load_field(dst, off)?;
            asm.shl_imm(dst, 40 - shift)?;
            asm.shr_imm(dst, 40)
        }
        Loc::F64 { off, shift, .. } => {
            // 8-bit extension byte, sign-extended to a 24-bit word
            asm.load_field(dst, off)?;
            asm.shl_imm(dst, 56 - shift)?;
            asm.sar_imm(dst, 56)?;
            asm.mov_imm(abi::SCRATCH1, MASK24)?;
            asm.and(dst, abi::SCRATCH1)
        }
    }
}

/// Store `src` (a 24-bit value) into a register-file location.
pub(crate) fn store_loc(
    asm: &mut BlockAssembler,
    loc: Loc,
    src: HostReg,
) -> Result<(), EmitError> {
    match loc {
        Loc::F32 { off } => {
            asm.mov(abi::SCRATCH1, src)?;
            asm.mov_imm(abi::SCRATCH2, MASK24)?;
            asm.and(abi::SCRATCH1, abi::SCRATCH2)?;
            asm.store_field32(off, abi::SCRATCH1)
        }
        Loc::F64 { off, shift, bits } => {
            let width = u64::from(bits.min(24));
            let mask = (1u64 << width) - 1;
            // trim the value and slide it into position
            asm.mov(abi::SCRATCH1, src)?;
            asm.mov_imm(abi::SCRATCH2, mask)?;
            asm.and(abi::SCRATCH1, abi::SCRATCH2)?;
            asm.shl_imm(abi::SCRATCH1, shift)?;
            // clear the destination lane and merge
            asm.load_field(abi::SCRATCH0, off)?;
            asm.mov_imm(abi::SCRATCH2, !(mask << shift))?;
            asm.and(abi::SCRATCH0, abi::SCRATCH2)?;
            asm.or(abi::SCRATCH0, abi::SCRATCH1)?;
            asm.store_field(off, abi::SCRATCH0)
        }
    }
}
