//! Block cache manager.
//!
//! Owns the per-PC table of compiled units, decides whether a cached unit is
//! still valid for a program counter, compiles on miss, runs the unit, and
//! invalidates entries when program memory changes underneath them.

use metrics::counter;
use onyx_isa::Space;
use onyx_state::{Core, sr};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use crate::compiler::{self, CompiledBlock, RunMode};
use crate::error::{Error, Result};

/// The engine: a demand-driven compiler with a direct-indexed block cache.
pub struct Jit {
    core: Box<Core>,
    /// Compiled units, indexed by start PC.
    cache: Vec<Option<CompiledBlock>>,
    /// For every P word, the start PCs of units compiled from it.
    owners: Vec<Vec<u32>>,
    /// P addresses written at least once since construction.
    volatile_p: FxHashSet<u32>,
}

impl Jit {
    /// Take ownership of a core with an empty cache.
    pub fn new(core: Core) -> Self {
        let words = core.mem.size();
        Self {
            core: Box::new(core),
            cache: (0..words).map(|_| None).collect(),
            owners: (0..words).map(|_| Vec::new()).collect(),
            volatile_p: FxHashSet::default(),
        }
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut Core {
        &mut self.core
    }

    /// Run one compiled unit starting at `pc`; returns the next program
    /// counter. Compiles (or re-compiles) first when no valid unit exists.
    pub fn execute(&mut self, pc: u32) -> Result<u32> {
        let idx = pc as usize;
        if idx >= self.cache.len() {
            return Err(Error::OutOfProgramSpace { pc });
        }

        let stale = match &self.cache[idx] {
            Some(block) => !self.is_valid(block),
            None => false,
        };
        if stale {
            trace!(pc = format_args!("{pc:#x}"), "stale unit, recompiling");
            self.destroy(pc);
        }

        if self.cache[idx].is_none() {
            let block = self.compile(pc)?;
            self.install(pc, block);
        }

        let block = self.cache[idx].as_ref().expect("just installed");
        let entry = block.entry();
        let core: *mut Core = &mut *self.core;
        // Single-threaded by design: the unit runs to its internal exit and
        // the cache is only touched again after it returns.
        unsafe {
            entry(core, &mut (*core).regs);
        }
        counter!("onyx.blocks_executed").increment(1);

        self.drain_pending_writes();
        Ok(self.core.regs.pc)
    }

    /// Run until `max_units` compiled units have executed; returns the
    /// final program counter.
    pub fn run(&mut self, start_pc: u32, max_units: usize) -> Result<u32> {
        let mut pc = start_pc;
        for _ in 0..max_units {
            pc = self.execute(pc)?;
        }
        Ok(pc)
    }

    /// Record a program-memory write and invalidate the units compiled from
    /// that address. Must be called before the next execution step; writes
    /// performed by compiled code are drained automatically.
    pub fn notify_program_memory_write(&mut self, addr: u32) {
        let idx = addr as usize;
        if idx >= self.owners.len() {
            return;
        }
        self.volatile_p.insert(addr);
        let starts = std::mem::take(&mut self.owners[idx]);
        for start in starts {
            debug!(
                addr = format_args!("{addr:#x}"),
                start = format_args!("{start:#x}"),
                "invalidating unit over written program word"
            );
            self.destroy(start);
        }
        counter!("onyx.invalidations").increment(1);
    }

    fn drain_pending_writes(&mut self) {
        while let Some(addr) = self.core.pending_p_writes.pop() {
            self.notify_program_memory_write(addr);
        }
    }

    /// Re-validate a unit according to its run mode.
    fn is_valid(&self, block: &CompiledBlock) -> bool {
        let words_match = || {
            block
                .words()
                .iter()
                .enumerate()
                .all(|(i, &w)| self.core.mem.read(Space::P, block.start() + i as u32) == w)
        };
        match block.run_mode() {
            RunMode::Direct => true,
            RunMode::CheckPMemWrite => words_match(),
            RunMode::CheckLoopEnd { la } => {
                self.core.regs.sr & sr::LF != 0 && self.core.regs.la == la && words_match()
            }
        }
    }

    fn compile(&mut self, pc: u32) -> Result<CompiledBlock> {
        let block = compiler::compile(&self.core, pc, &self.volatile_p)?;
        counter!("onyx.blocks_compiled").increment(1);
        debug!(
            pc = format_args!("{pc:#x}"),
            words = block.words().len(),
            mode = ?block.run_mode(),
            "compiled unit"
        );
        Ok(block)
    }

    fn install(&mut self, pc: u32, block: CompiledBlock) {
        for w in 0..block.words().len() as u32 {
            let addr = (pc + w) as usize;
            if addr < self.owners.len() && !self.owners[addr].contains(&pc) {
                self.owners[addr].push(pc);
            }
        }
        // Replacing an entry drops the previous unit and its code pages.
        self.cache[pc as usize] = Some(block);
    }

    /// Drop a unit and its reverse-map entries.
    fn destroy(&mut self, start: u32) {
        if let Some(block) = self.cache[start as usize].take() {
            for w in 0..block.words().len() as u32 {
                let addr = (start + w) as usize;
                if addr < self.owners.len() {
                    self.owners[addr].retain(|&s| s != start);
                }
            }
        }
    }
}
