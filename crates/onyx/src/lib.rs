//! Onyx — a DSP56300-family dynamic recompiler.
//!
//! The engine translates 24-bit DSP instruction words into host machine
//! code on demand, one straight-line (or loop-bounded) block per program
//! counter, and caches the result until a program-memory write or a
//! hardware-loop state change invalidates it.
//!
//! # Example
//!
//! ```no_run
//! use onyx::{Core, Jit};
//!
//! let mut core = Core::new(0x4000);
//! core.mem.load_program(0, &[0x200010]); // add b,a
//! let mut jit = Jit::new(core);
//! jit.execute(0).unwrap();
//! ```

// Re-export from sub-crates
pub use onyx_isa::{Cond, DecodeError, Instr, Op, Reg, Space, decode};
pub use onyx_state::{Core, Memory, Peripherals, Registers, ScratchPeripherals, sr};

pub mod agu;
pub mod alu;
mod cache;
pub mod ccr;
mod compiler;
mod error;
mod pool;
mod runtime;

pub use cache::Jit;
pub use compiler::{CompiledBlock, RunMode};
pub use error::{Error, Result};
