//! DSP56300 machine state for runtime execution.
//!
//! The register file has a C-compatible layout because generated code loads
//! and stores its fields at fixed offsets. Memory is three flat word arrays
//! (P, X, Y) with the top of X/Y space bridged to a [`Peripherals`]
//! implementation.

mod machine;
mod memory;
mod registers;

pub use machine::Core;
pub use memory::{Memory, Peripherals, ScratchPeripherals};
pub use registers::{Registers, sr};
