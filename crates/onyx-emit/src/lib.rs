//! Host code emission.
//!
//! A [`BlockAssembler`] offers a small architecture-portable helper surface —
//! moves, loads/stores at a base register plus displacement, arithmetic,
//! compare-and-branch, absolute calls — that the code generator drives
//! without ever branching on the target architecture. Two backends implement
//! it with equivalent semantics: `x64` delegates encoding to the `iced-x86`
//! code assembler, `a64` encodes AArch64 words directly. The active backend
//! is selected at compile time from the target architecture.
//!
//! Finished code is copied into an [`ExecutableMemory`] mapping whose
//! protection is flipped from writable to executable before use.

pub mod a64;
mod buffer;
mod error;
mod memory;
pub mod x64;

pub use buffer::{CodeBuffer, Label};
pub use error::EmitError;
pub use memory::ExecutableMemory;

/// One host general-purpose register, numbered in the active backend's
/// encoding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostReg(pub u8);

/// Argument of a runtime helper call.
#[derive(Clone, Copy, Debug)]
pub enum CallArg {
    Reg(HostReg),
    Imm(u64),
}

#[cfg(target_arch = "aarch64")]
pub use a64::{BlockAssembler, abi};
#[cfg(not(target_arch = "aarch64"))]
pub use x64::{BlockAssembler, abi};
