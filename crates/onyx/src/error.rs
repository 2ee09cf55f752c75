//! Engine errors.

use onyx_emit::EmitError;
use onyx_isa::DecodeError;
use thiserror::Error;

/// Compilation and execution faults. All are fatal for the program counter
/// they occur at; nothing is retried and no partial unit is installed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("decode fault at {pc:#08x}: {source}")]
    Decode {
        pc: u32,
        #[source]
        source: DecodeError,
    },
    #[error("code generation fault: {0}")]
    Emit(#[from] EmitError),
    #[error("program counter {pc:#08x} outside program memory")]
    OutOfProgramSpace { pc: u32 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
