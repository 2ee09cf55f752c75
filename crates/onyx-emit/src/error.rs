//! Emission errors.

use thiserror::Error;

/// A code-generation fault. Always fatal for the block being compiled.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("host encoder rejected instruction: {0}")]
    Encode(String),
    #[error("label {0} bound twice")]
    LabelRebound(usize),
    #[error("label {0} never bound")]
    LabelUnbound(usize),
    #[error("branch target out of range for label {0}")]
    BranchRange(usize),
    #[error("executable mapping failed: {0}")]
    Map(String),
}
