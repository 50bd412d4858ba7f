use thiserror::Error;

use crate::ir::{InstId, Signature, Type};

/// Failures of the IR-level instrumentation. Each one aborts the compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PassError {
    #[error("address operand of {inst} in `{function}` is not a pointer (found {found})")]
    NotAPointer {
        function: String,
        inst: InstId,
        found: Type,
    },
    #[error("`{name}` is already declared as {found}, expected {expected}")]
    HookSignatureMismatch {
        name: String,
        expected: Signature,
        found: Signature,
    },
    #[error("function `{0}` is already defined")]
    DuplicateFunction(String),
    #[error("invalid IR in `{function}`: {reason}")]
    Verification { function: String, reason: String },
}
