//! Error kinds raised by the value substrate and, ultimately, by running
//! Spek tasks. One variant per kind named in the engine's error table; no
//! `thiserror`/`anyhow` here, matching the rest of the workspace.

use std::fmt;

/// A Spek-level error. Converts to a sealed exception value via
/// [`crate::value::pack_exception`] before it reaches a task's exception
/// slot; this type is the host-language representation used while an
/// instruction is still unwinding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpekError {
    Type(String),
    Attribute(String),
    Index(String),
    Key(String),
    Reference(String),
    Instruction(String),
    Runtime(String),
    StopIteration,
    Future(String),
    Jump(String),
    Cancellation { initial: bool, message: String },
    /// Raised when a mutator is called on a sealed value.
    Sealed(String),
}

impl SpekError {
    pub fn type_error(msg: impl Into<String>) -> Self {
        SpekError::Type(msg.into())
    }

    pub fn attribute_error(msg: impl Into<String>) -> Self {
        SpekError::Attribute(msg.into())
    }

    pub fn index_error(msg: impl Into<String>) -> Self {
        SpekError::Index(msg.into())
    }

    pub fn key_error(msg: impl Into<String>) -> Self {
        SpekError::Key(msg.into())
    }

    pub fn reference_error(msg: impl Into<String>) -> Self {
        SpekError::Reference(msg.into())
    }

    pub fn instruction_error(msg: impl Into<String>) -> Self {
        SpekError::Instruction(msg.into())
    }

    pub fn runtime_error(msg: impl Into<String>) -> Self {
        SpekError::Runtime(msg.into())
    }

    pub fn future_error(msg: impl Into<String>) -> Self {
        SpekError::Future(msg.into())
    }

    pub fn jump_error(msg: impl Into<String>) -> Self {
        SpekError::Jump(msg.into())
    }

    pub fn cancellation(initial: bool, msg: impl Into<String>) -> Self {
        SpekError::Cancellation {
            initial,
            message: msg.into(),
        }
    }

    /// The name of the builtin exception type this error corresponds to.
    pub fn kind_name(&self) -> &'static str {
        match self {
            SpekError::Type(_) => "TypeError",
            SpekError::Attribute(_) => "AttributeError",
            SpekError::Index(_) => "IndexError",
            SpekError::Key(_) => "KeyError",
            SpekError::Reference(_) => "ReferenceError",
            SpekError::Instruction(_) => "InstructionException",
            SpekError::Runtime(_) => "RuntimeError",
            SpekError::StopIteration => "StopIteration",
            SpekError::Future(_) => "FutureError",
            SpekError::Jump(_) => "JumpError",
            SpekError::Cancellation { .. } => "CancellationError",
            SpekError::Sealed(_) => "RuntimeError",
        }
    }

    /// True for a `CancellationError` that has not yet been observed by an
    /// instruction. See the cancellation-preempt rule in the instruction
    /// set: the first instruction to see an initial cancellation converts
    /// it to non-initial before routing to the error continuation.
    pub fn is_initial_cancellation(&self) -> bool {
        matches!(self, SpekError::Cancellation { initial: true, .. })
    }
}

impl fmt::Display for SpekError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpekError::Type(m)
            | SpekError::Attribute(m)
            | SpekError::Index(m)
            | SpekError::Key(m)
            | SpekError::Reference(m)
            | SpekError::Instruction(m)
            | SpekError::Runtime(m)
            | SpekError::Future(m)
            | SpekError::Jump(m)
            | SpekError::Sealed(m) => write!(f, "{}: {}", self.kind_name(), m),
            SpekError::StopIteration => write!(f, "StopIteration"),
            SpekError::Cancellation { initial, message } => {
                write!(f, "CancellationError(initial={}): {}", initial, message)
            }
        }
    }
}

impl std::error::Error for SpekError {}

impl From<std::fmt::Error> for SpekError {
    fn from(e: std::fmt::Error) -> Self {
        SpekError::Runtime(e.to_string())
    }
}

impl From<String> for SpekError {
    fn from(s: String) -> Self {
        SpekError::Runtime(s)
    }
}

pub type SpekResult<T> = Result<T, SpekError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_match_error_table() {
        assert_eq!(SpekError::type_error("x").kind_name(), "TypeError");
        assert_eq!(SpekError::future_error("x").kind_name(), "FutureError");
        assert_eq!(SpekError::StopIteration.kind_name(), "StopIteration");
    }

    #[test]
    fn initial_cancellation_is_detected_only_when_set() {
        let initial = SpekError::cancellation(true, "cancelled");
        let non_initial = SpekError::cancellation(false, "cancelled");
        assert!(initial.is_initial_cancellation());
        assert!(!non_initial.is_initial_cancellation());
    }
}
