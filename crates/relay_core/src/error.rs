use std::borrow::Cow;
use thiserror::Error;

/// A value handed to a typed accessor had the wrong type or range.
///
/// Positions are 1-based, counted the way the calling script sees its
/// arguments (the receiver object is argument #1 for methods and setters).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgumentError {
    #[error("bad argument #{position} ({expected} expected, got {got})")]
    Type {
        position: usize,
        expected: Cow<'static, str>,
        got: &'static str,
    },

    #[error("bad argument #{position} (value in [{min}, {max}] expected, got {value})")]
    Range {
        position: usize,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("bad field '{field}' ({expected} expected, got {got})")]
    FieldType {
        field: String,
        expected: &'static str,
        got: &'static str,
    },

    #[error("bad field '{field}' (value in [{min}, {max}] expected, got {value})")]
    FieldRange {
        field: String,
        min: f64,
        max: f64,
        value: f64,
    },
}

impl ArgumentError {
    pub fn type_mismatch(
        position: usize,
        expected: impl Into<Cow<'static, str>>,
        got: &'static str,
    ) -> Self {
        Self::Type {
            position,
            expected: expected.into(),
            got,
        }
    }

    /// Argument position, when the error refers to a positional argument.
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Type { position, .. } | Self::Range { position, .. } => Some(*position),
            Self::FieldType { .. } | Self::FieldRange { .. } => None,
        }
    }
}

/// Errors surfaced synchronously to the immediate caller.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Argument(#[from] ArgumentError),

    #[error("class '{name}' is not registered")]
    UnknownClass { name: String },

    #[error("class '{name}' is already registered")]
    DuplicateClass { name: String },

    #[error("property '{property}' is already declared on class '{class}'")]
    DuplicateProperty { class: String, property: String },

    #[error("class '{class}' has no method '{method}'")]
    UnknownMethod { class: String, method: String },

    #[error("property table of class '{class}' is already wired to a parent")]
    AlreadyInherited { class: String },

    #[error("native state of a '{class}' object is already borrowed")]
    StateBorrowed { class: String },

    /// Raised by script code or a native callable.
    #[error("{message}")]
    Script { message: String },
}

impl RuntimeError {
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_errors_carry_position() {
        let err = ArgumentError::Range {
            position: 2,
            min: 0.0,
            max: 1.0,
            value: 3.5,
        };
        assert_eq!(err.position(), Some(2));
        assert_eq!(
            err.to_string(),
            "bad argument #2 (value in [0, 1] expected, got 3.5)"
        );

        let err = ArgumentError::type_mismatch(1, "Counter", "object");
        assert_eq!(err.to_string(), "bad argument #1 (Counter expected, got object)");
    }

    #[test]
    fn argument_error_is_transparent_in_runtime_error() {
        let err: RuntimeError = ArgumentError::type_mismatch(3, "boolean", "nil").into();
        assert_eq!(err.to_string(), "bad argument #3 (boolean expected, got nil)");
    }
}
