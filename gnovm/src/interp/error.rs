//! Runtime errors for the interpreter

use crate::values::{ConversionError, OpError};
use std::fmt;

/// Runtime error during interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Kinds of runtime errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A panic that was not recovered
    Panic,
    /// Failed value conversion
    Conversion,
    /// Index or slice bounds out of range
    IndexOutOfBounds,
    /// Nil pointer, map or function used
    NilDereference,
    /// Integer division by zero
    DivisionByZero,
    /// Failed type assertion
    TypeAssertion,
    /// Construct that the machine does not execute (channels, goroutines)
    Unsupported,
    /// Op budget exhausted
    OutOfGas,
    /// Broken machine invariant
    Internal,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        RuntimeError {
            kind,
            message: message.into(),
        }
    }

    /// An unrecovered panic. `value` is the rendered panic value.
    pub fn panic(value: &str) -> Self {
        RuntimeError {
            kind: ErrorKind::Panic,
            message: format!("panic: {value}"),
        }
    }

    pub fn index_out_of_bounds(index: i64, len: usize) -> Self {
        RuntimeError {
            kind: ErrorKind::IndexOutOfBounds,
            message: format!("runtime error: index out of range [{index}] with length {len}"),
        }
    }

    pub fn slice_bounds(low: usize, high: usize, cap: usize) -> Self {
        let message = if high > cap {
            format!("runtime error: slice bounds out of range [:{high}] with capacity {cap}")
        } else {
            format!("runtime error: slice bounds out of range [{low}:{high}]")
        };
        RuntimeError {
            kind: ErrorKind::IndexOutOfBounds,
            message,
        }
    }

    pub fn nil_dereference() -> Self {
        RuntimeError {
            kind: ErrorKind::NilDereference,
            message: "runtime error: invalid memory address or nil pointer dereference".to_string(),
        }
    }

    pub fn nil_map_write() -> Self {
        RuntimeError {
            kind: ErrorKind::NilDereference,
            message: "assignment to entry in nil map".to_string(),
        }
    }

    pub fn division_by_zero() -> Self {
        RuntimeError {
            kind: ErrorKind::DivisionByZero,
            message: "runtime error: integer divide by zero".to_string(),
        }
    }

    pub fn type_assertion(iface: &str, actual: &str, wanted: &str) -> Self {
        RuntimeError {
            kind: ErrorKind::TypeAssertion,
            message: format!("interface conversion: {iface} is {actual}, not {wanted}"),
        }
    }

    pub fn missing_method(actual: &str, wanted: &str, method: &str) -> Self {
        RuntimeError {
            kind: ErrorKind::TypeAssertion,
            message: format!(
                "interface conversion: {actual} is not {wanted}: missing method {method}"
            ),
        }
    }

    pub fn unsupported(what: &str) -> Self {
        RuntimeError {
            kind: ErrorKind::Unsupported,
            message: format!("{what} not yet implemented"),
        }
    }

    pub fn out_of_gas(limit: u64) -> Self {
        RuntimeError {
            kind: ErrorKind::OutOfGas,
            message: format!("out of gas: op limit {limit} exceeded"),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        RuntimeError {
            kind: ErrorKind::Internal,
            message: format!("internal error: {}", msg.into()),
        }
    }

    /// Errors that become a panic of the running program and can be
    /// recovered from.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self.kind,
            ErrorKind::OutOfGas | ErrorKind::Internal | ErrorKind::Unsupported | ErrorKind::Panic
        )
    }
}

impl From<ConversionError> for RuntimeError {
    fn from(e: ConversionError) -> Self {
        RuntimeError::new(ErrorKind::Conversion, e.0)
    }
}

impl From<OpError> for RuntimeError {
    fn from(e: OpError) -> Self {
        match e {
            OpError::DivisionByZero => RuntimeError::division_by_zero(),
            OpError::NegativeShift => RuntimeError::new(ErrorKind::Panic, "runtime error: negative shift amount"),
            OpError::Invalid(msg) => RuntimeError::internal(msg),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// Result type for interpreter operations
pub type InterpResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_out_of_bounds() {
        let err = RuntimeError::index_out_of_bounds(5, 3);
        assert_eq!(err.kind, ErrorKind::IndexOutOfBounds);
        assert_eq!(err.message, "runtime error: index out of range [5] with length 3");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_slice_bounds() {
        let err = RuntimeError::slice_bounds(0, 9, 4);
        assert!(err.message.contains("[:9] with capacity 4"));
        let err = RuntimeError::slice_bounds(3, 2, 4);
        assert!(err.message.contains("[3:2]"));
    }

    #[test]
    fn test_panic_prefix() {
        let err = RuntimeError::panic("boom");
        assert_eq!(err.to_string(), "panic: boom");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_unsupported_not_recoverable() {
        let err = RuntimeError::unsupported("channel send");
        assert_eq!(err.message, "channel send not yet implemented");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_from_op_error() {
        let err: RuntimeError = OpError::DivisionByZero.into();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
        assert_eq!(err.message, "runtime error: integer divide by zero");
    }

    #[test]
    fn test_from_conversion_error() {
        let err: RuntimeError = ConversionError("cannot convert StringKind to Int8Kind".into()).into();
        assert_eq!(err.kind, ErrorKind::Conversion);
        assert_eq!(err.to_string(), "cannot convert StringKind to Int8Kind");
    }
}
