//! Non-local exits of a call: break, retry and raised errors.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::context::FrameId;
use crate::value::Value;

pub type CallResult = Result<Value, Unwind>;

/// A `break` out of a block, addressed to the frame the block was created in.
#[derive(Clone, Debug)]
pub struct BreakJump {
    pub target: FrameId,
    pub value: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    NoMethodError,
    NameError,
    ArgumentError,
    LocalJumpError,
    TypeError,
    RuntimeError,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::NoMethodError => "NoMethodError",
            ErrorClass::NameError => "NameError",
            ErrorClass::ArgumentError => "ArgumentError",
            ErrorClass::LocalJumpError => "LocalJumpError",
            ErrorClass::TypeError => "TypeError",
            ErrorClass::RuntimeError => "RuntimeError",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A language-level exception.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("{message} ({class})")]
pub struct RaiseError {
    pub class: ErrorClass,
    pub message: String,
    /// The method name involved, for NoMethodError/NameError.
    pub name: Option<Arc<str>>,
}

impl RaiseError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(Arc::from(name));
        self
    }

    pub fn argument_count(given: usize, expected: impl fmt::Display) -> Self {
        Self::new(
            ErrorClass::ArgumentError,
            format!("wrong number of arguments (given {given}, expected {expected})"),
        )
    }

    pub fn local_jump(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::LocalJumpError, message)
    }
}

#[derive(Clone, Debug, Error)]
pub enum Unwind {
    #[error("break to frame {}", .0.target)]
    Break(BreakJump),
    #[error("retry")]
    Retry,
    #[error(transparent)]
    Raise(#[from] RaiseError),
}

impl Unwind {
    pub fn as_raise(&self) -> Option<&RaiseError> {
        match self {
            Unwind::Raise(e) => Some(e),
            _ => None,
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Unwind::Raise(RaiseError::new(ErrorClass::RuntimeError, message))
    }
}
