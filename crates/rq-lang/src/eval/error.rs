use smol_str::SmolStr;
use thiserror::Error;

use crate::{
    ident::{LabelId, ParameterId},
    source::SourceError,
    types::TypeDescriptor,
    value::Value,
};

type FunctionName = String;
type ArgType = Vec<SmolStr>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("{0}")]
    UserDefined(String),
    #[error("Exception thrown: {0}")]
    Thrown(Value),
    #[error("Undefined parameter {0}")]
    UndefinedParameter(ParameterId),
    #[error(r#"Invalid types for "{}", got {}"#, name, args.join(", "))]
    InvalidTypes { name: FunctionName, args: ArgType },
    #[error("Invalid number of arguments in \"{0}\", expected {1}, got {2}")]
    InvalidNumberOfArguments(FunctionName, usize, usize),
    #[error("Divided by 0")]
    ZeroDivision,
    #[error("Arithmetic overflow in \"{0}\"")]
    Overflow(String),
    #[error("Index out of bounds {0}")]
    IndexOutOfBounds(i64),
    #[error("Member \"{0}\" not found")]
    MissingMember(String),
    #[error("Null reference while accessing \"{0}\"")]
    NullReference(String),
    #[error("Maximum recursion depth exceeded \"{0}\"")]
    RecursionError(u32),
    #[error("\"{operator}\" expected exactly one element, got {count}")]
    ShapeMismatch { operator: SmolStr, count: usize },
    #[error("Remote queryable of {0} cannot be enumerated locally")]
    RemoteResource(TypeDescriptor),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("Invocation failed: {0}")]
    Invocation(Box<EvalError>),
    /// Control transfer to a label; caught by the enclosing block.
    #[error("Unexpected jump to label {0}")]
    Jump(LabelId, Value),
    #[error("Jump to label {0} escaped its scope")]
    UnhandledJump(LabelId),
}

impl EvalError {
    /// Strips one layer of invocation wrapping.
    pub fn unwrap_invocation(self) -> EvalError {
        match self {
            EvalError::Invocation(inner) => *inner,
            other => other,
        }
    }

    pub(crate) fn invalid_types(name: impl Into<String>, args: &[&Value]) -> Self {
        EvalError::InvalidTypes {
            name: name.into(),
            args: args.iter().map(|a| SmolStr::new(a.name())).collect(),
        }
    }
}
