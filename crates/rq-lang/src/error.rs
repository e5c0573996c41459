use miette::Diagnostic;

use crate::{
    ast::AstError, dynamic::MappingError, eval::error::EvalError, execution::ExecutionError,
    translate::TranslateError,
};

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum InnerError {
    #[error(transparent)]
    Ast(#[from] AstError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Translate(#[from] TranslateError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Failure of any phase between composing a query and reading its result.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
#[error("{cause}")]
pub struct Error {
    /// The underlying cause of the error.
    pub cause: InnerError,
}

impl Error {
    pub fn new(cause: impl Into<InnerError>) -> Self {
        Self { cause: cause.into() }
    }
}

impl From<InnerError> for Error {
    fn from(cause: InnerError) -> Self {
        Self { cause }
    }
}

impl From<AstError> for Error {
    fn from(err: AstError) -> Self {
        Self::new(err)
    }
}

impl From<EvalError> for Error {
    fn from(err: EvalError) -> Self {
        Self::new(err)
    }
}

impl From<TranslateError> for Error {
    fn from(err: TranslateError) -> Self {
        Self::new(err)
    }
}

impl From<MappingError> for Error {
    fn from(err: MappingError) -> Self {
        Self::new(err)
    }
}

impl From<ExecutionError> for Error {
    fn from(err: ExecutionError) -> Self {
        Self::new(err)
    }
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let c = match &self.cause {
            InnerError::Ast(AstError::UndefinedLabel(_, _)) => "AstError::UndefinedLabel",
            InnerError::Ast(AstError::Encode(_)) => "AstError::Encode",
            InnerError::Ast(AstError::Decode(_)) => "AstError::Decode",
            InnerError::Eval(EvalError::UserDefined(_)) => "EvalError::UserDefined",
            InnerError::Eval(EvalError::Thrown(_)) => "EvalError::Thrown",
            InnerError::Eval(EvalError::UndefinedParameter(_)) => "EvalError::UndefinedParameter",
            InnerError::Eval(EvalError::InvalidTypes { .. }) => "EvalError::InvalidTypes",
            InnerError::Eval(EvalError::InvalidNumberOfArguments(_, _, _)) => "EvalError::InvalidNumberOfArguments",
            InnerError::Eval(EvalError::ZeroDivision) => "EvalError::ZeroDivision",
            InnerError::Eval(EvalError::Overflow(_)) => "EvalError::Overflow",
            InnerError::Eval(EvalError::IndexOutOfBounds(_)) => "EvalError::IndexOutOfBounds",
            InnerError::Eval(EvalError::MissingMember(_)) => "EvalError::MissingMember",
            InnerError::Eval(EvalError::NullReference(_)) => "EvalError::NullReference",
            InnerError::Eval(EvalError::RecursionError(_)) => "EvalError::RecursionError",
            InnerError::Eval(EvalError::ShapeMismatch { .. }) => "EvalError::ShapeMismatch",
            InnerError::Eval(EvalError::RemoteResource(_)) => "EvalError::RemoteResource",
            InnerError::Eval(EvalError::Source(_)) => "EvalError::Source",
            InnerError::Eval(EvalError::Invocation(_)) => "EvalError::Invocation",
            InnerError::Eval(EvalError::Jump(_, _)) => "EvalError::Jump",
            InnerError::Eval(EvalError::UnhandledJump(_)) => "EvalError::UnhandledJump",
            InnerError::Translate(TranslateError::NonSerializableConstant { .. }) => {
                "TranslateError::NonSerializableConstant"
            }
            InnerError::Translate(TranslateError::Unresolved(_)) => "TranslateError::Unresolved",
            InnerError::Translate(TranslateError::UnknownSource(_)) => "TranslateError::UnknownSource",
            InnerError::Translate(TranslateError::Ast(_)) => "TranslateError::Ast",
            InnerError::Mapping(MappingError::Cycle(_)) => "MappingError::Cycle",
            InnerError::Mapping(MappingError::DepthExceeded(_)) => "MappingError::DepthExceeded",
            InnerError::Mapping(MappingError::Unmappable(_)) => "MappingError::Unmappable",
            InnerError::Mapping(MappingError::Source(_)) => "MappingError::Source",
            InnerError::Mapping(MappingError::Decode(_)) => "MappingError::Decode",
            InnerError::Execution(ExecutionError::UnboundParameters(_)) => "ExecutionError::UnboundParameters",
            InnerError::Execution(ExecutionError::ShapeMismatch { .. }) => "ExecutionError::ShapeMismatch",
            InnerError::Execution(ExecutionError::Source(_)) => "ExecutionError::Source",
        };

        Some(Box::new(c))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let msg = match &self.cause {
            InnerError::Ast(AstError::UndefinedLabel(_, _)) => {
                Some("Every goto must target a label declared in the same tree.".to_string())
            }
            InnerError::Ast(AstError::Decode(_)) => {
                Some("The payload is not a valid expression tree. Check the encoder version.".to_string())
            }
            InnerError::Eval(EvalError::RecursionError(depth)) => Some(format!(
                "Expression nesting exceeds {depth}. Raise RQ_MAX_DEPTH or simplify the query."
            )),
            InnerError::Eval(EvalError::RemoteResource(ty)) => Some(format!(
                "The query over {ty} must be executed by the side that owns the source."
            )),
            InnerError::Eval(EvalError::UnhandledJump(_)) => {
                Some("A goto left the block that declares its label.".to_string())
            }
            InnerError::Eval(EvalError::ZeroDivision) => Some("Division by zero is not allowed.".to_string()),
            InnerError::Translate(TranslateError::NonSerializableConstant { .. }) => Some(
                "Live handles cannot cross the boundary. Run partial evaluation first or pass plain data.".to_string(),
            ),
            InnerError::Translate(TranslateError::Unresolved(err)) => Some(format!(
                "{err} is unknown in this process. Register it in the type registry."
            )),
            InnerError::Translate(TranslateError::UnknownSource(ty)) => {
                Some(format!("Register a queryable source for {ty} with the provider."))
            }
            InnerError::Mapping(MappingError::Cycle(_)) => {
                Some("Results must form a tree. Project the cyclic reference away before returning.".to_string())
            }
            InnerError::Execution(ExecutionError::UnboundParameters(_)) => {
                Some("Send a closed query or a parameterless lambda.".to_string())
            }
            InnerError::Execution(ExecutionError::ShapeMismatch { operator, .. }) => Some(format!(
                "\"{operator}\" needs exactly one element. Use the \"_or_default\" variant to allow none."
            )),
            _ => None,
        };

        msg.map(|m| Box::new(m) as Box<dyn std::fmt::Display>)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{ident::LabelId, types::TypeDescriptor};

    #[rstest]
    #[case::label(AstError::UndefinedLabel(LabelId(1), None).into(), "AstError::UndefinedLabel")]
    #[case::source(TranslateError::UnknownSource(TypeDescriptor::int()).into(), "TranslateError::UnknownSource")]
    #[case::cycle(MappingError::Cycle(TypeDescriptor::int()).into(), "MappingError::Cycle")]
    #[case::shape(
        ExecutionError::ShapeMismatch { operator: "single".into(), count: 2 }.into(),
        "ExecutionError::ShapeMismatch"
    )]
    fn test_code(#[case] cause: InnerError, #[case] expected: &str) {
        let error = Error::from(cause);
        assert_eq!(error.code().map(|c| c.to_string()), Some(expected.to_string()));
    }

    #[test]
    fn test_help_names_the_missing_source() {
        let error = Error::from(TranslateError::UnknownSource(TypeDescriptor::new("app", "Order")));
        let help = error.help().map(|h| h.to_string()).unwrap_or_default();
        assert!(help.contains("app.Order"), "{help}");
    }

    #[test]
    fn test_display_is_transparent() {
        let error = Error::from(EvalError::ZeroDivision);
        assert_eq!(error.to_string(), "Divided by 0");
    }
}
