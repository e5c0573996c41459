//! Binding and running received expression trees against local data sources.
pub mod async_context;
pub mod context;

use smol_str::SmolStr;
use thiserror::Error;

use crate::{
    CancellationToken, Error,
    ast,
    dynamic::DynamicValue,
    registry::TypeResolver,
    source::{AsyncQueryableProvider, QueryableProvider, SourceError},
    types::TypeDescriptor,
};

pub use async_context::{AsyncExecutionContext, ResultStream};
pub use context::ExecutionContext;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Root lambda declares {0} parameter(s) that nothing binds")]
    UnboundParameters(usize),
    #[error("\"{operator}\" expected exactly one element, got {count}")]
    ShapeMismatch { operator: SmolStr, count: usize },
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// How the root expression's result is packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    Scalar,
    Sequence,
    /// The root produces no value of its own.
    Void,
}

impl ResultShape {
    pub fn of(ty: &TypeDescriptor) -> Self {
        if ty.is_sequence() {
            ResultShape::Sequence
        } else if ty.is_unit() {
            ResultShape::Void
        } else {
            ResultShape::Scalar
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Completed { shape: ResultShape, value: DynamicValue },
    Cancelled,
}

impl ExecutionResult {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutionResult::Cancelled)
    }

    pub fn into_value(self) -> Option<DynamicValue> {
        match self {
            ExecutionResult::Completed { value, .. } => Some(value),
            ExecutionResult::Cancelled => None,
        }
    }
}

/// Executes `ast` with default options against synchronous sources.
pub fn execute<P, R>(
    ast: &ast::ExprRef,
    provider: &P,
    resolver: &R,
    token: &CancellationToken,
) -> Result<ExecutionResult, Error>
where
    P: QueryableProvider + ?Sized,
    R: TypeResolver + ?Sized,
{
    ExecutionContext::default().execute(ast, provider, resolver, token)
}

/// Executes `ast` with default options, draining streamed sources first.
pub async fn execute_async<P, R>(
    ast: &ast::ExprRef,
    provider: &P,
    resolver: &R,
    token: &CancellationToken,
) -> Result<ExecutionResult, Error>
where
    P: AsyncQueryableProvider + ?Sized,
    R: TypeResolver + ?Sized,
{
    AsyncExecutionContext::default()
        .execute(ast, provider, resolver, token)
        .await
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::queryable(TypeDescriptor::queryable(TypeDescriptor::int()), ResultShape::Sequence)]
    #[case::array(TypeDescriptor::array_of(TypeDescriptor::string()), ResultShape::Sequence)]
    #[case::unit(TypeDescriptor::unit(), ResultShape::Void)]
    #[case::int(TypeDescriptor::int(), ResultShape::Scalar)]
    #[case::record(TypeDescriptor::new("app", "Product"), ResultShape::Scalar)]
    fn test_result_shape(#[case] ty: TypeDescriptor, #[case] expected: ResultShape) {
        assert_eq!(ResultShape::of(&ty), expected);
    }

    #[test]
    fn test_into_value() {
        assert_eq!(ExecutionResult::Cancelled.into_value(), None);
        assert_eq!(
            ExecutionResult::Completed {
                shape: ResultShape::Scalar,
                value: DynamicValue::Int(1)
            }
            .into_value(),
            Some(DynamicValue::Int(1))
        );
    }
}
