use crate::{
    CancellationToken, Error, ast,
    config::Options,
    dynamic::mapper::DynamicMapper,
    eval::{Evaluator, error::EvalError},
    expr::{Expr, ExprRef},
    registry::TypeResolver,
    source::QueryableProvider,
    translate::{TranslateError, from_remote},
    types::TypeDescriptor,
    value::{Queryable, Value},
};

use super::{ExecutionError, ExecutionResult, ResultShape};

/// Runs received trees against sources that enumerate without suspending.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    options: Options,
    mapper: DynamicMapper,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl ExecutionContext {
    pub fn new(options: Options) -> Self {
        Self {
            mapper: DynamicMapper::new(&options),
            options,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn mapper(&self) -> &DynamicMapper {
        &self.mapper
    }

    pub fn execute<P, R>(
        &self,
        ast: &ast::ExprRef,
        provider: &P,
        resolver: &R,
        token: &CancellationToken,
    ) -> Result<ExecutionResult, Error>
    where
        P: QueryableProvider + ?Sized,
        R: TypeResolver + ?Sized,
    {
        if token.is_cancelled() {
            tracing::debug!("Execution cancelled before start");
            return Ok(ExecutionResult::Cancelled);
        }

        let expr = from_remote(ast, resolver, |element_type| bind_source(provider, element_type))?;
        self.run(&expr, token)
    }

    /// Evaluates a bound expression and maps its result.
    pub(crate) fn run(&self, expr: &ExprRef, token: &CancellationToken) -> Result<ExecutionResult, Error> {
        let (shape, value) = self.evaluate(expr)?;

        if token.is_cancelled() {
            tracing::debug!("Execution cancelled after evaluation");
            return Ok(ExecutionResult::Cancelled);
        }

        let value = self.mapper.map_result(&value, shape)?;
        Ok(ExecutionResult::Completed { shape, value })
    }

    pub(crate) fn evaluate(&self, expr: &ExprRef) -> Result<(ResultShape, Value), Error> {
        let shape = ResultShape::of(&result_type(expr));
        tracing::debug!(?shape, kind = %expr.kind(), "Executing expression");

        let mut evaluator = Evaluator::new(self.options.clone());
        let value = match &**expr {
            Expr::Lambda(lambda) if !lambda.parameters.is_empty() => {
                return Err(ExecutionError::UnboundParameters(lambda.parameters.len()).into());
            }
            Expr::Lambda(_) => match evaluator.eval(expr).map_err(shape_mismatch)? {
                Value::Function(f) => f
                    .invoke_dynamic(&[])
                    .map_err(EvalError::unwrap_invocation)
                    .map_err(shape_mismatch)?,
                other => return Err(EvalError::invalid_types("invoke", &[&other]).into()),
            },
            _ => evaluator.eval(expr).map_err(shape_mismatch)?,
        };

        Ok((shape, value))
    }
}

/// Static result type, looking through a parameterless root lambda.
fn result_type(expr: &ExprRef) -> TypeDescriptor {
    match &**expr {
        Expr::Lambda(lambda) => lambda.body.ty(),
        other => other.ty(),
    }
}

fn bind_source<P>(provider: &P, element_type: &TypeDescriptor) -> Result<Value, TranslateError>
where
    P: QueryableProvider + ?Sized,
{
    tracing::debug!(element_type = %element_type, "Looking up source");
    provider
        .source(element_type)
        .map(|source| Value::Queryable(Queryable::Source(source)))
        .ok_or_else(|| TranslateError::UnknownSource(element_type.clone()))
}

/// Separates cardinality failures from other evaluation failures.
pub(super) fn shape_mismatch(error: EvalError) -> Error {
    match error {
        EvalError::ShapeMismatch { operator, count } => ExecutionError::ShapeMismatch { operator, count }.into(),
        other => other.into(),
    }
}
