use crate::{
    Shared,
    eval::{Evaluator, error::EvalError},
    expr::{
        Expr, ExprRef, build,
        node::{LambdaExpr, UnaryExpr},
        visitor::{Visitor, walk_expr, walk_unary},
    },
    registry::MemberInfo,
    types::TypeDescriptor,
    value::{Queryable, Value},
};

use super::{PartialEvaluator, nominator::Candidates};

/// Replaces the outermost candidates, top-down, with the values they
/// evaluate to.
pub(crate) struct SubtreeEvaluator<'p, 'a> {
    partial: &'p PartialEvaluator<'a>,
    candidates: &'p Candidates,
}

impl<'p, 'a> SubtreeEvaluator<'p, 'a> {
    pub(crate) fn new(partial: &'p PartialEvaluator<'a>, candidates: &'p Candidates) -> Self {
        Self { partial, candidates }
    }

    pub(crate) fn rewrite(mut self, expr: &ExprRef) -> Result<ExprRef, EvalError> {
        self.visit(expr)
    }

    fn evaluate(&mut self, expr: &ExprRef) -> Result<ExprRef, EvalError> {
        match &**expr {
            Expr::Constant(_) => Ok(Shared::clone(expr)),
            // A nominated conversion is not replaced as a whole: the node
            // survives with its target type, and only a non-constant operand
            // is collapsed into a captured value.
            Expr::Unary(unary) if unary.op.is_conversion() => self.walk_conversion(expr, unary),
            _ => {
                let ty = expr.ty();
                let value = self.invoke(expr)?;
                tracing::trace!(kind = %expr.kind(), ty = %ty, "Collapsed sub-tree");
                self.substitute(value, ty)
            }
        }
    }

    /// Keeps `expr` itself when its operand is already a constant, otherwise
    /// rebuilds it around the collapsed operand.
    fn walk_conversion(&mut self, expr: &ExprRef, unary: &UnaryExpr) -> Result<ExprRef, EvalError> {
        match &*unary.operand {
            Expr::Constant(_) => Ok(Shared::clone(expr)),
            _ => walk_unary(self, expr, unary),
        }
    }

    /// Runs the sub-tree as a parameterless function.
    fn invoke(&self, expr: &ExprRef) -> Result<Value, EvalError> {
        let thunk = Shared::new(Expr::Lambda(LambdaExpr {
            ty: TypeDescriptor::function(Vec::new(), expr.ty()),
            parameters: Vec::new(),
            body: Shared::clone(expr),
        }));

        match Evaluator::new(self.partial.options().clone()).eval(&thunk)? {
            Value::Function(f) => f.invoke_dynamic(&[]).map_err(EvalError::unwrap_invocation),
            other => Err(EvalError::invalid_types("invoke", &[&other])),
        }
    }

    fn substitute(&mut self, value: Value, ty: TypeDescriptor) -> Result<ExprRef, EvalError> {
        match value {
            // A query handle rejoins the pipeline as its own expression.
            Value::Queryable(Queryable::Query { expression, .. }) => self.partial.eval(&expression),
            Value::Queryable(queryable @ Queryable::Resource { .. }) => {
                Ok(build::constant_typed(Value::Queryable(queryable), ty))
            }
            value => {
                let value = normalize_sequence(value, &ty);
                Ok(build::member(
                    Some(build::constant_typed(
                        Value::query_argument(ty.clone(), value),
                        TypeDescriptor::query_argument(ty.clone()),
                    )),
                    MemberInfo::query_argument_value(ty),
                ))
            }
        }
    }
}

/// Arrays and local queryables are interchangeable in memory; pick the
/// representation the static type asks for.
fn normalize_sequence(value: Value, ty: &TypeDescriptor) -> Value {
    let element_type = || ty.element_type().cloned().unwrap_or_else(TypeDescriptor::any);

    match value {
        Value::Queryable(Queryable::Local { items, .. }) if ty.is_array => Value::Array(items),
        Value::Array(items) if ty.is_queryable() || ty.is_enumerable() => Value::Queryable(Queryable::Local {
            element_type: element_type(),
            items,
        }),
        other => other,
    }
}

impl Visitor for SubtreeEvaluator<'_, '_> {
    type Error = EvalError;

    fn visit(&mut self, expr: &ExprRef) -> Result<ExprRef, Self::Error> {
        if self.candidates.contains(&Shared::as_ptr(expr)) {
            return self.evaluate(expr);
        }
        // A captured query handle is spliced in as its own, partially
        // evaluated, expression.
        if let Some(Value::Queryable(Queryable::Query { expression, .. })) = expr.as_constant() {
            return self.partial.eval(expression);
        }

        walk_expr(self, expr)
    }
}
