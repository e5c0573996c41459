//! Collapses the locally resolvable parts of a native expression into
//! captured literals, so only the remote intent is left to translate.
//!
//! Runs in two passes: [`nominator`] marks the sub-trees that are
//! self-contained and free of remote references, then [`subtree`] replaces
//! the outermost of them with query arguments.
pub mod nominator;
pub mod subtree;

use crate::{
    config::Options,
    eval::error::EvalError,
    expr::{Expr, ExprRef},
    registry::TypeRegistry,
};

pub use nominator::is_locally_evaluable;

/// Extra condition a node must meet, on top of [`is_locally_evaluable`],
/// to be collapsed.
pub type Predicate<'a> = dyn Fn(&Expr) -> bool + 'a;

pub struct PartialEvaluator<'a> {
    registry: &'a TypeRegistry,
    options: Options,
    predicate: Option<Box<Predicate<'a>>>,
}

impl<'a> PartialEvaluator<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self {
            registry,
            options: Options::default(),
            predicate: None,
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Narrows what may be collapsed. Nodes the built-in rules keep remote
    /// stay remote regardless of `predicate`.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Expr) -> bool + 'a,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }

    pub(crate) fn registry(&self) -> &TypeRegistry {
        self.registry
    }

    pub(crate) fn options(&self) -> &Options {
        &self.options
    }

    /// Returns `expr` itself when nothing could be collapsed. Any failure
    /// while evaluating a candidate aborts the whole rewrite.
    pub fn eval(&self, expr: &ExprRef) -> Result<ExprRef, EvalError> {
        let evaluable = |node: &Expr| {
            is_locally_evaluable(node, self.registry) && self.predicate.as_ref().is_none_or(|p| p(node))
        };
        let candidates = nominator::nominate(expr, &evaluable);

        tracing::debug!(candidates = candidates.len(), "Nominated locally evaluable sub-trees");

        subtree::SubtreeEvaluator::new(self, &candidates).rewrite(expr)
    }
}

/// Partial evaluation with the built-in rules only.
pub fn partial_eval(expr: &ExprRef, registry: &TypeRegistry) -> Result<ExprRef, EvalError> {
    PartialEvaluator::new(registry).eval(expr)
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        Shared,
        expr::build,
        eval::operators::QueryOperator,
        registry::{MethodInfo, TypeMarkers, TypeResolver},
        types::{MethodDescriptor, TypeDescriptor},
        value::{Queryable, Value},
    };

    #[fixture]
    fn registry() -> TypeRegistry {
        TypeRegistry::default()
    }

    fn query_argument(expr: &ExprRef) -> Option<Value> {
        match &**expr {
            Expr::MemberAccess(access) => match access.target.as_ref().and_then(|t| t.as_constant()) {
                Some(Value::QueryArgument(arg)) => Some(arg.value.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    #[rstest]
    fn test_collapses_closed_expression(registry: TypeRegistry) {
        let expr = build::mul(build::add(build::constant(2), build::constant(3)), build::constant(4));
        let collapsed = partial_eval(&expr, &registry).unwrap();
        assert_eq!(query_argument(&collapsed), Some(Value::Int(20)));
        assert_eq!(collapsed.ty(), TypeDescriptor::int());
    }

    #[rstest]
    fn test_lambda_body_collapses_around_parameter(registry: TypeRegistry) {
        let x = build::parameter("x", TypeDescriptor::int());
        let threshold = build::add(build::constant(1), build::constant(2));
        let expr = build::lambda(vec![x.clone()], build::gt(build::param(&x), threshold));

        let rewritten = partial_eval(&expr, &registry).unwrap();
        let Expr::Lambda(lambda) = &*rewritten else {
            panic!("expected lambda");
        };
        let Expr::Binary(body) = &*lambda.body else {
            panic!("expected binary");
        };
        assert!(matches!(&*body.left, Expr::Parameter(p) if p.id == x.id));
        assert_eq!(query_argument(&body.right), Some(Value::Int(3)));
    }

    #[rstest]
    fn test_untouched_tree_keeps_identity(registry: TypeRegistry) {
        let x = build::parameter("x", TypeDescriptor::bool());
        let expr = build::lambda(vec![x.clone()], build::not(build::param(&x)));
        let rewritten = partial_eval(&expr, &registry).unwrap();
        assert!(Shared::ptr_eq(&rewritten, &expr));
    }

    #[rstest]
    fn test_remote_resource_is_never_collapsed(registry: TypeRegistry) {
        let product = TypeDescriptor::new("app", "Product");
        let resource = build::constant(Value::Queryable(Queryable::Resource {
            element_type: product.clone(),
        }));
        let count = registry
            .resolve_method(&QueryOperator::Count.descriptor(&product, vec![], TypeDescriptor::int()))
            .unwrap();
        let expr = build::call(None, count, vec![resource]);
        let rewritten = partial_eval(&expr, &registry).unwrap();
        assert!(Shared::ptr_eq(&rewritten, &expr));
    }

    #[rstest]
    fn test_query_boundary_method_stays_remote(mut registry: TypeRegistry) {
        let helpers = TypeDescriptor::new("app", "Helpers");
        registry.register_type(&helpers, TypeMarkers::default());
        let now = registry.register_method(
            MethodInfo::native(
                MethodDescriptor::new(helpers, "now", vec![], TypeDescriptor::int()),
                |_, _| Ok(Value::Int(0)),
            )
            .query_boundary(),
        );
        let expr = build::add(build::call(None, now, vec![]), build::constant(1));
        let rewritten = partial_eval(&expr, &registry).unwrap();
        assert!(Shared::ptr_eq(&rewritten, &expr));
    }

    #[rstest]
    fn test_failure_propagates_unwrapped(registry: TypeRegistry) {
        let expr = build::binary(crate::BinaryOp::Divide, build::constant(1), build::constant(0));
        assert_eq!(partial_eval(&expr, &registry), Err(EvalError::ZeroDivision));
    }

    #[rstest]
    fn test_custom_predicate_narrows_candidates(registry: TypeRegistry) {
        let expr = build::add(build::constant(1), build::constant(2));
        let rewritten = PartialEvaluator::new(&registry)
            .with_predicate(|node| !matches!(node, Expr::Binary(_)))
            .eval(&expr)
            .unwrap();
        assert!(Shared::ptr_eq(&rewritten, &expr));
    }

    #[rstest]
    fn test_second_pass_changes_nothing(registry: TypeRegistry) {
        let x = build::parameter("x", TypeDescriptor::int());
        let expr = build::lambda(
            vec![x.clone()],
            build::and_also(
                build::gt(build::param(&x), build::convert(build::add(build::constant(1), build::constant(1)), TypeDescriptor::int())),
                build::lt(build::param(&x), build::mul(build::constant(5), build::constant(2))),
            ),
        );
        let once = partial_eval(&expr, &registry).unwrap();
        let twice = partial_eval(&once, &registry).unwrap();
        assert!(Shared::ptr_eq(&once, &twice));
    }
}
