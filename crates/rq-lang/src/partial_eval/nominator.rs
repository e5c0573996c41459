use std::convert::Infallible;

use rustc_hash::FxHashSet;

use crate::{
    Shared,
    expr::{
        Expr, ExprRef,
        visitor::{Visitor, walk_expr},
    },
    ops::UnaryOp,
    registry::TypeRegistry,
    value::Value,
};

/// Nodes chosen for collapsing, keyed by address. Only valid while the
/// nominated tree is alive.
pub(crate) type Candidates = FxHashSet<*const Expr>;

/// Built-in rule for what may run on this side of the boundary.
pub fn is_locally_evaluable(expr: &Expr, registry: &TypeRegistry) -> bool {
    match expr {
        Expr::Parameter(_)
        | Expr::Lambda(_)
        | Expr::Block(_)
        | Expr::Goto(_)
        | Expr::Label(_)
        | Expr::Throw(_)
        | Expr::Default { .. } => false,
        Expr::Unary(unary) => unary.op != UnaryOp::Quote,
        Expr::Constant(constant) => {
            !constant.value.carries_handle() && !registry.is_query_argument_type(&constant.ty)
        }
        Expr::MemberAccess(access) => {
            let member_type = &access.member.descriptor.member_type;
            let captured = access
                .target
                .as_ref()
                .is_some_and(|target| registry.is_closure_type(&target.ty()));
            !(captured && (member_type.is_queryable() || member_type.is_enumerable()))
        }
        Expr::MethodCall(call) => {
            let on_resource = call
                .arguments
                .first()
                .and_then(|arg| arg.as_constant())
                .is_some_and(|v| matches!(v, Value::Queryable(q) if q.is_remote()));
            !(call.method.markers.query_boundary || on_resource || call.method.descriptor.return_type.is_unit())
        }
        _ => true,
    }
}

pub(crate) fn nominate(expr: &ExprRef, predicate: &dyn Fn(&Expr) -> bool) -> Candidates {
    let mut nominator = Nominator {
        predicate,
        candidates: Candidates::default(),
        blocked: false,
    };
    let _ = nominator.visit(expr);
    nominator.candidates
}

struct Nominator<'p> {
    predicate: &'p dyn Fn(&Expr) -> bool,
    candidates: Candidates,
    /// Set once any node under the current one cannot be evaluated.
    blocked: bool,
}

impl Visitor for Nominator<'_> {
    type Error = Infallible;

    fn visit(&mut self, expr: &ExprRef) -> Result<ExprRef, Self::Error> {
        let outer = std::mem::replace(&mut self.blocked, false);

        walk_expr(self, expr)?;

        if !self.blocked {
            if (self.predicate)(expr) {
                self.candidates.insert(Shared::as_ptr(expr));
            } else {
                self.blocked = true;
            }
        }

        self.blocked |= outer;
        Ok(Shared::clone(expr))
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        expr::build,
        registry::{MemberInfo, TypeMarkers},
        types::{MemberDescriptor, TypeDescriptor},
        value::Queryable,
    };

    #[fixture]
    fn registry() -> TypeRegistry {
        TypeRegistry::default()
    }

    fn nominate_with(expr: &ExprRef, registry: &TypeRegistry) -> Candidates {
        nominate(expr, &|node| is_locally_evaluable(node, registry))
    }

    #[rstest]
    fn test_parameter_blocks_ancestors(registry: TypeRegistry) {
        let x = build::parameter("x", TypeDescriptor::int());
        let constant = build::constant(1);
        let sum = build::add(build::param(&x), Shared::clone(&constant));

        let candidates = nominate_with(&sum, &registry);
        assert!(candidates.contains(&Shared::as_ptr(&constant)));
        assert!(!candidates.contains(&Shared::as_ptr(&sum)));
    }

    #[rstest]
    fn test_candidate_subsumes_its_children(registry: TypeRegistry) {
        let left = build::constant(1);
        let sum = build::add(Shared::clone(&left), build::constant(2));

        let candidates = nominate_with(&sum, &registry);
        assert!(candidates.contains(&Shared::as_ptr(&sum)));
        assert!(candidates.contains(&Shared::as_ptr(&left)));
    }

    #[rstest]
    #[case::query_argument(build::constant(Value::query_argument(TypeDescriptor::int(), Value::Int(1))), false)]
    #[case::resource(build::constant(Value::Queryable(Queryable::Resource { element_type: TypeDescriptor::int() })), false)]
    #[case::cancellation(build::constant(Value::Cancellation(crate::CancellationToken::new())), false)]
    #[case::default(build::default(TypeDescriptor::int()), false)]
    #[case::throw(build::throw(build::constant("x")), false)]
    #[case::plain(build::constant("x"), true)]
    fn test_builtin_rule(registry: TypeRegistry, #[case] expr: ExprRef, #[case] evaluable: bool) {
        assert_eq!(is_locally_evaluable(&expr, &registry), evaluable);
    }

    #[rstest]
    fn test_queryable_captured_by_closure(registry: TypeRegistry) {
        let product = TypeDescriptor::new("app", "Product");
        let closure = TypeDescriptor::closure();
        let scope = Value::object(
            closure.clone(),
            vec![("products", Value::Queryable(Queryable::local(product.clone(), vec![])))],
        );
        let products = MemberInfo::field(MemberDescriptor::new(
            closure.clone(),
            "products",
            TypeDescriptor::queryable(product),
        ));
        let limit = MemberInfo::field(MemberDescriptor::new(closure.clone(), "limit", TypeDescriptor::int()));
        let target = build::constant_typed(scope, closure);

        assert!(!is_locally_evaluable(
            &build::member(Some(Shared::clone(&target)), products),
            &registry
        ));
        assert!(is_locally_evaluable(&build::member(Some(target), limit), &registry));
    }

    #[test]
    fn test_registered_marker_is_honoured() {
        let mut registry = TypeRegistry::default();
        let deferred = TypeDescriptor::new("app", "Deferred");
        registry.register_type(
            &deferred,
            TypeMarkers {
                query_argument: true,
                closure: false,
            },
        );
        let expr = build::constant_typed(Value::Int(1), deferred);
        assert!(!is_locally_evaluable(&expr, &registry));
    }
}
