//! Rewriting traversal over native expressions. Same contract as
//! [`crate::ast::visitor`]: untouched sub-trees come back as the same node.
use crate::{
    Shared,
    rewrite::{define_visitor, is_owned, rewrite_list, rewrite_opt, same, same_opt},
};

use super::node::*;

define_visitor!();

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;
    use crate::{expr::build, types::TypeDescriptor, value::Value};

    struct Identity;

    impl Visitor for Identity {
        type Error = Infallible;
    }

    /// Fails on the first parameter reference it meets.
    struct RejectParameters;

    impl Visitor for RejectParameters {
        type Error = String;

        fn visit_parameter(&mut self, _node: &ExprRef, parameter: &ParameterRef) -> Result<ExprRef, Self::Error> {
            Err(format!("parameter {}", parameter.id))
        }
    }

    #[test]
    fn test_identity_on_lambda() {
        let x = build::parameter("x", TypeDescriptor::int());
        let expr = build::lambda(
            vec![x.clone()],
            build::add(build::param(&x), build::constant(Value::Int(1))),
        );
        assert!(Shared::ptr_eq(&Identity.visit(&expr).unwrap(), &expr));
    }

    #[test]
    fn test_error_short_circuits() {
        let x = build::parameter("x", TypeDescriptor::int());
        let expr = build::lambda(vec![x.clone()], build::negate(build::param(&x)));
        assert_eq!(
            RejectParameters.visit(&expr),
            Err(format!("parameter {}", x.id))
        );
    }
}
