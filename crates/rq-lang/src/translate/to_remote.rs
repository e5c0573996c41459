use rustc_hash::FxHashMap;

use crate::{
    Shared,
    ast::{self, ConstantValue},
    expr::{self, Expr},
    ident::{LabelId, ParameterId},
    types::TypeDescriptor,
    value::{Queryable, Value},
};

use super::TranslateError;

/// Translates a native expression into the serializable tree.
///
/// Query handles found in constants are replaced by the expression they
/// wrap. Every reference to one parameter or label shares one declaration.
pub fn to_remote(expr: &expr::ExprRef) -> Result<ast::ExprRef, TranslateError> {
    let translated = ToRemote::default().expr(expr)?;
    tracing::debug!(kind = %translated.kind(), "Translated expression for transport");
    Ok(translated)
}

#[derive(Default)]
struct ToRemote {
    parameters: FxHashMap<ParameterId, ast::node::ParameterRef>,
    labels: FxHashMap<LabelId, ast::node::LabelRef>,
}

impl ToRemote {
    fn expr(&mut self, expr: &expr::ExprRef) -> Result<ast::ExprRef, TranslateError> {
        let node = match &**expr {
            Expr::Constant(c) => match &c.value {
                Value::Queryable(Queryable::Query { expression, .. }) => return self.expr(expression),
                value => ast::Expr::Constant(ast::node::ConstantExpr {
                    value: to_constant(value, &c.ty)?,
                    ty: c.ty.clone(),
                }),
            },
            Expr::Parameter(p) => ast::Expr::Parameter(self.parameter(p)),
            Expr::Unary(u) => ast::Expr::Unary(ast::node::UnaryExpr {
                op: u.op,
                operand: self.expr(&u.operand)?,
                ty: u.ty.clone(),
                method: u.method.as_ref().map(|m| m.descriptor.clone()),
            }),
            Expr::Binary(b) => ast::Expr::Binary(ast::node::BinaryExpr {
                op: b.op,
                left: self.expr(&b.left)?,
                right: self.expr(&b.right)?,
                lift_to_null: b.lift_to_null,
                method: b.method.as_ref().map(|m| m.descriptor.clone()),
                conversion: self.opt(b.conversion.as_ref())?,
            }),
            Expr::MemberAccess(m) => ast::Expr::MemberAccess(ast::node::MemberAccessExpr {
                target: self.opt(m.target.as_ref())?,
                member: m.member.descriptor.clone(),
            }),
            Expr::MethodCall(call) => ast::Expr::MethodCall(ast::node::MethodCallExpr {
                instance: self.opt(call.instance.as_ref())?,
                method: call.method.descriptor.clone(),
                arguments: self.list(&call.arguments)?,
            }),
            Expr::Lambda(l) => ast::Expr::Lambda(ast::node::LambdaExpr {
                ty: l.ty.clone(),
                parameters: l.parameters.iter().map(|p| self.parameter(p)).collect(),
                body: self.expr(&l.body)?,
            }),
            Expr::New(n) => ast::Expr::New(self.new_expr(n)?),
            Expr::NewArray(n) => ast::Expr::NewArray(ast::node::NewArrayExpr {
                kind: n.kind,
                element_type: n.element_type.clone(),
                expressions: self.list(&n.expressions)?,
            }),
            Expr::MemberInit(m) => ast::Expr::MemberInit(ast::node::MemberInitExpr {
                new: Shared::new(self.new_expr(&m.new)?),
                bindings: m
                    .bindings
                    .iter()
                    .map(|b| self.binding(b))
                    .collect::<Result<_, _>>()?,
            }),
            Expr::ListInit(l) => ast::Expr::ListInit(ast::node::ListInitExpr {
                new: Shared::new(self.new_expr(&l.new)?),
                initializers: l
                    .initializers
                    .iter()
                    .map(|i| self.element_init(i))
                    .collect::<Result<_, _>>()?,
            }),
            Expr::TypeIs(t) => ast::Expr::TypeIs(ast::node::TypeIsExpr {
                operand: self.expr(&t.operand)?,
                ty: t.ty.clone(),
            }),
            Expr::Conditional(c) => ast::Expr::Conditional(ast::node::ConditionalExpr {
                test: self.expr(&c.test)?,
                if_true: self.expr(&c.if_true)?,
                if_false: self.expr(&c.if_false)?,
                ty: c.ty.clone(),
            }),
            Expr::Block(b) => ast::Expr::Block(ast::node::BlockExpr {
                ty: b.ty.clone(),
                variables: b.variables.iter().map(|v| self.parameter(v)).collect(),
                expressions: self.list(&b.expressions)?,
            }),
            Expr::Goto(g) => ast::Expr::Goto(ast::node::GotoExpr {
                kind: g.kind,
                target: self.label(&g.target),
                value: self.opt(g.value.as_ref())?,
                ty: g.ty.clone(),
            }),
            Expr::Label(l) => ast::Expr::Label(ast::node::LabelExpr {
                target: self.label(&l.target),
                default_value: self.opt(l.default_value.as_ref())?,
            }),
            Expr::Default { ty } => ast::Expr::Default { ty: ty.clone() },
            Expr::Throw(t) => ast::Expr::Throw(ast::node::ThrowExpr {
                operand: self.opt(t.operand.as_ref())?,
                ty: t.ty.clone(),
            }),
        };

        Ok(Shared::new(node))
    }

    #[inline]
    fn opt(&mut self, expr: Option<&expr::ExprRef>) -> Result<Option<ast::ExprRef>, TranslateError> {
        expr.map(|e| self.expr(e)).transpose()
    }

    fn list(&mut self, exprs: &[expr::ExprRef]) -> Result<Vec<ast::ExprRef>, TranslateError> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn parameter(&mut self, parameter: &expr::ParameterRef) -> ast::node::ParameterRef {
        Shared::clone(self.parameters.entry(parameter.id).or_insert_with(|| {
            Shared::new(ast::node::Parameter {
                id: parameter.id,
                name: parameter.name.clone(),
                ty: parameter.ty.clone(),
            })
        }))
    }

    fn label(&mut self, target: &expr::LabelRef) -> ast::node::LabelRef {
        Shared::clone(self.labels.entry(target.id).or_insert_with(|| {
            Shared::new(ast::node::LabelTarget {
                id: target.id,
                name: target.name.clone(),
                ty: target.ty.clone(),
            })
        }))
    }

    fn new_expr(&mut self, new: &expr::node::NewExpr) -> Result<ast::node::NewExpr, TranslateError> {
        Ok(ast::node::NewExpr {
            constructor: new.constructor.descriptor.clone(),
            arguments: self.list(&new.arguments)?,
            members: new
                .members
                .as_ref()
                .map(|members| members.iter().map(|m| m.descriptor.clone()).collect()),
        })
    }

    fn binding(&mut self, binding: &expr::node::MemberBinding) -> Result<ast::node::BindingRef, TranslateError> {
        let translated = match binding {
            expr::node::MemberBinding::Assignment { member, expression } => ast::node::MemberBinding::Assignment {
                member: member.descriptor.clone(),
                expression: self.expr(expression)?,
            },
            expr::node::MemberBinding::MemberMember { member, bindings } => ast::node::MemberBinding::MemberMember {
                member: member.descriptor.clone(),
                bindings: bindings.iter().map(|b| self.binding(b)).collect::<Result<_, _>>()?,
            },
            expr::node::MemberBinding::List { member, initializers } => ast::node::MemberBinding::List {
                member: member.descriptor.clone(),
                initializers: initializers
                    .iter()
                    .map(|i| self.element_init(i))
                    .collect::<Result<_, _>>()?,
            },
        };
        Ok(Shared::new(translated))
    }

    fn element_init(&mut self, init: &expr::node::ElementInit) -> Result<ast::node::ElementInitRef, TranslateError> {
        Ok(Shared::new(ast::node::ElementInit {
            add_method: init.add_method.descriptor.clone(),
            arguments: self.list(&init.arguments)?,
        }))
    }
}

fn to_constant(value: &Value, ty: &TypeDescriptor) -> Result<ConstantValue, TranslateError> {
    let rejected = |kind| TranslateError::NonSerializableConstant { kind, ty: ty.clone() };

    Ok(match value {
        Value::Null => ConstantValue::Null,
        Value::Unit => ConstantValue::Unit,
        Value::Bool(b) => ConstantValue::Bool(*b),
        Value::Int(n) => ConstantValue::Int(*n),
        Value::Float(n) => ConstantValue::Float(*n),
        Value::String(s) => ConstantValue::String(s.clone()),
        Value::Array(items) => ConstantValue::Array(
            items
                .iter()
                .map(|v| to_constant(v, &v.ty()))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(o) => ConstantValue::Object {
            ty: o.ty().clone(),
            fields: o
                .fields()
                .into_iter()
                .map(|(name, v)| to_constant(&v, &v.ty()).map(|c| (name, c)))
                .collect::<Result<_, _>>()?,
        },
        Value::QueryArgument(arg) => ConstantValue::QueryArgument {
            ty: arg.ty.clone(),
            value: Box::new(to_constant(&arg.value, &arg.ty)?),
        },
        Value::Queryable(Queryable::Resource { element_type }) => ConstantValue::QueryableResource {
            element_type: element_type.clone(),
        },
        Value::Queryable(Queryable::Local { element_type, items }) => ConstantValue::LocalSequence {
            element_type: element_type.clone(),
            items: items
                .iter()
                .map(|v| to_constant(v, element_type))
                .collect::<Result<_, _>>()?,
        },
        Value::Type(t) => ConstantValue::Type(t.clone()),
        Value::Queryable(Queryable::Query { .. }) => return Err(rejected("nested query")),
        Value::Queryable(Queryable::Source(_)) => return Err(rejected("bound source")),
        Value::Function(_) => return Err(rejected("function")),
        Value::Cancellation(_) => return Err(rejected("cancellation handle")),
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{CancellationToken, expr::build};

    #[test]
    fn test_parameter_declarations_are_shared() {
        let x = build::parameter("x", TypeDescriptor::int());
        let expr = build::lambda(vec![x.clone()], build::mul(build::param(&x), build::param(&x)));

        let ast::Expr::Lambda(lambda) = &*to_remote(&expr).unwrap() else {
            panic!("expected lambda");
        };
        let ast::Expr::Binary(body) = &*lambda.body else {
            panic!("expected binary");
        };
        let (ast::Expr::Parameter(left), ast::Expr::Parameter(right)) = (&*body.left, &*body.right) else {
            panic!("expected parameters");
        };
        assert!(Shared::ptr_eq(left, right));
        assert!(Shared::ptr_eq(left, &lambda.parameters[0]));
        assert_eq!(left.id, x.id);
    }

    #[test]
    fn test_query_handle_is_spliced() {
        let product = TypeDescriptor::new("app", "Product");
        let resource = build::constant(Value::Queryable(Queryable::Resource {
            element_type: product.clone(),
        }));
        let handle = build::constant(Value::Queryable(Queryable::Query {
            element_type: product.clone(),
            expression: resource,
        }));

        let ast::Expr::Constant(c) = &*to_remote(&handle).unwrap() else {
            panic!("expected constant");
        };
        assert_eq!(c.value, ConstantValue::QueryableResource { element_type: product });
    }

    #[rstest]
    #[case::function(Value::Function(crate::value::Function::new(TypeDescriptor::any(), |_| Ok(Value::Null))), "function")]
    #[case::cancellation(Value::Cancellation(CancellationToken::new()), "cancellation handle")]
    #[case::nested(
        Value::object(TypeDescriptor::closure(), vec![("token", Value::Cancellation(CancellationToken::new()))]),
        "cancellation handle"
    )]
    fn test_live_handles_are_rejected(#[case] value: Value, #[case] kind: &'static str) {
        let result = to_remote(&build::constant(value));
        assert!(matches!(result, Err(TranslateError::NonSerializableConstant { kind: k, .. }) if k == kind));
    }

    #[test]
    fn test_query_argument_constant() {
        let arg = Value::query_argument(TypeDescriptor::bool(), Value::Bool(true));
        let ast::Expr::Constant(c) = &*to_remote(&build::constant(arg)).unwrap() else {
            panic!("expected constant");
        };
        assert_eq!(
            c.value,
            ConstantValue::QueryArgument {
                ty: TypeDescriptor::bool(),
                value: Box::new(ConstantValue::Bool(true)),
            }
        );
    }
}
