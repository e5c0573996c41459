use rustc_hash::FxHashMap;

use crate::{
    Shared,
    ast::{self, ConstantValue, validate_labels},
    expr::{self, node as native},
    ident::{LabelId, ParameterId},
    registry::{ConstructorRef, MemberRef, MethodRef, TypeResolver},
    types::{MemberDescriptor, TypeDescriptor},
    value::{Object, Queryable, Value},
};

use super::TranslateError;

/// Rebuilds an executable expression from a received tree.
///
/// `bind` is called once per queryable resource reference with its element
/// type and returns the value standing in for that source.
pub fn from_remote<R, B>(ast: &ast::ExprRef, resolver: &R, bind: B) -> Result<expr::ExprRef, TranslateError>
where
    R: TypeResolver + ?Sized,
    B: FnMut(&TypeDescriptor) -> Result<Value, TranslateError>,
{
    validate_labels(ast)?;

    let mut translator = FromRemote {
        resolver,
        bind,
        parameters: FxHashMap::default(),
        labels: FxHashMap::default(),
    };
    translator.expr(ast)
}

struct FromRemote<'r, R: ?Sized, B> {
    resolver: &'r R,
    bind: B,
    parameters: FxHashMap<ParameterId, expr::ParameterRef>,
    labels: FxHashMap<LabelId, expr::LabelRef>,
}

impl<R, B> FromRemote<'_, R, B>
where
    R: TypeResolver + ?Sized,
    B: FnMut(&TypeDescriptor) -> Result<Value, TranslateError>,
{
    fn expr(&mut self, node: &ast::ExprRef) -> Result<expr::ExprRef, TranslateError> {
        let translated = match &**node {
            ast::Expr::Constant(c) => native::Expr::Constant(native::ConstantExpr {
                value: self.value(&c.value)?,
                ty: self.ty(&c.ty)?,
            }),
            ast::Expr::Parameter(p) => native::Expr::Parameter(self.parameter(p)?),
            ast::Expr::Unary(u) => native::Expr::Unary(native::UnaryExpr {
                op: u.op,
                operand: self.expr(&u.operand)?,
                ty: self.ty(&u.ty)?,
                method: u.method.as_ref().map(|m| self.resolver.resolve_method(m)).transpose()?,
            }),
            ast::Expr::Binary(b) => native::Expr::Binary(native::BinaryExpr {
                op: b.op,
                left: self.expr(&b.left)?,
                right: self.expr(&b.right)?,
                lift_to_null: b.lift_to_null,
                method: b.method.as_ref().map(|m| self.resolver.resolve_method(m)).transpose()?,
                conversion: self.opt(b.conversion.as_ref())?,
            }),
            ast::Expr::MemberAccess(m) => native::Expr::MemberAccess(native::MemberAccessExpr {
                target: self.opt(m.target.as_ref())?,
                member: self.member(&m.member)?,
            }),
            ast::Expr::MethodCall(call) => native::Expr::MethodCall(native::MethodCallExpr {
                instance: self.opt(call.instance.as_ref())?,
                method: self.method(&call.method)?,
                arguments: self.list(&call.arguments)?,
            }),
            ast::Expr::Lambda(l) => native::Expr::Lambda(native::LambdaExpr {
                ty: self.ty(&l.ty)?,
                parameters: l
                    .parameters
                    .iter()
                    .map(|p| self.parameter(p))
                    .collect::<Result<_, _>>()?,
                body: self.expr(&l.body)?,
            }),
            ast::Expr::New(n) => native::Expr::New(self.new_expr(n)?),
            ast::Expr::NewArray(n) => native::Expr::NewArray(native::NewArrayExpr {
                kind: n.kind,
                element_type: self.ty(&n.element_type)?,
                expressions: self.list(&n.expressions)?,
            }),
            ast::Expr::MemberInit(m) => native::Expr::MemberInit(native::MemberInitExpr {
                new: Shared::new(self.new_expr(&m.new)?),
                bindings: m
                    .bindings
                    .iter()
                    .map(|b| self.binding(b))
                    .collect::<Result<_, _>>()?,
            }),
            ast::Expr::ListInit(l) => native::Expr::ListInit(native::ListInitExpr {
                new: Shared::new(self.new_expr(&l.new)?),
                initializers: l
                    .initializers
                    .iter()
                    .map(|i| self.element_init(i))
                    .collect::<Result<_, _>>()?,
            }),
            ast::Expr::TypeIs(t) => native::Expr::TypeIs(native::TypeIsExpr {
                operand: self.expr(&t.operand)?,
                ty: self.ty(&t.ty)?,
            }),
            ast::Expr::Conditional(c) => native::Expr::Conditional(native::ConditionalExpr {
                test: self.expr(&c.test)?,
                if_true: self.expr(&c.if_true)?,
                if_false: self.expr(&c.if_false)?,
                ty: self.ty(&c.ty)?,
            }),
            ast::Expr::Block(b) => native::Expr::Block(native::BlockExpr {
                ty: self.ty(&b.ty)?,
                variables: b
                    .variables
                    .iter()
                    .map(|v| self.parameter(v))
                    .collect::<Result<_, _>>()?,
                expressions: self.list(&b.expressions)?,
            }),
            ast::Expr::Goto(g) => native::Expr::Goto(native::GotoExpr {
                kind: g.kind,
                target: self.label(&g.target)?,
                value: self.opt(g.value.as_ref())?,
                ty: self.ty(&g.ty)?,
            }),
            ast::Expr::Label(l) => native::Expr::Label(native::LabelExpr {
                target: self.label(&l.target)?,
                default_value: self.opt(l.default_value.as_ref())?,
            }),
            ast::Expr::Default { ty } => native::Expr::Default { ty: self.ty(ty)? },
            ast::Expr::Throw(t) => native::Expr::Throw(native::ThrowExpr {
                operand: self.opt(t.operand.as_ref())?,
                ty: self.ty(&t.ty)?,
            }),
        };

        Ok(Shared::new(translated))
    }

    #[inline]
    fn opt(&mut self, node: Option<&ast::ExprRef>) -> Result<Option<expr::ExprRef>, TranslateError> {
        node.map(|n| self.expr(n)).transpose()
    }

    fn list(&mut self, nodes: &[ast::ExprRef]) -> Result<Vec<expr::ExprRef>, TranslateError> {
        nodes.iter().map(|n| self.expr(n)).collect()
    }

    #[inline]
    fn ty(&self, ty: &TypeDescriptor) -> Result<TypeDescriptor, TranslateError> {
        Ok(self.resolver.resolve_type(ty)?)
    }

    fn member(&self, member: &MemberDescriptor) -> Result<MemberRef, TranslateError> {
        Ok(self.resolver.resolve_member(member)?)
    }

    fn method(&self, method: &crate::types::MethodDescriptor) -> Result<MethodRef, TranslateError> {
        Ok(self.resolver.resolve_method(method)?)
    }

    fn parameter(&mut self, parameter: &ast::node::ParameterRef) -> Result<expr::ParameterRef, TranslateError> {
        if let Some(known) = self.parameters.get(&parameter.id) {
            return Ok(Shared::clone(known));
        }

        let translated = Shared::new(native::Parameter {
            id: parameter.id,
            name: parameter.name.clone(),
            ty: self.ty(&parameter.ty)?,
        });
        self.parameters.insert(parameter.id, Shared::clone(&translated));
        Ok(translated)
    }

    fn label(&mut self, target: &ast::node::LabelRef) -> Result<expr::LabelRef, TranslateError> {
        if let Some(known) = self.labels.get(&target.id) {
            return Ok(Shared::clone(known));
        }

        let translated = Shared::new(native::LabelTarget {
            id: target.id,
            name: target.name.clone(),
            ty: self.ty(&target.ty)?,
        });
        self.labels.insert(target.id, Shared::clone(&translated));
        Ok(translated)
    }

    fn constructor(&self, new: &ast::node::NewExpr) -> Result<ConstructorRef, TranslateError> {
        Ok(self
            .resolver
            .resolve_constructor(&new.constructor, new.members.as_deref())?)
    }

    fn new_expr(&mut self, new: &ast::node::NewExpr) -> Result<native::NewExpr, TranslateError> {
        Ok(native::NewExpr {
            constructor: self.constructor(new)?,
            arguments: self.list(&new.arguments)?,
            members: new
                .members
                .as_ref()
                .map(|members| members.iter().map(|m| self.member(m)).collect::<Result<_, _>>())
                .transpose()?,
        })
    }

    fn binding(&mut self, binding: &ast::node::MemberBinding) -> Result<native::BindingRef, TranslateError> {
        let translated = match binding {
            ast::node::MemberBinding::Assignment { member, expression } => native::MemberBinding::Assignment {
                member: self.member(member)?,
                expression: self.expr(expression)?,
            },
            ast::node::MemberBinding::MemberMember { member, bindings } => native::MemberBinding::MemberMember {
                member: self.member(member)?,
                bindings: bindings.iter().map(|b| self.binding(b)).collect::<Result<_, _>>()?,
            },
            ast::node::MemberBinding::List { member, initializers } => native::MemberBinding::List {
                member: self.member(member)?,
                initializers: initializers
                    .iter()
                    .map(|i| self.element_init(i))
                    .collect::<Result<_, _>>()?,
            },
        };
        Ok(Shared::new(translated))
    }

    fn element_init(&mut self, init: &ast::node::ElementInit) -> Result<native::ElementInitRef, TranslateError> {
        Ok(Shared::new(native::ElementInit {
            add_method: self.method(&init.add_method)?,
            arguments: self.list(&init.arguments)?,
        }))
    }

    fn value(&mut self, constant: &ConstantValue) -> Result<Value, TranslateError> {
        Ok(match constant {
            ConstantValue::Null => Value::Null,
            ConstantValue::Unit => Value::Unit,
            ConstantValue::Bool(b) => Value::Bool(*b),
            ConstantValue::Int(n) => Value::Int(*n),
            ConstantValue::Float(n) => Value::Float(*n),
            ConstantValue::String(s) => Value::String(s.clone()),
            ConstantValue::Array(items) => Value::array(self.values(items)?),
            ConstantValue::Object { ty, fields } => {
                let ty = self.ty(ty)?;
                let fields = fields
                    .iter()
                    .map(|(name, v)| self.value(v).map(|v| (name.clone(), v)))
                    .collect::<Result<_, _>>()?;
                Value::Object(Shared::new(Object::new(ty, fields)))
            }
            ConstantValue::QueryArgument { ty, value } => Value::query_argument(self.ty(ty)?, self.value(value)?),
            ConstantValue::QueryableResource { element_type } => {
                let element_type = self.ty(element_type)?;
                tracing::debug!(element_type = %element_type, "Binding queryable resource");
                (self.bind)(&element_type)?
            }
            ConstantValue::LocalSequence { element_type, items } => {
                Value::Queryable(Queryable::local(self.ty(element_type)?, self.values(items)?))
            }
            ConstantValue::Type(ty) => Value::Type(self.ty(ty)?),
        })
    }

    fn values(&mut self, items: &[ConstantValue]) -> Result<Vec<Value>, TranslateError> {
        items.iter().map(|v| self.value(v)).collect()
    }
}
