//! Free functions composing native expressions. Result types are derived
//! from the operands the same way decoding derives them.
use crate::{
    Shared,
    ops::{BinaryOp, GotoKind, NewArrayKind, UnaryOp},
    registry::{ConstructorRef, MemberInfo, MemberRef, MethodRef},
    types::{MemberDescriptor, TypeDescriptor},
    value::Value,
};

use super::node::*;

pub fn constant(value: impl Into<Value>) -> ExprRef {
    let value = value.into();
    let ty = value.ty();
    constant_typed(value, ty)
}

/// Constant with an explicit static type, for nulls and handles whose
/// runtime type says too little.
pub fn constant_typed(value: Value, ty: TypeDescriptor) -> ExprRef {
    Shared::new(Expr::Constant(ConstantExpr { value, ty }))
}

pub fn parameter(name: &str, ty: TypeDescriptor) -> ParameterRef {
    Parameter::new(name, ty)
}

pub fn param(parameter: &ParameterRef) -> ExprRef {
    Shared::new(Expr::Parameter(Shared::clone(parameter)))
}

pub fn unary(op: UnaryOp, operand: ExprRef, ty: TypeDescriptor) -> ExprRef {
    Shared::new(Expr::Unary(UnaryExpr {
        op,
        operand,
        ty,
        method: None,
    }))
}

pub fn not(operand: ExprRef) -> ExprRef {
    let ty = operand.ty();
    unary(UnaryOp::Not, operand, ty)
}

pub fn negate(operand: ExprRef) -> ExprRef {
    let ty = operand.ty();
    unary(UnaryOp::Negate, operand, ty)
}

pub fn convert(operand: ExprRef, ty: TypeDescriptor) -> ExprRef {
    unary(UnaryOp::Convert, operand, ty)
}

pub fn type_as(operand: ExprRef, ty: TypeDescriptor) -> ExprRef {
    unary(UnaryOp::TypeAs, operand, ty)
}

/// Marks a lambda as data handed to a query operator.
pub fn quote(lambda: ExprRef) -> ExprRef {
    let ty = lambda.ty();
    unary(UnaryOp::Quote, lambda, ty)
}

pub fn binary(op: BinaryOp, left: ExprRef, right: ExprRef) -> ExprRef {
    Shared::new(Expr::Binary(BinaryExpr {
        op,
        left,
        right,
        lift_to_null: false,
        method: None,
        conversion: None,
    }))
}

pub fn binary_with_method(op: BinaryOp, left: ExprRef, right: ExprRef, method: MethodRef) -> ExprRef {
    Shared::new(Expr::Binary(BinaryExpr {
        op,
        left,
        right,
        lift_to_null: false,
        method: Some(method),
        conversion: None,
    }))
}

pub fn add(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryOp::Add, left, right)
}

pub fn sub(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryOp::Subtract, left, right)
}

pub fn mul(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryOp::Multiply, left, right)
}

pub fn gt(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryOp::GreaterThan, left, right)
}

pub fn lt(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryOp::LessThan, left, right)
}

pub fn eq(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryOp::Equal, left, right)
}

pub fn and_also(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryOp::AndAlso, left, right)
}

pub fn or_else(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryOp::OrElse, left, right)
}

pub fn coalesce(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryOp::Coalesce, left, right)
}

pub fn assign(target: ExprRef, value: ExprRef) -> ExprRef {
    binary(BinaryOp::Assign, target, value)
}

pub fn member(target: Option<ExprRef>, member: MemberRef) -> ExprRef {
    Shared::new(Expr::MemberAccess(MemberAccessExpr { target, member }))
}

/// Field read on an arbitrary target, declared on the target's static type.
pub fn property(target: ExprRef, name: &str, ty: TypeDescriptor) -> ExprRef {
    let descriptor = MemberDescriptor::new(target.ty(), name, ty);
    member(Some(target), MemberInfo::field(descriptor))
}

/// Field read on a parameter.
pub fn field(parameter: &ParameterRef, name: &str, ty: TypeDescriptor) -> ExprRef {
    property(param(parameter), name, ty)
}

pub fn call(instance: Option<ExprRef>, method: MethodRef, arguments: Vec<ExprRef>) -> ExprRef {
    Shared::new(Expr::MethodCall(MethodCallExpr {
        instance,
        method,
        arguments,
    }))
}

pub fn lambda(parameters: Vec<ParameterRef>, body: ExprRef) -> ExprRef {
    let ty = TypeDescriptor::function(parameters.iter().map(|p| p.ty.clone()).collect(), body.ty());
    Shared::new(Expr::Lambda(LambdaExpr { ty, parameters, body }))
}

pub fn conditional(test: ExprRef, if_true: ExprRef, if_false: ExprRef) -> ExprRef {
    let ty = if_true.ty();
    Shared::new(Expr::Conditional(ConditionalExpr {
        test,
        if_true,
        if_false,
        ty,
    }))
}

/// The block's type is that of its last expression.
pub fn block(variables: Vec<ParameterRef>, expressions: Vec<ExprRef>) -> ExprRef {
    let ty = expressions.last().map(|e| e.ty()).unwrap_or_else(TypeDescriptor::unit);
    Shared::new(Expr::Block(BlockExpr {
        ty,
        variables,
        expressions,
    }))
}

pub fn goto(target: &LabelRef, value: Option<ExprRef>) -> ExprRef {
    jump(GotoKind::Goto, target, value)
}

pub fn return_to(target: &LabelRef, value: Option<ExprRef>) -> ExprRef {
    jump(GotoKind::Return, target, value)
}

fn jump(kind: GotoKind, target: &LabelRef, value: Option<ExprRef>) -> ExprRef {
    Shared::new(Expr::Goto(GotoExpr {
        kind,
        target: Shared::clone(target),
        value,
        ty: TypeDescriptor::unit(),
    }))
}

pub fn label(target: &LabelRef, default_value: Option<ExprRef>) -> ExprRef {
    Shared::new(Expr::Label(LabelExpr {
        target: Shared::clone(target),
        default_value,
    }))
}

pub fn new_object(constructor: ConstructorRef, arguments: Vec<ExprRef>, members: Option<Vec<MemberRef>>) -> ExprRef {
    Shared::new(Expr::New(NewExpr {
        constructor,
        arguments,
        members,
    }))
}

pub fn new_array(element_type: TypeDescriptor, expressions: Vec<ExprRef>) -> ExprRef {
    Shared::new(Expr::NewArray(NewArrayExpr {
        kind: NewArrayKind::Init,
        element_type,
        expressions,
    }))
}

pub fn new_array_bounds(element_type: TypeDescriptor, bounds: Vec<ExprRef>) -> ExprRef {
    Shared::new(Expr::NewArray(NewArrayExpr {
        kind: NewArrayKind::Bounds,
        element_type,
        expressions: bounds,
    }))
}

pub fn member_init(constructor: ConstructorRef, arguments: Vec<ExprRef>, bindings: Vec<BindingRef>) -> ExprRef {
    Shared::new(Expr::MemberInit(MemberInitExpr {
        new: Shared::new(NewExpr {
            constructor,
            arguments,
            members: None,
        }),
        bindings,
    }))
}

pub fn list_init(
    constructor: ConstructorRef,
    arguments: Vec<ExprRef>,
    initializers: Vec<ElementInitRef>,
) -> ExprRef {
    Shared::new(Expr::ListInit(ListInitExpr {
        new: Shared::new(NewExpr {
            constructor,
            arguments,
            members: None,
        }),
        initializers,
    }))
}

pub fn bind(member: MemberRef, expression: ExprRef) -> BindingRef {
    Shared::new(MemberBinding::Assignment { member, expression })
}

pub fn bind_member(member: MemberRef, bindings: Vec<BindingRef>) -> BindingRef {
    Shared::new(MemberBinding::MemberMember { member, bindings })
}

pub fn bind_list(member: MemberRef, initializers: Vec<ElementInitRef>) -> BindingRef {
    Shared::new(MemberBinding::List { member, initializers })
}

pub fn element_init(add_method: MethodRef, arguments: Vec<ExprRef>) -> ElementInitRef {
    Shared::new(ElementInit { add_method, arguments })
}

pub fn type_is(operand: ExprRef, ty: TypeDescriptor) -> ExprRef {
    Shared::new(Expr::TypeIs(TypeIsExpr { operand, ty }))
}

pub fn default(ty: TypeDescriptor) -> ExprRef {
    Shared::new(Expr::Default { ty })
}

pub fn throw(operand: ExprRef) -> ExprRef {
    Shared::new(Expr::Throw(ThrowExpr {
        operand: Some(operand),
        ty: TypeDescriptor::unit(),
    }))
}
