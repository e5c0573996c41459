pub mod env;
pub mod error;
pub mod operators;

use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::{
    Shared,
    config::Options,
    expr::node::*,
    ident::LabelId,
    ops::{BinaryOp, NewArrayKind, UnaryOp},
    registry::{MethodInfo, MethodKind},
    types::TypeDescriptor,
    value::{Function, Queryable, Value},
};

use env::Env;
use error::EvalError;

type Args = SmallVec<[Value; 4]>;

/// Tree-walking interpreter for native expressions.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    options: Options,
    depth: u32,
}

impl Evaluator {
    pub fn new(options: Options) -> Self {
        Self { options, depth: 0 }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Evaluates `expr` in an empty scope.
    pub fn eval(&mut self, expr: &ExprRef) -> Result<Value, EvalError> {
        self.eval_in(expr, &Env::root()).map_err(escaped_jump)
    }

    pub fn eval_in(&mut self, expr: &ExprRef, env: &Env) -> Result<Value, EvalError> {
        if self.depth >= self.options.max_depth {
            return Err(EvalError::RecursionError(self.options.max_depth));
        }

        self.depth += 1;
        let result = self.eval_expr(expr, env);
        self.depth -= 1;
        result
    }

    /// Elements of a sequence value, enumerating bound sources and
    /// evaluating query handles as needed.
    pub fn materialize(&mut self, value: &Value) -> Result<Vec<Value>, EvalError> {
        match value {
            Value::Array(items) => Ok(items.to_vec()),
            Value::Queryable(Queryable::Local { items, .. }) => Ok(items.to_vec()),
            Value::Queryable(Queryable::Source(source)) => Ok(source.enumerate()?),
            Value::Queryable(Queryable::Resource { element_type }) => {
                Err(EvalError::RemoteResource(element_type.clone()))
            }
            Value::Queryable(Queryable::Query { expression, .. }) => {
                let value = self.eval(expression)?;
                self.materialize(&value)
            }
            Value::QueryArgument(arg) => self.materialize(&arg.value),
            other => Err(EvalError::invalid_types("enumerate", &[other])),
        }
    }

    fn eval_expr(&mut self, expr: &ExprRef, env: &Env) -> Result<Value, EvalError> {
        match &**expr {
            Expr::Constant(c) => Ok(c.value.clone()),
            Expr::Parameter(p) => env.resolve(p.id),
            Expr::Unary(u) => self.eval_unary(u, env),
            Expr::Binary(b) => self.eval_binary(b, env),
            Expr::MemberAccess(m) => {
                let target = self.eval_opt(m.target.as_ref(), env)?;
                m.member.read(target.as_ref())
            }
            Expr::MethodCall(call) => {
                let instance = self.eval_opt(call.instance.as_ref(), env)?;
                let args = self.eval_args(&call.arguments, env)?;
                self.invoke(&call.method, instance.as_ref(), &args)
            }
            Expr::Lambda(lambda) => Ok(Value::Function(self.closure(lambda, env))),
            Expr::New(new) => self.eval_new(new, env),
            Expr::NewArray(array) => self.eval_new_array(array, env),
            Expr::MemberInit(init) => {
                let target = self.eval_new(&init.new, env)?;
                for binding in &init.bindings {
                    self.apply_binding(&target, binding, env)?;
                }
                Ok(target)
            }
            Expr::ListInit(init) => {
                let mut collection = self.eval_new(&init.new, env)?;
                for element in &init.initializers {
                    collection = self.add_element(collection, element, env)?;
                }
                Ok(collection)
            }
            Expr::TypeIs(type_is) => {
                let value = self.eval_in(&type_is.operand, env)?;
                Ok(Value::Bool(!value.is_null() && type_is.ty.is_assignable_from(&value.ty())))
            }
            Expr::Conditional(cond) => {
                if self.eval_bool(&cond.test, env)? {
                    self.eval_in(&cond.if_true, env)
                } else {
                    self.eval_in(&cond.if_false, env)
                }
            }
            Expr::Block(block) => self.eval_block(block, env),
            Expr::Goto(goto) => {
                let value = self.eval_opt(goto.value.as_ref(), env)?.unwrap_or(Value::Unit);
                Err(EvalError::Jump(goto.target.id, value))
            }
            Expr::Label(label) => Ok(self.eval_opt(label.default_value.as_ref(), env)?.unwrap_or(Value::Unit)),
            Expr::Default { ty } => Ok(default_value(ty)),
            Expr::Throw(throw) => {
                let value = self.eval_opt(throw.operand.as_ref(), env)?.unwrap_or_default();
                Err(EvalError::Thrown(value))
            }
        }
    }

    #[inline]
    fn eval_opt(&mut self, expr: Option<&ExprRef>, env: &Env) -> Result<Option<Value>, EvalError> {
        expr.map(|e| self.eval_in(e, env)).transpose()
    }

    fn eval_args(&mut self, args: &[ExprRef], env: &Env) -> Result<Args, EvalError> {
        args.iter().map(|a| self.eval_in(a, env)).collect()
    }

    fn eval_bool(&mut self, expr: &ExprRef, env: &Env) -> Result<bool, EvalError> {
        match self.eval_in(expr, env)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::invalid_types("test", &[&other])),
        }
    }

    pub(crate) fn invoke(
        &mut self,
        method: &MethodInfo,
        instance: Option<&Value>,
        args: &[Value],
    ) -> Result<Value, EvalError> {
        match &method.kind {
            MethodKind::Native(f) => f(instance, args),
            MethodKind::Operator(operator) => operators::apply(self, *operator, &method.descriptor, args),
        }
    }

    fn closure(&self, lambda: &LambdaExpr, env: &Env) -> Function {
        let parameters = lambda.parameters.clone();
        let body = Shared::clone(&lambda.body);
        let env = env.clone();
        let options = self.options.clone();
        let depth = self.depth;

        Function::new(lambda.ty.clone(), move |args| {
            if args.len() != parameters.len() {
                return Err(EvalError::InvalidNumberOfArguments(
                    "lambda".to_string(),
                    parameters.len(),
                    args.len(),
                ));
            }

            let scope = env.child();
            for (parameter, arg) in parameters.iter().zip(args) {
                scope.define(parameter.id, arg.clone());
            }

            let mut evaluator = Evaluator {
                options: options.clone(),
                depth,
            };
            match evaluator.eval_in(&body, &scope) {
                Err(EvalError::Jump(label, value)) if is_label(&body, label) => Ok(value),
                result => result.map_err(escaped_jump),
            }
        })
    }

    fn eval_unary(&mut self, unary: &UnaryExpr, env: &Env) -> Result<Value, EvalError> {
        // Quoted lambdas become closures over the current scope.
        if unary.op == UnaryOp::Quote {
            return self.eval_in(&unary.operand, env);
        }

        let operand = self.eval_in(&unary.operand, env)?;
        if let Some(method) = &unary.method {
            return self.invoke(method, None, &[operand]);
        }

        match (unary.op, operand) {
            (UnaryOp::TypeAs, value) => {
                if !value.is_null() && unary.ty.is_assignable_from(&value.ty()) {
                    Ok(value)
                } else {
                    Ok(Value::Null)
                }
            }
            (_, Value::Null) => Ok(Value::Null),
            (UnaryOp::Negate, Value::Int(n)) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| EvalError::Overflow(UnaryOp::Negate.to_string())),
            (UnaryOp::Negate, Value::Float(n)) => Ok(Value::Float(-n)),
            (UnaryOp::UnaryPlus, v @ (Value::Int(_) | Value::Float(_))) => Ok(v),
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnaryOp::Not, Value::Int(n)) => Ok(Value::Int(!n)),
            (UnaryOp::Convert, v) => convert(v, &unary.ty, false),
            (UnaryOp::ConvertChecked, v) => convert(v, &unary.ty, true),
            (UnaryOp::ArrayLength, Value::Array(items)) => Ok(Value::Int(items.len() as i64)),
            (op, v) => Err(EvalError::invalid_types(op.to_string(), &[&v])),
        }
    }

    fn eval_binary(&mut self, binary: &BinaryExpr, env: &Env) -> Result<Value, EvalError> {
        match binary.op {
            BinaryOp::AndAlso => {
                Ok(Value::Bool(self.eval_bool(&binary.left, env)? && self.eval_bool(&binary.right, env)?))
            }
            BinaryOp::OrElse => {
                Ok(Value::Bool(self.eval_bool(&binary.left, env)? || self.eval_bool(&binary.right, env)?))
            }
            BinaryOp::Coalesce => match self.eval_in(&binary.left, env)? {
                Value::Null => self.eval_in(&binary.right, env),
                left => match &binary.conversion {
                    Some(conversion) => match self.eval_in(conversion, env)? {
                        Value::Function(f) => f.call(&[left]),
                        other => Err(EvalError::invalid_types("??", &[&other])),
                    },
                    None => Ok(left),
                },
            },
            BinaryOp::Assign => {
                let value = self.eval_in(&binary.right, env)?;
                self.assign(&binary.left, value.clone(), env)?;
                Ok(value)
            }
            op => {
                let left = self.eval_in(&binary.left, env)?;
                let right = self.eval_in(&binary.right, env)?;
                match &binary.method {
                    Some(method) => self.invoke(method, None, &[left, right]),
                    None => apply_binary(op, left, right, binary.lift_to_null),
                }
            }
        }
    }

    fn assign(&mut self, target: &ExprRef, value: Value, env: &Env) -> Result<(), EvalError> {
        match &**target {
            Expr::Parameter(p) => env.assign(p.id, value),
            Expr::MemberAccess(MemberAccessExpr {
                target: Some(object),
                member,
            }) => {
                let object = self.eval_in(object, env)?;
                member.write(&object, value)
            }
            other => Err(EvalError::InvalidTypes {
                name: BinaryOp::Assign.to_string(),
                args: vec![other.kind().to_string().into()],
            }),
        }
    }

    fn eval_new(&mut self, new: &NewExpr, env: &Env) -> Result<Value, EvalError> {
        let args = self.eval_args(&new.arguments, env)?;
        new.constructor.construct(new.members.as_deref(), args.into_vec())
    }

    fn eval_new_array(&mut self, array: &NewArrayExpr, env: &Env) -> Result<Value, EvalError> {
        let values = self.eval_args(&array.expressions, env)?;
        match array.kind {
            NewArrayKind::Init => Ok(Value::array(values.into_vec())),
            NewArrayKind::Bounds => {
                let bounds = values
                    .iter()
                    .map(|v| match v {
                        Value::Int(n) if *n >= 0 => Ok(*n as usize),
                        Value::Int(n) => Err(EvalError::IndexOutOfBounds(*n)),
                        other => Err(EvalError::invalid_types("new_array", &[other])),
                    })
                    .collect::<Result<SmallVec<[usize; 2]>, _>>()?;
                Ok(sized_array(&bounds, &array.element_type))
            }
        }
    }

    fn apply_binding(&mut self, target: &Value, binding: &MemberBinding, env: &Env) -> Result<(), EvalError> {
        match binding {
            MemberBinding::Assignment { member, expression } => {
                let value = self.eval_in(expression, env)?;
                member.write(target, value)
            }
            MemberBinding::MemberMember { member, bindings } => {
                let nested = member.read(Some(target))?;
                bindings
                    .iter()
                    .try_for_each(|b| self.apply_binding(&nested, b, env))
            }
            MemberBinding::List { member, initializers } => {
                let mut collection = member.read(Some(target))?;
                for element in initializers {
                    collection = self.add_element(collection, element, env)?;
                }
                member.write(target, collection)
            }
        }
    }

    /// Add methods return the updated collection.
    fn add_element(&mut self, collection: Value, element: &ElementInit, env: &Env) -> Result<Value, EvalError> {
        let args = self.eval_args(&element.arguments, env)?;
        self.invoke(&element.add_method, Some(&collection), &args)
    }

    fn eval_block(&mut self, block: &BlockExpr, env: &Env) -> Result<Value, EvalError> {
        let scope = env.child();
        for variable in &block.variables {
            scope.define(variable.id, default_value(&variable.ty));
        }

        let mut result = Value::Unit;
        let mut pc = 0;
        while let Some(expr) = block.expressions.get(pc) {
            match self.eval_in(expr, &scope) {
                Ok(value) => {
                    result = value;
                    pc += 1;
                }
                Err(EvalError::Jump(label, value)) => match label_position(block, label) {
                    Some(position) => {
                        result = value;
                        pc = position + 1;
                    }
                    None => return Err(EvalError::Jump(label, value)),
                },
                Err(e) => return Err(e),
            }
        }

        Ok(result)
    }
}

/// Zero value of a type; reference-like types default to null.
pub fn default_value(ty: &TypeDescriptor) -> Value {
    if *ty == TypeDescriptor::bool() {
        Value::Bool(false)
    } else if *ty == TypeDescriptor::int() {
        Value::Int(0)
    } else if ty.is_float() {
        Value::Float(0.0)
    } else if ty.is_unit() {
        Value::Unit
    } else {
        Value::Null
    }
}

fn label_position(block: &BlockExpr, label: LabelId) -> Option<usize> {
    block.expressions.iter().position(|e| is_label(e, label))
}

fn is_label(expr: &ExprRef, label: LabelId) -> bool {
    matches!(&**expr, Expr::Label(l) if l.target.id == label)
}

fn escaped_jump(err: EvalError) -> EvalError {
    match err {
        EvalError::Jump(label, _) => EvalError::UnhandledJump(label),
        other => other,
    }
}

fn sized_array(bounds: &[usize], element_type: &TypeDescriptor) -> Value {
    match bounds.split_first() {
        Some((len, [])) => Value::array(vec![default_value(element_type); *len]),
        Some((len, rest)) => Value::array((0..*len).map(|_| sized_array(rest, element_type)).collect()),
        None => Value::array(Vec::new()),
    }
}

fn convert(value: Value, ty: &TypeDescriptor, checked: bool) -> Result<Value, EvalError> {
    match value {
        Value::Int(n) if ty.is_float() => Ok(Value::Float(n as f64)),
        Value::Float(n) if *ty == TypeDescriptor::int() => {
            if checked && (n.is_nan() || n < i64::MIN as f64 || n >= i64::MAX as f64) {
                Err(EvalError::Overflow(UnaryOp::ConvertChecked.to_string()))
            } else {
                Ok(Value::Int(n as i64))
            }
        }
        Value::QueryArgument(arg) if !ty.is_query_argument() => convert(arg.value.clone(), ty, checked),
        v => Ok(v),
    }
}

fn apply_binary(op: BinaryOp, left: Value, right: Value, lift_to_null: bool) -> Result<Value, EvalError> {
    if left.is_null() || right.is_null() {
        return Ok(match op {
            BinaryOp::Equal => Value::Bool(left == right),
            BinaryOp::NotEqual => Value::Bool(left != right),
            _ if lift_to_null || !op.is_comparison() => Value::Null,
            _ => Value::Bool(false),
        });
    }

    let invalid = |l: &Value, r: &Value| EvalError::invalid_types(op.to_string(), &[l, r]);
    let overflow = || EvalError::Overflow(op.to_string());

    match (op, &left, &right) {
        (BinaryOp::Equal, l, r) => Ok(Value::Bool(l == r)),
        (BinaryOp::NotEqual, l, r) => Ok(Value::Bool(l != r)),
        (BinaryOp::LessThan | BinaryOp::LessThanOrEqual | BinaryOp::GreaterThan | BinaryOp::GreaterThanOrEqual, l, r) => {
            let ord = l.compare(r).ok_or_else(|| invalid(l, r))?;
            Ok(Value::Bool(match op {
                BinaryOp::LessThan => ord == Ordering::Less,
                BinaryOp::LessThanOrEqual => ord != Ordering::Greater,
                BinaryOp::GreaterThan => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }
        (BinaryOp::Add, Value::String(_), _) | (BinaryOp::Add, _, Value::String(_)) => {
            Ok(Value::String(format!("{}{}", left, right)))
        }
        (BinaryOp::Add, Value::Int(a), Value::Int(b)) => a.checked_add(*b).map(Value::Int).ok_or_else(overflow),
        (BinaryOp::Subtract, Value::Int(a), Value::Int(b)) => a.checked_sub(*b).map(Value::Int).ok_or_else(overflow),
        (BinaryOp::Multiply, Value::Int(a), Value::Int(b)) => a.checked_mul(*b).map(Value::Int).ok_or_else(overflow),
        (BinaryOp::Divide | BinaryOp::Modulo, Value::Int(_), Value::Int(0)) => Err(EvalError::ZeroDivision),
        (BinaryOp::Divide, Value::Int(a), Value::Int(b)) => a.checked_div(*b).map(Value::Int).ok_or_else(overflow),
        (BinaryOp::Modulo, Value::Int(a), Value::Int(b)) => a.checked_rem(*b).map(Value::Int).ok_or_else(overflow),
        (BinaryOp::Power, Value::Int(a), Value::Int(b)) if *b >= 0 => u32::try_from(*b)
            .ok()
            .and_then(|b| a.checked_pow(b))
            .map(Value::Int)
            .ok_or_else(overflow),
        (
            BinaryOp::Add
            | BinaryOp::Subtract
            | BinaryOp::Multiply
            | BinaryOp::Divide
            | BinaryOp::Modulo
            | BinaryOp::Power,
            l,
            r,
        ) => {
            let (Some(a), Some(b)) = (l.as_float(), r.as_float()) else {
                return Err(invalid(l, r));
            };
            Ok(Value::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Subtract => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide => a / b,
                BinaryOp::Modulo => a % b,
                _ => a.powf(b),
            }))
        }
        (BinaryOp::And, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a & *b)),
        (BinaryOp::Or, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a | *b)),
        (BinaryOp::ExclusiveOr, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a ^ *b)),
        (BinaryOp::And, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a & b)),
        (BinaryOp::Or, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a | b)),
        (BinaryOp::ExclusiveOr, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a ^ b)),
        (BinaryOp::LeftShift, Value::Int(a), Value::Int(b)) => u32::try_from(*b)
            .ok()
            .and_then(|b| a.checked_shl(b))
            .map(Value::Int)
            .ok_or_else(overflow),
        (BinaryOp::RightShift, Value::Int(a), Value::Int(b)) => u32::try_from(*b)
            .ok()
            .and_then(|b| a.checked_shr(b))
            .map(Value::Int)
            .ok_or_else(overflow),
        (BinaryOp::ArrayIndex, Value::Array(items), Value::Int(i)) => usize::try_from(*i)
            .ok()
            .and_then(|i| items.get(i).cloned())
            .ok_or(EvalError::IndexOutOfBounds(*i)),
        (_, l, r) => Err(invalid(l, r)),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        expr::build,
        registry::{ConstructorInfo, MemberInfo, TypeRegistry},
        types::{MemberDescriptor, MethodDescriptor},
    };

    fn eval(expr: &ExprRef) -> Result<Value, EvalError> {
        Evaluator::default().eval(expr)
    }

    fn int(n: i64) -> ExprRef {
        build::constant(Value::Int(n))
    }

    #[rstest]
    #[case::add(build::add(int(2), int(3)), Value::Int(5))]
    #[case::mixed(build::binary(BinaryOp::Multiply, int(2), build::constant(Value::Float(1.5))), Value::Float(3.0))]
    #[case::concat(build::add(build::constant(Value::from("n=")), int(1)), Value::from("n=1"))]
    #[case::modulo(build::binary(BinaryOp::Modulo, int(7), int(3)), Value::Int(1))]
    #[case::power(build::binary(BinaryOp::Power, int(2), int(10)), Value::Int(1024))]
    #[case::shift(build::binary(BinaryOp::LeftShift, int(1), int(4)), Value::Int(16))]
    #[case::gt(build::gt(int(3), int(2)), Value::Bool(true))]
    #[case::eq_mixed(build::eq(int(2), build::constant(Value::Float(2.0))), Value::Bool(true))]
    #[case::not(build::not(build::constant(Value::Bool(true))), Value::Bool(false))]
    #[case::negate(build::negate(int(4)), Value::Int(-4))]
    #[case::null_eq(build::eq(build::constant(Value::Null), build::constant(Value::Null)), Value::Bool(true))]
    #[case::null_lt(build::binary(BinaryOp::LessThan, build::constant(Value::Null), int(1)), Value::Bool(false))]
    #[case::null_add(build::add(build::constant(Value::Null), int(1)), Value::Null)]
    #[case::coalesce(build::binary(BinaryOp::Coalesce, build::constant(Value::Null), int(9)), Value::Int(9))]
    #[case::index(build::binary(BinaryOp::ArrayIndex, build::new_array(TypeDescriptor::int(), vec![int(4), int(5)]), int(1)), Value::Int(5))]
    #[case::convert(build::convert(int(3), TypeDescriptor::float()), Value::Float(3.0))]
    #[case::conditional(build::conditional(build::constant(Value::Bool(false)), int(1), int(2)), Value::Int(2))]
    #[case::default(build::default(TypeDescriptor::int()), Value::Int(0))]
    #[case::type_is(build::type_is(int(1), TypeDescriptor::int()), Value::Bool(true))]
    fn test_eval(#[case] expr: ExprRef, #[case] expected: Value) {
        assert_eq!(eval(&expr), Ok(expected));
    }

    #[rstest]
    #[case::zero_division(build::binary(BinaryOp::Divide, int(1), int(0)), EvalError::ZeroDivision)]
    #[case::overflow(build::add(int(i64::MAX), int(1)), EvalError::Overflow("+".to_string()))]
    #[case::out_of_bounds(build::binary(BinaryOp::ArrayIndex, build::new_array(TypeDescriptor::int(), vec![]), int(0)), EvalError::IndexOutOfBounds(0))]
    #[case::throw(build::throw(build::constant(Value::from("boom"))), EvalError::Thrown(Value::from("boom")))]
    fn test_eval_error(#[case] expr: ExprRef, #[case] expected: EvalError) {
        assert_eq!(eval(&expr), Err(expected));
    }

    #[test]
    fn test_and_also_short_circuits() {
        let boom = build::throw(build::constant(Value::from("evaluated")));
        let expr = build::binary(BinaryOp::AndAlso, build::constant(Value::Bool(false)), boom);
        assert_eq!(eval(&expr), Ok(Value::Bool(false)));
    }

    #[test]
    fn test_lambda_invocation() {
        let x = build::parameter("x", TypeDescriptor::bool());
        let lambda = build::lambda(vec![x.clone()], build::not(build::param(&x)));
        let Ok(Value::Function(f)) = eval(&lambda) else {
            panic!("expected function");
        };
        assert_eq!(f.call(&[Value::Bool(true)]), Ok(Value::Bool(false)));
        assert!(matches!(f.call(&[]), Err(EvalError::InvalidNumberOfArguments(..))));
    }

    #[test]
    fn test_closure_captures_outer_parameter() {
        let x = build::parameter("x", TypeDescriptor::int());
        let y = build::parameter("y", TypeDescriptor::int());
        let inner = build::lambda(vec![y.clone()], build::add(build::param(&x), build::param(&y)));
        let outer = build::lambda(vec![x.clone()], inner);

        let Ok(Value::Function(outer)) = eval(&outer) else {
            panic!("expected function");
        };
        let Ok(Value::Function(inner)) = outer.call(&[Value::Int(10)]) else {
            panic!("expected function");
        };
        assert_eq!(inner.call(&[Value::Int(5)]), Ok(Value::Int(15)));
    }

    #[test]
    fn test_block_with_backward_jump_loops() {
        // i = 0; total = 0; top: total = total + i; i = i + 1; if i < 4 goto top; total
        let i = build::parameter("i", TypeDescriptor::int());
        let total = build::parameter("total", TypeDescriptor::int());
        let top = LabelTarget::new("top", TypeDescriptor::unit());
        let block = build::block(
            vec![i.clone(), total.clone()],
            vec![
                build::label(&top, None),
                build::assign(build::param(&total), build::add(build::param(&total), build::param(&i))),
                build::assign(build::param(&i), build::add(build::param(&i), int(1))),
                build::conditional(
                    build::binary(BinaryOp::LessThan, build::param(&i), int(4)),
                    build::goto(&top, None),
                    build::default(TypeDescriptor::unit()),
                ),
                build::param(&total),
            ],
        );
        assert_eq!(eval(&block), Ok(Value::Int(6)));
    }

    #[test]
    fn test_return_from_lambda() {
        let x = build::parameter("x", TypeDescriptor::int());
        let exit = LabelTarget::new("exit", TypeDescriptor::int());
        let body = build::block(
            vec![],
            vec![
                build::conditional(
                    build::gt(build::param(&x), int(0)),
                    build::goto(&exit, Some(build::param(&x))),
                    build::default(TypeDescriptor::unit()),
                ),
                build::label(&exit, Some(int(-1))),
            ],
        );
        let Ok(Value::Function(f)) = eval(&build::lambda(vec![x], body)) else {
            panic!("expected function");
        };
        assert_eq!(f.call(&[Value::Int(7)]), Ok(Value::Int(7)));
        assert_eq!(f.call(&[Value::Int(-3)]), Ok(Value::Int(-1)));
    }

    #[test]
    fn test_jump_without_enclosing_label() {
        let exit = LabelTarget::new("exit", TypeDescriptor::unit());
        assert_eq!(
            eval(&build::goto(&exit, None)),
            Err(EvalError::UnhandledJump(exit.id))
        );
    }

    #[test]
    fn test_member_init_and_list_init() {
        let registry = TypeRegistry::default();
        let point = TypeDescriptor::anonymous("Point");
        let x = MemberDescriptor::new(point.clone(), "x", TypeDescriptor::int());
        let tags = MemberDescriptor::new(point.clone(), "tags", TypeDescriptor::array_of(TypeDescriptor::any()));
        let members = [x.clone(), tags.clone()];
        let ctor = ConstructorInfo::anonymous(point.clone(), &members);
        let array = TypeDescriptor::array_of(TypeDescriptor::any());
        let add = registry.method(&array, "add", 1).unwrap();
        let empty = build::new_object(registry.constructor(&array, 0).unwrap(), vec![], None);

        let expr = build::member_init(
            ctor,
            vec![int(0), empty],
            vec![
                build::bind(MemberInfo::field(x), int(3)),
                build::bind_list(
                    MemberInfo::field(tags),
                    vec![build::element_init(add, vec![build::constant(Value::from("a"))])],
                ),
            ],
        );

        assert_eq!(
            eval(&expr),
            Ok(Value::object(
                point,
                vec![("x", Value::Int(3)), ("tags", Value::array(vec![Value::from("a")]))]
            ))
        );
    }

    #[test]
    fn test_native_method_call() {
        let registry = TypeRegistry::default();
        let contains = registry.method(&TypeDescriptor::string(), "contains", 1).unwrap();
        let expr = build::call(
            Some(build::constant(Value::from("remote linq"))),
            contains,
            vec![build::constant(Value::from("linq"))],
        );
        assert_eq!(eval(&expr), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_recursion_limit() {
        let mut expr = int(0);
        for _ in 0..20 {
            expr = build::negate(expr);
        }
        let mut evaluator = Evaluator::new(Options {
            max_depth: 8,
            ..Options::default()
        });
        assert_eq!(evaluator.eval(&expr), Err(EvalError::RecursionError(8)));
    }

    #[test]
    fn test_user_method_on_binary() {
        let descriptor = MethodDescriptor::new(
            TypeDescriptor::new("app", "Money"),
            "add",
            vec![TypeDescriptor::int(), TypeDescriptor::int()],
            TypeDescriptor::int(),
        );
        let method = MethodInfo::native(descriptor, |_, args| match args {
            [Value::Int(a), Value::Int(b)] => Ok(Value::Int(a * 100 + b)),
            _ => Err(EvalError::UserDefined("bad".to_string())),
        })
        .shared();
        let expr = build::binary_with_method(BinaryOp::Add, int(1), int(2), method);
        assert_eq!(eval(&expr), Ok(Value::Int(102)));
    }
}
