use std::{
    cmp::Ordering,
    fmt::{self, Debug, Display, Formatter},
    sync::{PoisonError, RwLock},
};

use serde::Serialize;
use smol_str::SmolStr;

use crate::{
    Shared, cancellation::CancellationToken, eval::error::EvalError, expr::ExprRef, source::QueryableSource,
    types::TypeDescriptor,
};

pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync;

/// Live runtime value held by native expressions and produced by evaluation.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Shared<Vec<Value>>),
    Object(Shared<Object>),
    Queryable(Queryable),
    Function(Function),
    QueryArgument(Shared<QueryArgument>),
    Cancellation(CancellationToken),
    Type(TypeDescriptor),
}

/// Literal captured by partial evaluation in place of a collapsed sub-tree.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryArgument {
    pub ty: TypeDescriptor,
    pub value: Value,
}

/// Record with named fields. Fields are interior-mutable so member
/// initialisers can fill them in after construction.
pub struct Object {
    ty: TypeDescriptor,
    fields: RwLock<Vec<(SmolStr, Value)>>,
}

#[derive(Clone)]
pub enum Queryable {
    /// Root reference to a data source living on the other side of the boundary.
    Resource { element_type: TypeDescriptor },
    /// In-memory sequence exposed as a queryable.
    Local {
        element_type: TypeDescriptor,
        items: Shared<Vec<Value>>,
    },
    /// Re-entrant handle: a query composed on top of a resource.
    Query {
        element_type: TypeDescriptor,
        expression: ExprRef,
    },
    /// Source bound by the executing side.
    Source(Shared<dyn QueryableSource>),
}

#[derive(Clone)]
pub struct Function {
    ty: TypeDescriptor,
    call: Shared<NativeFn>,
}

impl Function {
    pub fn new<F>(ty: TypeDescriptor, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Self {
            ty,
            call: Shared::new(f),
        }
    }

    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }

    #[inline]
    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        (self.call)(args)
    }

    /// Late-bound invocation. Failures come back wrapped in
    /// [`EvalError::Invocation`].
    pub fn invoke_dynamic(&self, args: &[Value]) -> Result<Value, EvalError> {
        self.call(args).map_err(|e| EvalError::Invocation(Box::new(e)))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Shared::ptr_eq(&self.call, &other.call)
    }
}

impl Object {
    pub fn new(ty: TypeDescriptor, fields: Vec<(SmolStr, Value)>) -> Self {
        Self {
            ty,
            fields: RwLock::new(fields),
        }
    }

    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    pub fn set(&self, name: &str, value: Value) {
        let mut fields = self.fields.write().unwrap_or_else(PoisonError::into_inner);
        match fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => fields.push((SmolStr::new(name), value)),
        }
    }

    /// Snapshot of the fields in declaration order.
    pub fn fields(&self) -> Vec<(SmolStr, Value)> {
        self.fields.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.fields.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Queryable {
    pub fn local(element_type: TypeDescriptor, items: Vec<Value>) -> Self {
        Queryable::Local {
            element_type,
            items: Shared::new(items),
        }
    }

    pub fn element_type(&self) -> TypeDescriptor {
        match self {
            Queryable::Resource { element_type }
            | Queryable::Local { element_type, .. }
            | Queryable::Query { element_type, .. } => element_type.clone(),
            Queryable::Source(source) => source.element_type(),
        }
    }

    /// True when enumerating requires the remote side.
    pub fn is_remote(&self) -> bool {
        matches!(self, Queryable::Resource { .. } | Queryable::Query { .. })
    }
}

impl Value {
    pub fn object(ty: TypeDescriptor, fields: Vec<(&str, Value)>) -> Self {
        Value::Object(Shared::new(Object::new(
            ty,
            fields.into_iter().map(|(n, v)| (SmolStr::new(n), v)).collect(),
        )))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Shared::new(items))
    }

    pub fn query_argument(ty: TypeDescriptor, value: Value) -> Self {
        Value::QueryArgument(Shared::new(QueryArgument { ty, value }))
    }

    /// Builds a value from anything serde can serialize. Nested maps become
    /// anonymous objects; the top-level object takes `ty`.
    pub fn from_serializable<T: Serialize>(ty: TypeDescriptor, value: &T) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_value(value)?;
        Ok(match json {
            serde_json::Value::Object(map) => Value::Object(Shared::new(Object::new(
                ty,
                map.into_iter().map(|(k, v)| (SmolStr::new(k), Value::from(v))).collect(),
            ))),
            other => Value::from(other),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Queryable(_) => "queryable",
            Value::Function(_) => "function",
            Value::QueryArgument(_) => "query_argument",
            Value::Cancellation(_) => "cancellation",
            Value::Type(_) => "type",
        }
    }

    /// Runtime type of the value.
    pub fn ty(&self) -> TypeDescriptor {
        match self {
            Value::Null => TypeDescriptor::any(),
            Value::Unit => TypeDescriptor::unit(),
            Value::Bool(_) => TypeDescriptor::bool(),
            Value::Int(_) => TypeDescriptor::int(),
            Value::Float(_) => TypeDescriptor::float(),
            Value::String(_) => TypeDescriptor::string(),
            Value::Array(items) => TypeDescriptor::array_of(
                items
                    .first()
                    .map(|v| v.ty())
                    .unwrap_or_else(TypeDescriptor::any),
            ),
            Value::Object(o) => o.ty().clone(),
            Value::Queryable(q) => TypeDescriptor::queryable(q.element_type()),
            Value::Function(f) => f.ty().clone(),
            Value::QueryArgument(arg) => TypeDescriptor::query_argument(arg.ty.clone()),
            Value::Cancellation(_) => TypeDescriptor::cancellation(),
            Value::Type(_) => TypeDescriptor::type_handle(),
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Values that stand for something on the remote side, or that only
    /// make sense inside this process.
    pub fn is_handle(&self) -> bool {
        match self {
            Value::QueryArgument(_) | Value::Cancellation(_) => true,
            Value::Queryable(q) => q.is_remote(),
            _ => false,
        }
    }

    /// True when the value or one of its direct fields is a handle.
    pub fn carries_handle(&self) -> bool {
        match self {
            Value::Object(o) => o.fields().iter().any(|(_, v)| v.is_handle()),
            v => v.is_handle(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Ordering used by sorting operators and relational comparisons.
    /// Mixed int/float compare numerically; `null` sorts first.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_float()?.partial_cmp(&other.as_float()?)
            }
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        structurally_equal(self, other, &mut Vec::new())
    }
}

type ObjectPair = (*const Object, *const Object);

/// Deep equality. A pair of objects already under comparison further up
/// counts as equal, so cyclic graphs terminate.
fn structurally_equal(a: &Value, b: &Value, visiting: &mut Vec<ObjectPair>) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) | (Value::Unit, Value::Unit) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => Shared::ptr_eq(a, b) || sequences_equal(a, b, visiting),
        (Value::Object(a), Value::Object(b)) => Shared::ptr_eq(a, b) || objects_equal(a, b, visiting),
        (
            Value::Queryable(Queryable::Local {
                element_type: ta,
                items: a,
            }),
            Value::Queryable(Queryable::Local {
                element_type: tb,
                items: b,
            }),
        ) => ta == tb && (Shared::ptr_eq(a, b) || sequences_equal(a, b, visiting)),
        (Value::Queryable(a), Value::Queryable(b)) => a == b,
        (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
        (Value::QueryArgument(a), Value::QueryArgument(b)) => {
            a.ty == b.ty && structurally_equal(&a.value, &b.value, visiting)
        }
        (Value::Cancellation(a), Value::Cancellation(b)) => a.ptr_eq(b),
        (Value::Type(a), Value::Type(b)) => a == b,
        _ => false,
    }
}

fn sequences_equal(a: &[Value], b: &[Value], visiting: &mut Vec<ObjectPair>) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| structurally_equal(a, b, visiting))
}

fn objects_equal(a: &Object, b: &Object, visiting: &mut Vec<ObjectPair>) -> bool {
    let pair: ObjectPair = (std::ptr::from_ref(a), std::ptr::from_ref(b));
    if visiting.contains(&pair) {
        return true;
    }
    if a.ty != b.ty {
        return false;
    }

    let (fa, fb) = (a.fields(), b.fields());
    visiting.push(pair);
    let equal = fa.len() == fb.len()
        && fa
            .iter()
            .zip(&fb)
            .all(|((na, va), (nb, vb))| na == nb && structurally_equal(va, vb, visiting));
    visiting.pop();
    equal
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        objects_equal(self, other, &mut Vec::new())
    }
}

impl PartialEq for Queryable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Queryable::Resource { element_type: a }, Queryable::Resource { element_type: b }) => a == b,
            (
                Queryable::Local {
                    element_type: ta,
                    items: a,
                },
                Queryable::Local {
                    element_type: tb,
                    items: b,
                },
            ) => ta == tb && a == b,
            (Queryable::Query { expression: a, .. }, Queryable::Query { expression: b, .. }) => Shared::ptr_eq(a, b),
            (Queryable::Source(a), Queryable::Source(b)) => Shared::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Unit => write!(f, "Unit"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Float(n) => write!(f, "Float({})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(o) => Debug::fmt(o, f),
            Value::Queryable(q) => Debug::fmt(q, f),
            Value::Function(func) => write!(f, "Function({})", func.ty()),
            Value::QueryArgument(arg) => write!(f, "QueryArgument({}, {:?})", arg.ty, arg.value),
            Value::Cancellation(token) => Debug::fmt(token, f),
            Value::Type(ty) => write!(f, "Type({})", ty),
        }
    }
}

impl Debug for Object {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.ty.name.as_str());
        for (name, value) in self.fields() {
            s.field(name.as_str(), &value);
        }
        s.finish()
    }
}

impl Debug for Queryable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Queryable::Resource { element_type } => write!(f, "Resource({})", element_type),
            Queryable::Local { element_type, items } => write!(f, "Local({}, {} items)", element_type, items.len()),
            Queryable::Query { element_type, .. } => write!(f, "Query({})", element_type),
            Queryable::Source(source) => write!(f, "Source({})", source.element_type()),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(items) => {
                let items = items.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                write!(f, "[{}]", items)
            }
            Value::QueryArgument(arg) => Display::fmt(&arg.value, f),
            Value::Type(ty) => Display::fmt(ty, f),
            other => Debug::fmt(other, f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::array(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => Value::Object(Shared::new(Object::new(
                TypeDescriptor::anonymous("Object"),
                map.into_iter().map(|(k, v)| (SmolStr::new(k), Value::from(v))).collect(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[derive(Serialize)]
    struct Product {
        name: String,
        price: f64,
        stock: i64,
    }

    #[test]
    fn test_from_serializable_keeps_field_order_and_type() {
        let ty = TypeDescriptor::new("app", "Product");
        let value = Value::from_serializable(
            ty.clone(),
            &Product {
                name: "pen".into(),
                price: 1.5,
                stock: 3,
            },
        )
        .unwrap();

        let Value::Object(o) = &value else {
            panic!("expected object");
        };
        assert_eq!(o.ty(), &ty);
        assert_eq!(o.get("name"), Some(Value::from("pen")));
        assert_eq!(o.get("stock"), Some(Value::Int(3)));
        assert_eq!(o.get("missing"), None);
    }

    fn node(id: i64) -> Shared<Object> {
        Shared::new(Object::new(
            TypeDescriptor::new("app", "Node"),
            vec![("id".into(), Value::Int(id)), ("next".into(), Value::Null)],
        ))
    }

    /// `a -> b -> a` for two distinct allocations of the same shape.
    fn ring() -> Value {
        let (a, b) = (node(1), node(2));
        a.set("next", Value::Object(Shared::clone(&b)));
        b.set("next", Value::Object(Shared::clone(&a)));
        Value::Object(a)
    }

    #[test]
    fn test_cyclic_objects_compare_without_overflow() {
        assert_eq!(ring(), ring());

        let other = ring();
        let Value::Object(a) = &other else {
            panic!("expected object");
        };
        let Some(Value::Object(b)) = a.get("next") else {
            panic!("expected object");
        };
        b.set("id", Value::Int(3));
        assert_ne!(ring(), other);
    }

    #[test]
    fn test_object_set_overwrites_or_appends() {
        let o = Object::new(TypeDescriptor::anonymous("Point"), vec![("x".into(), Value::Int(1))]);
        o.set("x", Value::Int(2));
        o.set("y", Value::Int(3));
        assert_eq!(
            o.fields(),
            vec![("x".into(), Value::Int(2)), ("y".into(), Value::Int(3))]
        );
    }

    #[rstest]
    #[case::ints(Value::Int(1), Value::Int(2), Some(Ordering::Less))]
    #[case::mixed(Value::Float(2.5), Value::Int(2), Some(Ordering::Greater))]
    #[case::strings(Value::from("b"), Value::from("a"), Some(Ordering::Greater))]
    #[case::null_first(Value::Null, Value::Int(0), Some(Ordering::Less))]
    #[case::incomparable(Value::Bool(true), Value::Int(1), None)]
    fn test_compare(#[case] a: Value, #[case] b: Value, #[case] expected: Option<Ordering>) {
        assert_eq!(a.compare(&b), expected);
    }

    #[test]
    fn test_numeric_equality_across_kinds() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::from("2"));
    }

    #[rstest]
    #[case::resource(Value::Queryable(Queryable::Resource { element_type: TypeDescriptor::int() }), true)]
    #[case::local(Value::Queryable(Queryable::local(TypeDescriptor::int(), vec![])), false)]
    #[case::argument(Value::query_argument(TypeDescriptor::int(), Value::Int(1)), true)]
    #[case::cancellation(Value::Cancellation(CancellationToken::new()), true)]
    #[case::plain(Value::Int(1), false)]
    fn test_is_handle(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(value.is_handle(), expected);
    }

    #[test]
    fn test_closure_object_carries_handle() {
        let closure = Value::object(
            TypeDescriptor::closure(),
            vec![(
                "products",
                Value::Queryable(Queryable::Resource {
                    element_type: TypeDescriptor::new("app", "Product"),
                }),
            )],
        );
        assert!(closure.carries_handle());
    }
}
