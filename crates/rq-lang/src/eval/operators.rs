//! Built-in query operators over in-memory sequences.
use std::{
    cmp::Ordering,
    fmt::{self, Display, Formatter},
};

use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{
    types::{MethodDescriptor, QUERY_NAMESPACE, TypeDescriptor},
    value::{Function, Queryable, Value},
};

use super::{Evaluator, default_value, error::EvalError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryOperator {
    Where,
    Select,
    SelectMany,
    OrderBy,
    OrderByDescending,
    Take,
    Skip,
    Distinct,
    Count,
    Any,
    All,
    Contains,
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Sum,
    Min,
    Max,
    Average,
    ToList,
    AsQueryable,
}

impl QueryOperator {
    pub const ALL: &'static [QueryOperator] = &[
        QueryOperator::Where,
        QueryOperator::Select,
        QueryOperator::SelectMany,
        QueryOperator::OrderBy,
        QueryOperator::OrderByDescending,
        QueryOperator::Take,
        QueryOperator::Skip,
        QueryOperator::Distinct,
        QueryOperator::Count,
        QueryOperator::Any,
        QueryOperator::All,
        QueryOperator::Contains,
        QueryOperator::First,
        QueryOperator::FirstOrDefault,
        QueryOperator::Single,
        QueryOperator::SingleOrDefault,
        QueryOperator::Sum,
        QueryOperator::Min,
        QueryOperator::Max,
        QueryOperator::Average,
        QueryOperator::ToList,
        QueryOperator::AsQueryable,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            QueryOperator::Where => "where",
            QueryOperator::Select => "select",
            QueryOperator::SelectMany => "select_many",
            QueryOperator::OrderBy => "order_by",
            QueryOperator::OrderByDescending => "order_by_descending",
            QueryOperator::Take => "take",
            QueryOperator::Skip => "skip",
            QueryOperator::Distinct => "distinct",
            QueryOperator::Count => "count",
            QueryOperator::Any => "any",
            QueryOperator::All => "all",
            QueryOperator::Contains => "contains",
            QueryOperator::First => "first",
            QueryOperator::FirstOrDefault => "first_or_default",
            QueryOperator::Single => "single",
            QueryOperator::SingleOrDefault => "single_or_default",
            QueryOperator::Sum => "sum",
            QueryOperator::Min => "min",
            QueryOperator::Max => "max",
            QueryOperator::Average => "average",
            QueryOperator::ToList => "to_list",
            QueryOperator::AsQueryable => "as_queryable",
        }
    }

    /// Accepted argument counts, the source sequence included.
    pub fn arities(&self) -> &'static [usize] {
        match self {
            QueryOperator::Distinct | QueryOperator::ToList | QueryOperator::AsQueryable => &[1],
            QueryOperator::Count
            | QueryOperator::Any
            | QueryOperator::First
            | QueryOperator::FirstOrDefault
            | QueryOperator::Single
            | QueryOperator::SingleOrDefault
            | QueryOperator::Sum
            | QueryOperator::Min
            | QueryOperator::Max
            | QueryOperator::Average => &[1, 2],
            _ => &[2],
        }
    }

    pub fn declaring_type() -> TypeDescriptor {
        TypeDescriptor::new(QUERY_NAMESPACE, "Queryable")
    }

    /// Open definition registered in the type registry.
    pub fn definition(&self, arity: usize) -> MethodDescriptor {
        MethodDescriptor::new(
            Self::declaring_type(),
            self.name(),
            vec![TypeDescriptor::any(); arity],
            TypeDescriptor::any(),
        )
    }

    /// Instantiation over `element`, followed by the extra argument types.
    pub fn descriptor(
        &self,
        element: &TypeDescriptor,
        extra_parameters: Vec<TypeDescriptor>,
        return_type: TypeDescriptor,
    ) -> MethodDescriptor {
        let mut parameter_types = vec![TypeDescriptor::queryable(element.clone())];
        parameter_types.extend(extra_parameters);
        MethodDescriptor::new(Self::declaring_type(), self.name(), parameter_types, return_type)
            .with_generic_arguments(vec![element.clone()])
    }
}

impl Display for QueryOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub(crate) fn apply(
    evaluator: &mut Evaluator,
    operator: QueryOperator,
    descriptor: &MethodDescriptor,
    args: &[Value],
) -> Result<Value, EvalError> {
    let (source, rest) = match args.split_first() {
        Some((source, rest)) if operator.arities().contains(&args.len()) => (source, rest),
        _ => {
            return Err(EvalError::InvalidNumberOfArguments(
                operator.name().to_string(),
                operator.arities()[0],
                args.len(),
            ));
        }
    };
    let items = evaluator.materialize(source)?;
    let element_type = descriptor
        .return_type
        .element_type()
        .cloned()
        .unwrap_or_else(|| source.ty().element_type().cloned().unwrap_or_else(TypeDescriptor::any));
    let sequence = |items: Vec<Value>| Value::Queryable(Queryable::local(element_type.clone(), items));
    let name = operator.name();

    match operator {
        QueryOperator::Where => {
            let predicate = function(name, &rest[0])?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                if test(name, &predicate, &item)? {
                    out.push(item);
                }
            }
            Ok(sequence(out))
        }
        QueryOperator::Select => {
            let selector = function(name, &rest[0])?;
            items
                .iter()
                .map(|item| selector.call(std::slice::from_ref(item)))
                .collect::<Result<Vec<_>, _>>()
                .map(sequence)
        }
        QueryOperator::SelectMany => {
            let selector = function(name, &rest[0])?;
            let mut out = Vec::new();
            for item in &items {
                let inner = selector.call(std::slice::from_ref(item))?;
                out.extend(evaluator.materialize(&inner)?);
            }
            Ok(sequence(out))
        }
        QueryOperator::OrderBy | QueryOperator::OrderByDescending => {
            let selector = function(name, &rest[0])?;
            let mut keyed = items
                .into_iter()
                .map(|item| Ok((selector.call(std::slice::from_ref(&item))?, item)))
                .collect::<Result<Vec<_>, EvalError>>()?;
            check_sort_keys(name, keyed.iter().map(|(key, _)| key))?;
            keyed.sort_by(|(a, _), (b, _)| {
                let ord = a.compare(b).unwrap_or(Ordering::Equal);
                if operator == QueryOperator::OrderByDescending { ord.reverse() } else { ord }
            });
            Ok(sequence(keyed.into_iter().map(|(_, item)| item).collect()))
        }
        QueryOperator::Take => {
            let n = count_arg(name, &rest[0])?;
            Ok(sequence(items.into_iter().take(n).collect()))
        }
        QueryOperator::Skip => {
            let n = count_arg(name, &rest[0])?;
            Ok(sequence(items.into_iter().skip(n).collect()))
        }
        QueryOperator::Distinct => {
            let mut out: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !out.contains(&item) {
                    out.push(item);
                }
            }
            Ok(sequence(out))
        }
        QueryOperator::Count => {
            let items = filter(name, items, rest.first())?;
            Ok(Value::Int(items.len() as i64))
        }
        QueryOperator::Any => Ok(Value::Bool(!filter(name, items, rest.first())?.is_empty())),
        QueryOperator::All => {
            let predicate = function(name, &rest[0])?;
            for item in &items {
                if !test(name, &predicate, item)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        QueryOperator::Contains => Ok(Value::Bool(items.contains(&rest[0]))),
        QueryOperator::First | QueryOperator::FirstOrDefault => {
            let items = filter(name, items, rest.first())?;
            match items.into_iter().next() {
                Some(item) => Ok(item),
                None if operator == QueryOperator::FirstOrDefault => Ok(default_value(&descriptor.return_type)),
                None => Err(shape_mismatch(name, 0)),
            }
        }
        QueryOperator::Single | QueryOperator::SingleOrDefault => {
            let mut items = filter(name, items, rest.first())?;
            match items.len() {
                1 => Ok(items.swap_remove(0)),
                0 if operator == QueryOperator::SingleOrDefault => Ok(default_value(&descriptor.return_type)),
                count => Err(shape_mismatch(name, count)),
            }
        }
        QueryOperator::Sum => sum(name, &project(rest.first(), items)?),
        QueryOperator::Min | QueryOperator::Max => {
            let values = project(rest.first(), items)?;
            let mut iter = values.into_iter();
            let first = iter.next().ok_or_else(|| shape_mismatch(name, 0))?;
            iter.try_fold(first, |best, v| match v.compare(&best) {
                Some(Ordering::Less) if operator == QueryOperator::Min => Ok(v),
                Some(Ordering::Greater) if operator == QueryOperator::Max => Ok(v),
                Some(_) => Ok(best),
                None => Err(EvalError::invalid_types(name, &[&best, &v])),
            })
        }
        QueryOperator::Average => {
            let values = project(rest.first(), items)?;
            if values.is_empty() {
                return Err(shape_mismatch(name, 0));
            }
            let total = sum(name, &values)?
                .as_float()
                .ok_or_else(|| EvalError::invalid_types(name, &[&values[0]]))?;
            Ok(Value::Float(total / values.len() as f64))
        }
        QueryOperator::ToList => Ok(Value::array(items)),
        QueryOperator::AsQueryable => Ok(sequence(items)),
    }
}

fn function(name: &str, value: &Value) -> Result<Function, EvalError> {
    match value {
        Value::Function(f) => Ok(f.clone()),
        other => Err(EvalError::invalid_types(name, &[other])),
    }
}

fn test(name: &str, predicate: &Function, item: &Value) -> Result<bool, EvalError> {
    match predicate.call(std::slice::from_ref(item))? {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::invalid_types(name, &[&other])),
    }
}

fn filter(name: &str, items: Vec<Value>, predicate: Option<&Value>) -> Result<Vec<Value>, EvalError> {
    let Some(predicate) = predicate else {
        return Ok(items);
    };
    let predicate = function(name, predicate)?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if test(name, &predicate, &item)? {
            out.push(item);
        }
    }
    Ok(out)
}

fn project(selector: Option<&Value>, items: Vec<Value>) -> Result<SmallVec<[Value; 8]>, EvalError> {
    match selector {
        Some(selector) => {
            let selector = function("selector", selector)?;
            items
                .iter()
                .map(|item| selector.call(std::slice::from_ref(item)))
                .collect()
        }
        None => Ok(items.into_iter().collect()),
    }
}

fn sum(name: &str, values: &[Value]) -> Result<Value, EvalError> {
    values.iter().try_fold(Value::Int(0), |acc, v| match (&acc, v) {
        (_, Value::Null) => Ok(acc),
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(*b)
            .map(Value::Int)
            .ok_or_else(|| EvalError::Overflow(name.to_string())),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            Ok(Value::Float(acc.as_float().unwrap_or_default() + v.as_float().unwrap_or_default()))
        }
        _ => Err(EvalError::invalid_types(name, &[v])),
    })
}

fn count_arg(name: &str, value: &Value) -> Result<usize, EvalError> {
    match value {
        Value::Int(n) => Ok((*n).max(0) as usize),
        other => Err(EvalError::invalid_types(name, &[other])),
    }
}

fn shape_mismatch(name: &str, count: usize) -> EvalError {
    EvalError::ShapeMismatch {
        operator: SmolStr::new(name),
        count,
    }
}

/// Sorting needs a total order: every non-null key must compare with every
/// other, and NaN compares with nothing.
fn check_sort_keys<'a>(name: &str, keys: impl Iterator<Item = &'a Value>) -> Result<(), EvalError> {
    let mut first: Option<&Value> = None;
    for key in keys {
        if matches!(key, Value::Null) {
            continue;
        }
        if matches!(key, Value::Float(f) if f.is_nan()) || key.compare(key).is_none() {
            return Err(EvalError::invalid_types(name, &[key]));
        }
        match first {
            None => first = Some(key),
            Some(first) if first.compare(key).is_none() => {
                return Err(EvalError::invalid_types(name, &[first, key]));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn ints(items: &[i64]) -> Value {
        Value::array(items.iter().map(|n| Value::Int(*n)).collect())
    }

    fn call(operator: QueryOperator, args: &[Value], ret: TypeDescriptor) -> Result<Value, EvalError> {
        let descriptor = operator.descriptor(&TypeDescriptor::int(), Vec::new(), ret);
        apply(&mut Evaluator::default(), operator, &descriptor, args)
    }

    fn is_even() -> Value {
        Value::Function(Function::new(
            TypeDescriptor::function(vec![TypeDescriptor::int()], TypeDescriptor::bool()),
            |args| match args {
                [Value::Int(n)] => Ok(Value::Bool(n % 2 == 0)),
                _ => Err(EvalError::UserDefined("expected int".to_string())),
            },
        ))
    }

    fn negate() -> Value {
        Value::Function(Function::new(
            TypeDescriptor::function(vec![TypeDescriptor::int()], TypeDescriptor::int()),
            |args| match args {
                [Value::Int(n)] => Ok(Value::Int(-n)),
                _ => Err(EvalError::UserDefined("expected int".to_string())),
            },
        ))
    }

    fn items(value: Value) -> Vec<Value> {
        match value {
            Value::Queryable(Queryable::Local { items, .. }) => items.to_vec(),
            Value::Array(items) => items.to_vec(),
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_where() {
        let ret = TypeDescriptor::queryable(TypeDescriptor::int());
        let result = call(QueryOperator::Where, &[ints(&[1, 2, 3, 4]), is_even()], ret).unwrap();
        assert_eq!(items(result), vec![Value::Int(2), Value::Int(4)]);
    }

    fn identity() -> Value {
        Value::Function(Function::new(
            TypeDescriptor::function(vec![TypeDescriptor::any()], TypeDescriptor::any()),
            |args| Ok(args[0].clone()),
        ))
    }

    #[rstest]
    #[case::nulls_between_mixed_kinds(vec![
        Value::Null, Value::Int(40), Value::Null, Value::from("s39"), Value::Null, Value::Int(38),
        Value::Null, Value::from("s37"), Value::Null, Value::Int(36), Value::Null, Value::from("s35"),
        Value::Null, Value::Int(34), Value::Null, Value::from("s33"), Value::Null, Value::Int(32),
        Value::Null, Value::from("s31"), Value::Null, Value::Int(30), Value::Null, Value::from("s29"),
    ])]
    #[case::nan(vec![Value::Float(1.0), Value::Float(f64::NAN), Value::Int(0)])]
    #[case::objects(vec![ints(&[1]), ints(&[2])])]
    fn test_order_by_rejects_keys_without_total_order(#[case] keys: Vec<Value>) {
        let ret = TypeDescriptor::queryable(TypeDescriptor::any());
        for operator in [QueryOperator::OrderBy, QueryOperator::OrderByDescending] {
            let result = call(operator, &[Value::array(keys.clone()), identity()], ret.clone());
            assert!(matches!(result, Err(EvalError::InvalidTypes { .. })), "{:?}", result);
        }
    }

    #[test]
    fn test_order_by_sorts_nulls_first_among_numbers() {
        let ret = TypeDescriptor::queryable(TypeDescriptor::any());
        let keys = vec![Value::Float(2.5), Value::Null, Value::Int(1), Value::Null, Value::Int(3)];
        let result = call(QueryOperator::OrderBy, &[Value::array(keys), identity()], ret).unwrap();
        assert_eq!(
            items(result),
            vec![Value::Null, Value::Null, Value::Int(1), Value::Float(2.5), Value::Int(3)]
        );
    }

    #[test]
    fn test_order_by_is_stable() {
        let ret = TypeDescriptor::queryable(TypeDescriptor::int());
        let result = call(QueryOperator::OrderBy, &[ints(&[3, 1, 2]), negate()], ret.clone()).unwrap();
        assert_eq!(items(result), vec![Value::Int(3), Value::Int(2), Value::Int(1)]);

        let result = call(QueryOperator::OrderByDescending, &[ints(&[3, 1, 2]), negate()], ret).unwrap();
        assert_eq!(items(result), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[rstest]
    #[case::count(QueryOperator::Count, vec![ints(&[1, 2, 3])], Value::Int(3))]
    #[case::count_predicate(QueryOperator::Count, vec![ints(&[1, 2, 3]), is_even()], Value::Int(1))]
    #[case::any_empty(QueryOperator::Any, vec![ints(&[])], Value::Bool(false))]
    #[case::all(QueryOperator::All, vec![ints(&[2, 4]), is_even()], Value::Bool(true))]
    #[case::contains(QueryOperator::Contains, vec![ints(&[2, 4]), Value::Int(4)], Value::Bool(true))]
    #[case::sum(QueryOperator::Sum, vec![ints(&[1, 2, 3])], Value::Int(6))]
    #[case::min(QueryOperator::Min, vec![ints(&[3, 1, 2])], Value::Int(1))]
    #[case::max_selector(QueryOperator::Max, vec![ints(&[3, 1, 2]), negate()], Value::Int(-1))]
    #[case::average(QueryOperator::Average, vec![ints(&[1, 2])], Value::Float(1.5))]
    #[case::first(QueryOperator::First, vec![ints(&[5, 6])], Value::Int(5))]
    #[case::first_or_default(QueryOperator::FirstOrDefault, vec![ints(&[])], Value::Int(0))]
    #[case::single(QueryOperator::Single, vec![ints(&[1, 2, 3]), is_even()], Value::Int(2))]
    fn test_scalar_operators(#[case] operator: QueryOperator, #[case] args: Vec<Value>, #[case] expected: Value) {
        assert_eq!(call(operator, &args, TypeDescriptor::int()), Ok(expected));
    }

    #[rstest]
    #[case::first_empty(QueryOperator::First, ints(&[]), 0)]
    #[case::single_many(QueryOperator::Single, ints(&[1, 2]), 2)]
    #[case::single_empty(QueryOperator::Single, ints(&[]), 0)]
    fn test_shape_mismatch(#[case] operator: QueryOperator, #[case] source: Value, #[case] count: usize) {
        assert_eq!(
            call(operator, &[source], TypeDescriptor::int()),
            Err(EvalError::ShapeMismatch {
                operator: operator.name().into(),
                count,
            })
        );
    }

    #[test]
    fn test_distinct_take_skip() {
        let ret = TypeDescriptor::queryable(TypeDescriptor::int());
        let distinct = call(QueryOperator::Distinct, &[ints(&[1, 1, 2, 1, 3])], ret.clone()).unwrap();
        assert_eq!(items(distinct.clone()), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

        let skipped = call(QueryOperator::Skip, &[distinct, Value::Int(1)], ret.clone()).unwrap();
        let taken = call(QueryOperator::Take, &[skipped, Value::Int(1)], ret).unwrap();
        assert_eq!(items(taken), vec![Value::Int(2)]);
    }

    #[test]
    fn test_remote_resource_cannot_be_enumerated() {
        let resource = Value::Queryable(Queryable::Resource {
            element_type: TypeDescriptor::int(),
        });
        assert_eq!(
            call(QueryOperator::Count, &[resource], TypeDescriptor::int()),
            Err(EvalError::RemoteResource(TypeDescriptor::int()))
        );
    }

    #[test]
    fn test_wrong_arity() {
        assert!(matches!(
            call(QueryOperator::Where, &[ints(&[1])], TypeDescriptor::int()),
            Err(EvalError::InvalidNumberOfArguments(..))
        ));
    }
}
