//! Client-side query composition.
use crate::{
    Error, ast,
    eval::operators::QueryOperator,
    expr::{ExprRef, build},
    partial_eval::PartialEvaluator,
    registry::{MethodInfo, MethodRef, TypeRegistry},
    translate::to_remote,
    types::TypeDescriptor,
    value::{Queryable, Value},
};

/// Fluent builder over a remote resource. Each sequence operator wraps the
/// current expression in another operator call; the terminal operators
/// hand back the finished expression.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    element_type: TypeDescriptor,
    expression: ExprRef,
}

impl QueryBuilder {
    /// Root query over the source serving `element_type` on the remote side.
    pub fn resource(element_type: TypeDescriptor) -> Self {
        let expression = build::constant_typed(
            Value::Queryable(Queryable::Resource {
                element_type: element_type.clone(),
            }),
            TypeDescriptor::queryable(element_type.clone()),
        );
        Self {
            element_type,
            expression,
        }
    }

    /// Root query over an in-memory sequence. Runs entirely in this process.
    pub fn local(element_type: TypeDescriptor, items: Vec<Value>) -> Self {
        let expression = build::constant_typed(
            Value::Queryable(Queryable::local(element_type.clone(), items)),
            TypeDescriptor::queryable(element_type.clone()),
        );
        Self {
            element_type,
            expression,
        }
    }

    /// Continues composing on top of an existing query handle.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Queryable(Queryable::Query {
                element_type,
                expression,
            }) => Some(Self {
                element_type: element_type.clone(),
                expression: expression.clone(),
            }),
            Value::Queryable(queryable @ Queryable::Resource { .. }) => {
                Some(Self::resource(queryable.element_type()))
            }
            _ => None,
        }
    }

    pub fn element_type(&self) -> &TypeDescriptor {
        &self.element_type
    }

    pub fn expression(&self) -> &ExprRef {
        &self.expression
    }

    pub fn where_(self, predicate: ExprRef) -> Self {
        let element_type = self.element_type.clone();
        self.with_lambda(QueryOperator::Where, predicate, element_type)
    }

    /// `selector`'s return type becomes the new element type.
    pub fn select(self, selector: ExprRef) -> Self {
        let element_type = return_type(&selector);
        self.with_lambda(QueryOperator::Select, selector, element_type)
    }

    pub fn order_by(self, key: ExprRef) -> Self {
        let element_type = self.element_type.clone();
        self.with_lambda(QueryOperator::OrderBy, key, element_type)
    }

    pub fn order_by_descending(self, key: ExprRef) -> Self {
        let element_type = self.element_type.clone();
        self.with_lambda(QueryOperator::OrderByDescending, key, element_type)
    }

    pub fn take(self, count: i64) -> Self {
        self.with_count(QueryOperator::Take, count)
    }

    pub fn skip(self, count: i64) -> Self {
        self.with_count(QueryOperator::Skip, count)
    }

    pub fn distinct(self) -> Self {
        let element_type = self.element_type.clone();
        let expression = self.call(QueryOperator::Distinct, vec![], self.sequence_of(&element_type));
        Self {
            element_type,
            expression,
        }
    }

    pub fn count(&self) -> ExprRef {
        self.call(QueryOperator::Count, vec![], TypeDescriptor::int())
    }

    pub fn any(&self) -> ExprRef {
        self.call(QueryOperator::Any, vec![], TypeDescriptor::bool())
    }

    pub fn first(&self) -> ExprRef {
        self.call(QueryOperator::First, vec![], self.element_type.clone())
    }

    pub fn first_or_default(&self) -> ExprRef {
        self.call(QueryOperator::FirstOrDefault, vec![], self.element_type.clone())
    }

    pub fn single(&self) -> ExprRef {
        self.call(QueryOperator::Single, vec![], self.element_type.clone())
    }

    /// Sum of `selector` over the elements.
    pub fn sum(&self, selector: ExprRef) -> ExprRef {
        let ty = return_type(&selector);
        self.call(QueryOperator::Sum, vec![build::quote(selector)], ty)
    }

    pub fn to_list(&self) -> ExprRef {
        self.call(
            QueryOperator::ToList,
            vec![],
            TypeDescriptor::array_of(self.element_type.clone()),
        )
    }

    /// Re-entrant handle that can be captured by, and composed into, another
    /// query.
    pub fn into_value(self) -> Value {
        Value::Queryable(Queryable::Query {
            element_type: self.element_type,
            expression: self.expression,
        })
    }

    fn with_lambda(self, operator: QueryOperator, lambda: ExprRef, element_type: TypeDescriptor) -> Self {
        let ret = self.sequence_of(&element_type);
        let expression = self.call(operator, vec![build::quote(lambda)], ret);
        Self {
            element_type,
            expression,
        }
    }

    fn with_count(self, operator: QueryOperator, count: i64) -> Self {
        let ret = self.sequence_of(&self.element_type);
        let expression = self.call(operator, vec![build::constant(count)], ret);
        Self {
            element_type: self.element_type,
            expression,
        }
    }

    fn sequence_of(&self, element_type: &TypeDescriptor) -> TypeDescriptor {
        TypeDescriptor::queryable(element_type.clone())
    }

    fn call(&self, operator: QueryOperator, extra: Vec<ExprRef>, ret: TypeDescriptor) -> ExprRef {
        let method = operator_method(operator, &self.element_type, &extra, ret);
        let mut arguments = Vec::with_capacity(extra.len() + 1);
        arguments.push(self.expression.clone());
        arguments.extend(extra);
        build::call(None, method, arguments)
    }
}

fn operator_method(
    operator: QueryOperator,
    element_type: &TypeDescriptor,
    extra: &[ExprRef],
    ret: TypeDescriptor,
) -> MethodRef {
    let extra_types = extra.iter().map(|e| e.ty()).collect();
    MethodInfo::operator(operator, operator.descriptor(element_type, extra_types, ret)).shared()
}

fn return_type(lambda: &ExprRef) -> TypeDescriptor {
    lambda.ty().return_type().cloned().unwrap_or_else(TypeDescriptor::any)
}

/// Client pipeline: collapse what can be resolved here, then translate the
/// remainder for the wire.
pub fn prepare_remote(expr: &ExprRef, registry: &TypeRegistry) -> Result<ast::ExprRef, Error> {
    let evaluated = PartialEvaluator::new(registry).eval(expr)?;
    let ast = to_remote(&evaluated)?;
    tracing::debug!(kind = %ast.kind(), "Prepared query for remote execution");
    Ok(ast)
}
