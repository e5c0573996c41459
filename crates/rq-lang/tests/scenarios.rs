#![cfg(feature = "ast-json")]
//! End-to-end scenarios: compose on one side, ship as JSON, run on the other.
use std::time::Duration;

use futures::{StreamExt, stream::BoxStream};
use rq_lang::{
    AsyncQueryableSource, CancellationToken, DynamicMapper, DynamicObject, DynamicValue, Evaluator, ExecutionResult,
    InMemorySource, MethodDescriptor, QueryBuilder, QueryableSource, Shared, SourceError, TypeDescriptor, TypeRegistry,
    Value, ast,
    eval::operators::QueryOperator,
    expr::{ExprRef, build},
    from_remote, prepare_remote,
    registry::MethodInfo,
    translate::TranslateError,
};
use rustc_hash::FxHashMap;

fn ship(expr: &ExprRef, registry: &TypeRegistry) -> ast::ExprRef {
    let json = prepare_remote(expr, registry).unwrap().to_json().unwrap();
    ast::Expr::from_json(&json).unwrap()
}

fn unbound(ty: &TypeDescriptor) -> Result<Value, TranslateError> {
    Err(TranslateError::UnknownSource(ty.clone()))
}

fn call(lambda: &ExprRef, args: &[Value]) -> Value {
    match Evaluator::default().eval(lambda).unwrap() {
        Value::Function(f) => f.call(args).unwrap(),
        other => panic!("expected function, got {:?}", other),
    }
}

#[test]
fn test_negation_survives_the_wire() {
    let registry = TypeRegistry::default();
    let x = build::parameter("x", TypeDescriptor::bool());
    let negate = build::lambda(vec![x.clone()], build::not(build::param(&x)));

    assert_eq!(call(&negate, &[Value::Bool(true)]), Value::Bool(false));

    let received = from_remote(&ship(&negate, &registry), &registry, unbound).unwrap();
    assert_eq!(call(&received, &[Value::Bool(true)]), Value::Bool(false));
}

#[test]
fn test_local_helper_never_leaves_the_process() {
    let registry = TypeRegistry::default();
    let helpers = TypeDescriptor::new("app", "Helpers");
    let local_helper = MethodInfo::native(
        MethodDescriptor::new(
            helpers,
            "local_helper",
            vec![TypeDescriptor::string()],
            TypeDescriptor::string(),
        ),
        |_, args| match args {
            [Value::String(s)] => Ok(Value::String(format!("{s}-helper"))),
            _ => Ok(Value::Null),
        },
    )
    .shared();
    let len = registry.member(&TypeDescriptor::string(), "len").unwrap();

    let x = build::parameter("x", TypeDescriptor::int());
    let predicate = build::lambda(
        vec![x],
        build::gt(
            build::member(
                Some(build::call(None, local_helper, vec![build::constant("test")])),
                len,
            ),
            build::constant(10_i64),
        ),
    );

    let prepared = prepare_remote(&predicate, &registry).unwrap();
    let json = prepared.to_json().unwrap();
    assert!(!json.contains("local_helper"), "{json}");
    assert!(!json.contains("app.Helpers") && !json.contains("\"Helpers\""), "{json}");

    // The receiving registry knows nothing about the helper type.
    let received = from_remote(&ast::Expr::from_json(&json).unwrap(), &registry, unbound).unwrap();
    assert_eq!(call(&received, &[Value::Int(0)]), Value::Bool(true));
}

#[test]
fn test_captured_sub_query_ships_without_local_references() {
    let product = TypeDescriptor::new("app", "Product");
    let mut registry = TypeRegistry::default();
    registry.register_record(&product, vec![("name", TypeDescriptor::string())]);

    let favourite = MethodInfo::native(
        MethodDescriptor::new(TypeDescriptor::new("app", "Helpers"), "favourite", vec![], TypeDescriptor::string()),
        |_, _| Ok(Value::from("desk")),
    )
    .shared();

    // Composed elsewhere and handed over as a value.
    let p = build::parameter("p", product.clone());
    let favourites = QueryBuilder::resource(product.clone())
        .where_(build::lambda(
            vec![p.clone()],
            build::eq(
                build::field(&p, "name", TypeDescriptor::string()),
                build::call(None, favourite, vec![]),
            ),
        ))
        .into_value();

    let count = MethodInfo::operator(
        QueryOperator::Count,
        QueryOperator::Count.descriptor(&product, vec![], TypeDescriptor::int()),
    )
    .shared();
    let query = build::call(
        None,
        count,
        vec![build::constant_typed(favourites, TypeDescriptor::queryable(product.clone()))],
    );

    let json = prepare_remote(&query, &registry).unwrap().to_json().unwrap();
    assert!(!json.contains("favourite") && !json.contains("Helpers"), "{json}");

    let items = ["desk", "pen", "desk"]
        .into_iter()
        .map(|name| Value::object(product.clone(), vec![("name", Value::from(name))]))
        .collect();
    let mut sources: FxHashMap<TypeDescriptor, Shared<dyn QueryableSource>> = FxHashMap::default();
    sources.insert(product.clone(), Shared::new(InMemorySource::new(product, items)));

    let ast = ast::Expr::from_json(&json).unwrap();
    let result = rq_lang::execute(&ast, &sources, &registry, &CancellationToken::new()).unwrap();
    assert_eq!(result.into_value(), Some(DynamicValue::Int(2)));
}

#[test]
fn test_result_object_maps_to_named_leaves() {
    let summary = Value::object(
        TypeDescriptor::new("app", "Summary"),
        vec![("Name", Value::from("a")), ("Count", Value::Int(3))],
    );

    let mapped = DynamicMapper::default().with_type_information(false).map(&summary).unwrap();
    assert_eq!(
        mapped,
        DynamicValue::Object(
            DynamicObject::new(None)
                .with("Name", DynamicValue::String("a".to_string()))
                .with("Count", DynamicValue::Int(3))
        )
    );
}

struct NeverYields(TypeDescriptor);

impl AsyncQueryableSource for NeverYields {
    fn element_type(&self) -> TypeDescriptor {
        self.0.clone()
    }

    fn stream(&self) -> BoxStream<'static, Result<Value, SourceError>> {
        futures::stream::pending().boxed()
    }
}

#[tokio::test]
async fn test_cancel_before_first_element() {
    let product = TypeDescriptor::new("app", "Product");
    let mut registry = TypeRegistry::default();
    registry.register_record(&product, vec![("price", TypeDescriptor::int())]);

    let query = QueryBuilder::resource(product.clone()).to_list();
    let ast = ship(&query, &registry);

    let mut sources: FxHashMap<TypeDescriptor, Shared<dyn AsyncQueryableSource>> = FxHashMap::default();
    sources.insert(product.clone(), Shared::new(NeverYields(product)));

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        })
    };

    let result = rq_lang::execute_async(&ast, &sources, &registry, &token).await.unwrap();
    canceller.await.unwrap();
    assert_eq!(result, ExecutionResult::Cancelled);
}
