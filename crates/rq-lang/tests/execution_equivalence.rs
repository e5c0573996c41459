//! The same query, run in-process over a local sequence and shipped to a
//! remote context over an equal data set, yields equal results.
use rq_lang::{
    CancellationToken, DynamicMapper, DynamicValue, Evaluator, ExecutionResult, InMemorySource, QueryBuilder,
    QueryableSource, Shared, TypeDescriptor, TypeRegistry, Value, execute,
    expr::{ExprRef, build},
    prepare_remote,
};
use rstest::{fixture, rstest};
use rustc_hash::FxHashMap;

fn product() -> TypeDescriptor {
    TypeDescriptor::new("app", "Product")
}

#[fixture]
fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::default();
    registry.register_record(
        &product(),
        vec![("name", TypeDescriptor::string()), ("price", TypeDescriptor::int())],
    );
    registry
}

#[fixture]
fn items() -> Vec<Value> {
    [("pen", 3), ("desk", 120), ("lamp", 45), ("chair", 80), ("mug", 8), ("desk", 120)]
        .into_iter()
        .map(|(name, price)| Value::object(product(), vec![("name", Value::from(name)), ("price", Value::Int(price))]))
        .collect()
}

fn price_above(threshold: i64) -> ExprRef {
    let p = build::parameter("p", product());
    build::lambda(
        vec![p.clone()],
        build::gt(build::field(&p, "price", TypeDescriptor::int()), build::constant(threshold)),
    )
}

fn price() -> ExprRef {
    let p = build::parameter("p", product());
    build::lambda(vec![p.clone()], build::field(&p, "price", TypeDescriptor::int()))
}

fn name() -> ExprRef {
    let p = build::parameter("p", product());
    build::lambda(vec![p.clone()], build::field(&p, "name", TypeDescriptor::string()))
}

type Compose = fn(QueryBuilder) -> ExprRef;

fn run_locally(query: &ExprRef) -> DynamicValue {
    let value = Evaluator::default().eval(query).unwrap();
    DynamicMapper::default().map(&value).unwrap()
}

fn run_remotely(query: &ExprRef, items: Vec<Value>, registry: &TypeRegistry) -> DynamicValue {
    let ast = prepare_remote(query, registry).unwrap();
    let mut sources: FxHashMap<TypeDescriptor, Shared<dyn QueryableSource>> = FxHashMap::default();
    sources.insert(product(), Shared::new(InMemorySource::new(product(), items)));

    match execute(&ast, &sources, registry, &CancellationToken::new()).unwrap() {
        ExecutionResult::Completed { value, .. } => value,
        ExecutionResult::Cancelled => panic!("unexpected cancellation"),
    }
}

fn filter_sort_project(q: QueryBuilder) -> ExprRef {
    q.where_(price_above(10)).order_by(price()).select(name()).to_list()
}

fn descending_page(q: QueryBuilder) -> ExprRef {
    q.order_by_descending(price()).skip(1).take(2).select(name()).to_list()
}

fn distinct_names(q: QueryBuilder) -> ExprRef {
    q.select(name()).distinct().to_list()
}

fn count_expensive(q: QueryBuilder) -> ExprRef {
    q.where_(price_above(50)).count()
}

fn any_luxury(q: QueryBuilder) -> ExprRef {
    q.where_(price_above(500)).any()
}

fn total_price(q: QueryBuilder) -> ExprRef {
    q.where_(price_above(10)).sum(price())
}

fn cheapest(q: QueryBuilder) -> ExprRef {
    q.order_by(price()).first()
}

#[rstest]
#[case::filter_sort_project(filter_sort_project)]
#[case::descending_page(descending_page)]
#[case::distinct_names(distinct_names)]
#[case::count(count_expensive)]
#[case::any(any_luxury)]
#[case::sum(total_price)]
#[case::first(cheapest)]
fn test_local_and_remote_agree(registry: TypeRegistry, items: Vec<Value>, #[case] compose: Compose) {
    let local = compose(QueryBuilder::local(product(), items.clone()));
    let remote = compose(QueryBuilder::resource(product()));

    assert_eq!(run_locally(&local), run_remotely(&remote, items, &registry));
}

#[rstest]
fn test_order_is_preserved(registry: TypeRegistry, items: Vec<Value>) {
    let remote = QueryBuilder::resource(product()).order_by(price()).select(name()).to_list();
    assert_eq!(
        run_remotely(&remote, items, &registry),
        DynamicValue::List(
            ["pen", "mug", "lamp", "chair", "desk", "desk"]
                .into_iter()
                .map(|n| DynamicValue::String(n.to_string()))
                .collect()
        )
    );
}
