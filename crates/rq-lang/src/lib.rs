//! `rq-lang` captures queries as transportable expression trees, collapses the
//! parts that can be resolved locally, and executes the remainder against data
//! sources bound on the receiving side.
//!
//! ## Examples
//!
//! ```rs
//! use rq_lang::{QueryBuilder, TypeDescriptor, TypeRegistry, expr::build};
//!
//! let product = TypeDescriptor::new("app", "Product");
//! let registry = TypeRegistry::default();
//!
//! // Client: compose against a remote resource and translate.
//! let p = build::parameter("p", product.clone());
//! let query = QueryBuilder::resource(product.clone())
//!     .where_(build::lambda(vec![p.clone()], build::gt(build::field(&p, "price", TypeDescriptor::float()), build::constant(10.0))));
//! let ast = rq_lang::prepare_remote(query.expression(), &registry)?;
//!
//! // Server: bind and execute.
//! let result = rq_lang::execute(&ast, &provider, &registry, &CancellationToken::new())?;
//! ```
mod cancellation;
pub mod config;
mod error;
mod ident;
mod ops;
mod rewrite;
mod source;

pub mod ast;
pub mod dynamic;
pub mod eval;
pub mod execution;
pub mod expr;
pub mod partial_eval;
pub mod query;
pub mod registry;
pub mod translate;
pub mod types;
pub mod value;

pub type Shared<T> = std::sync::Arc<T>;

pub use cancellation::CancellationToken;
pub use config::Options;
pub use dynamic::{DynamicObject, DynamicValue, MappingError, mapper::DynamicMapper};
pub use error::{Error, InnerError};
pub use eval::{Evaluator, error::EvalError};
pub use execution::{
    AsyncExecutionContext, ExecutionContext, ExecutionError, ExecutionResult, ResultShape, ResultStream, execute,
    execute_async,
};
pub use ident::{LabelId, ParameterId};
pub use ops::{BinaryOp, GotoKind, NewArrayKind, UnaryOp};
pub use partial_eval::{PartialEvaluator, partial_eval};
pub use query::{QueryBuilder, prepare_remote};
pub use registry::{TypeRegistry, TypeResolver};
pub use source::{
    AsyncQueryableProvider, AsyncQueryableSource, InMemorySource, QueryableProvider, QueryableSource, SourceError,
};
pub use translate::{TranslateError, from_remote, to_remote};
pub use types::{ConstructorDescriptor, MemberDescriptor, MethodDescriptor, TypeDescriptor};
pub use value::{Object, QueryArgument, Queryable, Value};
