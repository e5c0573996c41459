use std::convert::Infallible;

use futures::{StreamExt, stream::BoxStream};
use rustc_hash::FxHashMap;

use crate::{
    CancellationToken, Error, Shared,
    ast::{
        self, ConstantValue,
        node::ConstantExpr,
        visitor::Visitor,
    },
    config::Options,
    dynamic::DynamicValue,
    eval::Evaluator,
    registry::TypeResolver,
    source::{AsyncQueryableProvider, SourceError},
    translate::{TranslateError, from_remote},
    types::TypeDescriptor,
    value::{Queryable, Value},
};

use super::{ExecutionError, ExecutionResult, ResultShape, context::ExecutionContext};

/// Mapped elements of a result, in source order.
pub type ResultStream = BoxStream<'static, Result<DynamicValue, Error>>;

/// Runs received trees against streamed sources.
///
/// Every source the tree references is drained before evaluation starts.
/// Each request for the next element races the cancellation token, so a
/// cancel unwinds a pending source without waiting for it.
#[derive(Debug, Clone, Default)]
pub struct AsyncExecutionContext {
    inner: ExecutionContext,
}

impl AsyncExecutionContext {
    pub fn new(options: Options) -> Self {
        Self {
            inner: ExecutionContext::new(options),
        }
    }

    pub async fn execute<P, R>(
        &self,
        ast: &ast::ExprRef,
        provider: &P,
        resolver: &R,
        token: &CancellationToken,
    ) -> Result<ExecutionResult, Error>
    where
        P: AsyncQueryableProvider + ?Sized,
        R: TypeResolver + ?Sized,
    {
        match self.bind(ast, provider, resolver, token).await? {
            Some(expr) => self.inner.run(&expr, token),
            None => Ok(ExecutionResult::Cancelled),
        }
    }

    /// Like [`execute`](Self::execute), but hands out the mapped elements
    /// one at a time. A non-sequence result yields a single element.
    /// Returns `None` when cancelled before evaluation; the stream itself
    /// ends early once the token is cancelled.
    pub async fn execute_stream<P, R>(
        &self,
        ast: &ast::ExprRef,
        provider: &P,
        resolver: &R,
        token: &CancellationToken,
    ) -> Result<Option<ResultStream>, Error>
    where
        P: AsyncQueryableProvider + ?Sized,
        R: TypeResolver + ?Sized,
    {
        let Some(expr) = self.bind(ast, provider, resolver, token).await? else {
            return Ok(None);
        };

        let (shape, value) = self.inner.evaluate(&expr)?;
        let items = match (shape, value) {
            (ResultShape::Sequence, Value::Null) => Vec::new(),
            (ResultShape::Sequence, value) => Evaluator::new(self.inner.options().clone()).materialize(&value)?,
            (_, value) => vec![value],
        };

        let mapper = self.inner.mapper().clone();
        let token = token.clone();
        let stream = futures::stream::iter(items)
            .map(move |item| mapper.map(&item).map_err(Error::from))
            .take_until(async move { token.cancelled().await })
            .boxed();
        Ok(Some(stream))
    }

    /// Drains every referenced source and rebuilds the tree over the
    /// buffered elements. `None` means the token fired first.
    async fn bind<P, R>(
        &self,
        ast: &ast::ExprRef,
        provider: &P,
        resolver: &R,
        token: &CancellationToken,
    ) -> Result<Option<crate::expr::ExprRef>, Error>
    where
        P: AsyncQueryableProvider + ?Sized,
        R: TypeResolver + ?Sized,
    {
        if token.is_cancelled() {
            tracing::debug!("Execution cancelled before start");
            return Ok(None);
        }

        let mut drained: FxHashMap<TypeDescriptor, Shared<Vec<Value>>> = FxHashMap::default();
        for element_type in resource_types(ast) {
            let element_type = resolver
                .resolve_type(&element_type)
                .map_err(TranslateError::from)?;
            let source = provider
                .source(&element_type)
                .ok_or_else(|| TranslateError::UnknownSource(element_type.clone()))?;

            tracing::debug!(element_type = %element_type, "Draining source");
            match drain(source.stream(), token).await? {
                Some(items) => {
                    drained.insert(element_type, Shared::new(items));
                }
                None => {
                    tracing::debug!(element_type = %element_type, "Execution cancelled while draining");
                    return Ok(None);
                }
            }
        }

        let expr = from_remote(ast, resolver, |element_type| {
            drained
                .get(element_type)
                .map(|items| {
                    Value::Queryable(Queryable::Local {
                        element_type: element_type.clone(),
                        items: Shared::clone(items),
                    })
                })
                .ok_or_else(|| TranslateError::UnknownSource(element_type.clone()))
        })?;
        Ok(Some(expr))
    }
}

/// Pulls every element, giving up as soon as the token fires.
async fn drain(
    mut stream: BoxStream<'static, Result<Value, SourceError>>,
    token: &CancellationToken,
) -> Result<Option<Vec<Value>>, ExecutionError> {
    let mut items = Vec::new();
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(None),
            next = stream.next() => match next {
                Some(item) => items.push(item?),
                None => return Ok(Some(items)),
            },
        }
    }
}

/// Element types of every resource reference, in first-seen order.
fn resource_types(ast: &ast::ExprRef) -> Vec<TypeDescriptor> {
    let mut collector = ResourceCollector::default();
    let _ = collector.visit(ast);
    collector.types
}

#[derive(Default)]
struct ResourceCollector {
    types: Vec<TypeDescriptor>,
}

impl ResourceCollector {
    fn collect(&mut self, value: &ConstantValue) {
        match value {
            ConstantValue::QueryableResource { element_type } => {
                if !self.types.contains(element_type) {
                    self.types.push(element_type.clone());
                }
            }
            ConstantValue::Array(items) | ConstantValue::LocalSequence { items, .. } => {
                items.iter().for_each(|item| self.collect(item))
            }
            ConstantValue::Object { fields, .. } => fields.iter().for_each(|(_, v)| self.collect(v)),
            ConstantValue::QueryArgument { value, .. } => self.collect(value),
            _ => {}
        }
    }
}

impl Visitor for ResourceCollector {
    type Error = Infallible;

    fn visit_constant(&mut self, node: &ast::ExprRef, constant: &ConstantExpr) -> Result<ast::ExprRef, Self::Error> {
        self.collect(&constant.value);
        Ok(Shared::clone(node))
    }
}
