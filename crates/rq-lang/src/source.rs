//! Data sources the executing side binds remote resource references to.
use futures::{StreamExt, stream::BoxStream};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::{Shared, types::TypeDescriptor, value::Value};

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Source for {element_type} failed: {message}")]
pub struct SourceError {
    pub element_type: TypeDescriptor,
    pub message: String,
}

impl SourceError {
    pub fn new(element_type: TypeDescriptor, message: impl Into<String>) -> Self {
        Self {
            element_type,
            message: message.into(),
        }
    }
}

/// Immediately enumerable source.
pub trait QueryableSource: Send + Sync {
    fn element_type(&self) -> TypeDescriptor;

    fn enumerate(&self) -> Result<Vec<Value>, SourceError>;
}

/// Source producing its elements through a suspending stream.
pub trait AsyncQueryableSource: Send + Sync {
    fn element_type(&self) -> TypeDescriptor;

    fn stream(&self) -> BoxStream<'static, Result<Value, SourceError>>;
}

/// Maps an element type to the source serving it. `None` means the type is
/// not served here.
pub trait QueryableProvider {
    fn source(&self, element_type: &TypeDescriptor) -> Option<Shared<dyn QueryableSource>>;
}

pub trait AsyncQueryableProvider {
    fn source(&self, element_type: &TypeDescriptor) -> Option<Shared<dyn AsyncQueryableSource>>;
}

impl<F> QueryableProvider for F
where
    F: Fn(&TypeDescriptor) -> Option<Shared<dyn QueryableSource>>,
{
    fn source(&self, element_type: &TypeDescriptor) -> Option<Shared<dyn QueryableSource>> {
        self(element_type)
    }
}

impl QueryableProvider for FxHashMap<TypeDescriptor, Shared<dyn QueryableSource>> {
    fn source(&self, element_type: &TypeDescriptor) -> Option<Shared<dyn QueryableSource>> {
        self.get(element_type).cloned()
    }
}

impl AsyncQueryableProvider for FxHashMap<TypeDescriptor, Shared<dyn AsyncQueryableSource>> {
    fn source(&self, element_type: &TypeDescriptor) -> Option<Shared<dyn AsyncQueryableSource>> {
        self.get(element_type).cloned()
    }
}

/// Fixed list of values served both synchronously and as a stream.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    element_type: TypeDescriptor,
    items: Shared<Vec<Value>>,
}

impl InMemorySource {
    pub fn new(element_type: TypeDescriptor, items: Vec<Value>) -> Self {
        Self {
            element_type,
            items: Shared::new(items),
        }
    }
}

impl QueryableSource for InMemorySource {
    fn element_type(&self) -> TypeDescriptor {
        self.element_type.clone()
    }

    fn enumerate(&self) -> Result<Vec<Value>, SourceError> {
        Ok(self.items.to_vec())
    }
}

impl AsyncQueryableSource for InMemorySource {
    fn element_type(&self) -> TypeDescriptor {
        self.element_type.clone()
    }

    fn stream(&self) -> BoxStream<'static, Result<Value, SourceError>> {
        futures::stream::iter(self.items.to_vec().into_iter().map(Ok)).boxed()
    }
}
