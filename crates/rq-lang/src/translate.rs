//! Conversion between the native expression form and the remote tree.
//!
//! [`to_remote`] runs on the composing side after partial evaluation;
//! [`from_remote`] runs on the executing side and binds every type, member
//! and data source reference against local definitions.
pub mod from_remote;
pub mod to_remote;

use thiserror::Error;

use crate::{ast::AstError, registry::ResolveError, types::TypeDescriptor};

pub use from_remote::from_remote;
pub use to_remote::to_remote;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslateError {
    #[error("Constant of type {ty} holds a {kind} and cannot leave this process")]
    NonSerializableConstant { kind: &'static str, ty: TypeDescriptor },
    #[error(transparent)]
    Unresolved(#[from] ResolveError),
    #[error("No queryable source is registered for {0}")]
    UnknownSource(TypeDescriptor),
    #[error(transparent)]
    Ast(#[from] AstError),
}
