pub mod builder;
pub mod node;
pub mod visitor;

pub use builder as build;
pub use node::{Expr, ExprRef, LabelRef, LabelTarget, Parameter, ParameterRef};
pub use visitor::Visitor;
