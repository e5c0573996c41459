pub mod constant;
pub mod error;
#[cfg(feature = "ast-json")]
pub mod json;
pub mod labels;
pub mod node;
pub mod visitor;

pub use constant::ConstantValue;
pub use error::AstError;
pub use labels::validate_labels;
pub use node::{Expr, ExprRef, NodeKind};
pub use visitor::Visitor;
