use thiserror::Error;

use crate::ident::LabelId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AstError {
    #[error("Goto targets label {0} ({name}) which is not defined in the tree", name = .1.as_deref().unwrap_or("unnamed"))]
    UndefinedLabel(LabelId, Option<String>),
    #[error("Failed to encode expression: {0}")]
    Encode(String),
    #[error("Failed to decode expression: {0}")]
    Decode(String),
}
