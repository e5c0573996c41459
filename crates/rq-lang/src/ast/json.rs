//! Reference JSON wire codec for the remote expression tree.
use crate::Shared;

use super::{
    error::AstError,
    labels::validate_labels,
    node::{Expr, ExprRef},
};

impl Expr {
    pub fn to_json(&self) -> Result<String, AstError> {
        serde_json::to_string(self).map_err(|e| AstError::Encode(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, AstError> {
        serde_json::to_string_pretty(self).map_err(|e| AstError::Encode(e.to_string()))
    }

    /// Decodes a tree and checks goto/label correspondence before handing it out.
    pub fn from_json(json: &str) -> Result<ExprRef, AstError> {
        let expr: ExprRef = serde_json::from_str(json).map(Shared::new).map_err(|e| AstError::Decode(e.to_string()))?;
        validate_labels(&expr)?;
        Ok(expr)
    }
}
