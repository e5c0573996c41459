use std::sync::{PoisonError, RwLock};

use rustc_hash::FxHashMap;

use crate::{Shared, ident::ParameterId, value::Value};

use super::error::EvalError;

/// Lexical scope chain. Cloning shares the scope; closures keep their
/// defining scope alive.
#[derive(Debug, Clone, Default)]
pub struct Env {
    frame: Shared<Frame>,
}

#[derive(Debug, Default)]
struct Frame {
    vars: RwLock<FxHashMap<ParameterId, Value>>,
    parent: Option<Env>,
}

impl Env {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            frame: Shared::new(Frame {
                vars: RwLock::default(),
                parent: Some(self.clone()),
            }),
        }
    }

    #[inline(always)]
    pub fn define(&self, id: ParameterId, value: Value) {
        self.frame
            .vars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, value);
    }

    pub fn resolve(&self, id: ParameterId) -> Result<Value, EvalError> {
        let found = self
            .frame
            .vars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned();

        match (found, &self.frame.parent) {
            (Some(value), _) => Ok(value),
            (None, Some(parent)) => parent.resolve(id),
            (None, None) => Err(EvalError::UndefinedParameter(id)),
        }
    }

    /// Overwrites the nearest existing binding of `id`.
    pub fn assign(&self, id: ParameterId, value: Value) -> Result<(), EvalError> {
        {
            let mut vars = self.frame.vars.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = vars.get_mut(&id) {
                *slot = value;
                return Ok(());
            }
        }

        match &self.frame.parent {
            Some(parent) => parent.assign(id, value),
            None => Err(EvalError::UndefinedParameter(id)),
        }
    }
}
