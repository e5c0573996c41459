use std::convert::Infallible;

use rustc_hash::FxHashSet;

use crate::{Shared, ident::LabelId};

use super::{
    error::AstError,
    node::{ExprRef, GotoExpr, LabelExpr},
    visitor::Visitor,
};

/// Checks that every goto in `expr` jumps to a label defined in the same tree.
pub fn validate_labels(expr: &ExprRef) -> Result<(), AstError> {
    let mut collector = LabelCollector::default();
    let _ = collector.visit(expr);

    match collector
        .jumps
        .iter()
        .find(|(id, _)| !collector.defined.contains(id))
    {
        Some((id, name)) => Err(AstError::UndefinedLabel(*id, name.clone())),
        None => Ok(()),
    }
}

#[derive(Default)]
struct LabelCollector {
    defined: FxHashSet<LabelId>,
    jumps: Vec<(LabelId, Option<String>)>,
}

impl Visitor for LabelCollector {
    type Error = Infallible;

    fn visit_goto(&mut self, node: &ExprRef, goto: &GotoExpr) -> Result<ExprRef, Self::Error> {
        self.jumps
            .push((goto.target.id, goto.target.name.as_ref().map(|n| n.to_string())));
        self.visit_opt(goto.value.as_ref())?;
        Ok(Shared::clone(node))
    }

    fn visit_label(&mut self, node: &ExprRef, label: &LabelExpr) -> Result<ExprRef, Self::Error> {
        self.defined.insert(label.target.id);
        self.visit_opt(label.default_value.as_ref())?;
        Ok(Shared::clone(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::node::{BlockExpr, Expr, LabelTarget},
        ops::GotoKind,
        types::TypeDescriptor,
    };

    fn target(id: u64) -> Shared<LabelTarget> {
        Shared::new(LabelTarget {
            id: LabelId(id),
            name: Some("exit".into()),
            ty: TypeDescriptor::unit(),
        })
    }

    fn goto(target: Shared<LabelTarget>) -> ExprRef {
        Shared::new(Expr::Goto(GotoExpr {
            kind: GotoKind::Goto,
            target,
            value: None,
            ty: TypeDescriptor::unit(),
        }))
    }

    fn block(expressions: Vec<ExprRef>) -> ExprRef {
        Shared::new(Expr::Block(BlockExpr {
            ty: TypeDescriptor::unit(),
            variables: Vec::new(),
            expressions,
        }))
    }

    #[test]
    fn test_goto_with_matching_label() {
        let t = target(7);
        let label = Shared::new(Expr::Label(LabelExpr {
            target: Shared::clone(&t),
            default_value: None,
        }));
        assert!(validate_labels(&block(vec![goto(t), label])).is_ok());
    }

    #[test]
    fn test_goto_without_label() {
        let result = validate_labels(&block(vec![goto(target(8))]));
        assert_eq!(
            result,
            Err(AstError::UndefinedLabel(LabelId(8), Some("exit".to_string())))
        );
    }
}
