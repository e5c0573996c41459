//! Identity-preserving helpers shared by both tree visitors.
use std::borrow::Cow;

use crate::Shared;

/// Rewrites each element of `list`, allocating a new vector only once an
/// element comes back as a different node. Unchanged lists are borrowed.
pub(crate) fn rewrite_list<'a, T, E, F>(list: &'a [Shared<T>], mut f: F) -> Result<Cow<'a, [Shared<T>]>, E>
where
    F: FnMut(&Shared<T>) -> Result<Shared<T>, E>,
{
    let mut rewritten: Option<Vec<Shared<T>>> = None;

    for (i, item) in list.iter().enumerate() {
        let visited = f(item)?;
        match rewritten.as_mut() {
            Some(out) => out.push(visited),
            None if !Shared::ptr_eq(&visited, item) => {
                let mut out = Vec::with_capacity(list.len());
                out.extend(list[..i].iter().cloned());
                out.push(visited);
                rewritten = Some(out);
            }
            None => {}
        }
    }

    Ok(match rewritten {
        Some(out) => Cow::Owned(out),
        None => Cow::Borrowed(list),
    })
}

pub(crate) fn rewrite_opt<T, E, F>(item: Option<&Shared<T>>, f: F) -> Result<Option<Shared<T>>, E>
where
    F: FnOnce(&Shared<T>) -> Result<Shared<T>, E>,
{
    item.map(f).transpose()
}

#[inline]
pub(crate) fn is_owned<B: ?Sized + ToOwned>(cow: &Cow<'_, B>) -> bool {
    matches!(cow, Cow::Owned(_))
}

#[inline]
pub(crate) fn same<T>(a: &Shared<T>, b: &Shared<T>) -> bool {
    Shared::ptr_eq(a, b)
}

#[inline]
pub(crate) fn same_opt<T>(a: Option<&Shared<T>>, b: Option<&Shared<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Shared::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Expands to the `Visitor` trait and its `walk_*` functions for the node
/// types in scope at the call site. Both expression forms share field names,
/// so one definition serves the remote tree and the native tree.
macro_rules! define_visitor {
    () => {
        pub trait Visitor: Sized {
            type Error;

            fn visit(&mut self, expr: &ExprRef) -> Result<ExprRef, Self::Error> {
                walk_expr(self, expr)
            }

            fn visit_opt(&mut self, expr: Option<&ExprRef>) -> Result<Option<ExprRef>, Self::Error> {
                rewrite_opt(expr, |e| self.visit(e))
            }

            fn visit_constant(&mut self, node: &ExprRef, _constant: &ConstantExpr) -> Result<ExprRef, Self::Error> {
                Ok(Shared::clone(node))
            }

            fn visit_parameter(&mut self, node: &ExprRef, parameter: &ParameterRef) -> Result<ExprRef, Self::Error> {
                let visited = self.visit_parameter_decl(parameter)?;
                if same(&visited, parameter) {
                    Ok(Shared::clone(node))
                } else {
                    Ok(Shared::new(Expr::Parameter(visited)))
                }
            }

            /// Called for parameter declarations and parameter references alike.
            fn visit_parameter_decl(&mut self, parameter: &ParameterRef) -> Result<ParameterRef, Self::Error> {
                Ok(Shared::clone(parameter))
            }

            fn visit_label_target(&mut self, target: &LabelRef) -> Result<LabelRef, Self::Error> {
                Ok(Shared::clone(target))
            }

            fn visit_unary(&mut self, node: &ExprRef, unary: &UnaryExpr) -> Result<ExprRef, Self::Error> {
                walk_unary(self, node, unary)
            }

            fn visit_binary(&mut self, node: &ExprRef, binary: &BinaryExpr) -> Result<ExprRef, Self::Error> {
                walk_binary(self, node, binary)
            }

            fn visit_member_access(&mut self, node: &ExprRef, access: &MemberAccessExpr) -> Result<ExprRef, Self::Error> {
                walk_member_access(self, node, access)
            }

            fn visit_method_call(&mut self, node: &ExprRef, call: &MethodCallExpr) -> Result<ExprRef, Self::Error> {
                walk_method_call(self, node, call)
            }

            fn visit_lambda(&mut self, node: &ExprRef, lambda: &LambdaExpr) -> Result<ExprRef, Self::Error> {
                walk_lambda(self, node, lambda)
            }

            fn visit_new(&mut self, node: &ExprRef, new: &NewExpr) -> Result<ExprRef, Self::Error> {
                match walk_new_expr(self, new)? {
                    Some(new) => Ok(Shared::new(Expr::New(new))),
                    None => Ok(Shared::clone(node)),
                }
            }

            fn visit_new_array(&mut self, node: &ExprRef, array: &NewArrayExpr) -> Result<ExprRef, Self::Error> {
                walk_new_array(self, node, array)
            }

            fn visit_member_init(&mut self, node: &ExprRef, init: &MemberInitExpr) -> Result<ExprRef, Self::Error> {
                walk_member_init(self, node, init)
            }

            fn visit_list_init(&mut self, node: &ExprRef, init: &ListInitExpr) -> Result<ExprRef, Self::Error> {
                walk_list_init(self, node, init)
            }

            fn visit_binding(&mut self, binding: &BindingRef) -> Result<BindingRef, Self::Error> {
                walk_binding(self, binding)
            }

            fn visit_element_init(&mut self, init: &ElementInitRef) -> Result<ElementInitRef, Self::Error> {
                let arguments = rewrite_list(&init.arguments, |a| self.visit(a))?;
                if is_owned(&arguments) {
                    Ok(Shared::new(ElementInit {
                        add_method: init.add_method.clone(),
                        arguments: arguments.into_owned(),
                    }))
                } else {
                    Ok(Shared::clone(init))
                }
            }

            fn visit_type_is(&mut self, node: &ExprRef, type_is: &TypeIsExpr) -> Result<ExprRef, Self::Error> {
                let operand = self.visit(&type_is.operand)?;
                if same(&operand, &type_is.operand) {
                    Ok(Shared::clone(node))
                } else {
                    Ok(Shared::new(Expr::TypeIs(TypeIsExpr {
                        operand,
                        ty: type_is.ty.clone(),
                    })))
                }
            }

            fn visit_conditional(&mut self, node: &ExprRef, cond: &ConditionalExpr) -> Result<ExprRef, Self::Error> {
                walk_conditional(self, node, cond)
            }

            fn visit_block(&mut self, node: &ExprRef, block: &BlockExpr) -> Result<ExprRef, Self::Error> {
                walk_block(self, node, block)
            }

            fn visit_goto(&mut self, node: &ExprRef, goto: &GotoExpr) -> Result<ExprRef, Self::Error> {
                let target = self.visit_label_target(&goto.target)?;
                let value = self.visit_opt(goto.value.as_ref())?;
                if same(&target, &goto.target) && same_opt(value.as_ref(), goto.value.as_ref()) {
                    Ok(Shared::clone(node))
                } else {
                    Ok(Shared::new(Expr::Goto(GotoExpr {
                        kind: goto.kind,
                        target,
                        value,
                        ty: goto.ty.clone(),
                    })))
                }
            }

            fn visit_label(&mut self, node: &ExprRef, label: &LabelExpr) -> Result<ExprRef, Self::Error> {
                let target = self.visit_label_target(&label.target)?;
                let default_value = self.visit_opt(label.default_value.as_ref())?;
                if same(&target, &label.target) && same_opt(default_value.as_ref(), label.default_value.as_ref()) {
                    Ok(Shared::clone(node))
                } else {
                    Ok(Shared::new(Expr::Label(LabelExpr { target, default_value })))
                }
            }

            fn visit_default(&mut self, node: &ExprRef) -> Result<ExprRef, Self::Error> {
                Ok(Shared::clone(node))
            }

            fn visit_throw(&mut self, node: &ExprRef, throw: &ThrowExpr) -> Result<ExprRef, Self::Error> {
                let operand = self.visit_opt(throw.operand.as_ref())?;
                if same_opt(operand.as_ref(), throw.operand.as_ref()) {
                    Ok(Shared::clone(node))
                } else {
                    Ok(Shared::new(Expr::Throw(ThrowExpr {
                        operand,
                        ty: throw.ty.clone(),
                    })))
                }
            }
        }

        pub fn walk_expr<V: Visitor>(v: &mut V, expr: &ExprRef) -> Result<ExprRef, V::Error> {
            match &**expr {
                Expr::Constant(c) => v.visit_constant(expr, c),
                Expr::Parameter(p) => v.visit_parameter(expr, p),
                Expr::Unary(u) => v.visit_unary(expr, u),
                Expr::Binary(b) => v.visit_binary(expr, b),
                Expr::MemberAccess(m) => v.visit_member_access(expr, m),
                Expr::MethodCall(m) => v.visit_method_call(expr, m),
                Expr::Lambda(l) => v.visit_lambda(expr, l),
                Expr::New(n) => v.visit_new(expr, n),
                Expr::NewArray(n) => v.visit_new_array(expr, n),
                Expr::MemberInit(m) => v.visit_member_init(expr, m),
                Expr::ListInit(l) => v.visit_list_init(expr, l),
                Expr::TypeIs(t) => v.visit_type_is(expr, t),
                Expr::Conditional(c) => v.visit_conditional(expr, c),
                Expr::Block(b) => v.visit_block(expr, b),
                Expr::Goto(g) => v.visit_goto(expr, g),
                Expr::Label(l) => v.visit_label(expr, l),
                Expr::Default { .. } => v.visit_default(expr),
                Expr::Throw(t) => v.visit_throw(expr, t),
            }
        }

        pub fn walk_unary<V: Visitor>(v: &mut V, node: &ExprRef, unary: &UnaryExpr) -> Result<ExprRef, V::Error> {
            let operand = v.visit(&unary.operand)?;
            if same(&operand, &unary.operand) {
                return Ok(Shared::clone(node));
            }

            Ok(Shared::new(Expr::Unary(UnaryExpr {
                operand,
                ..unary.clone()
            })))
        }

        pub fn walk_binary<V: Visitor>(v: &mut V, node: &ExprRef, binary: &BinaryExpr) -> Result<ExprRef, V::Error> {
            let left = v.visit(&binary.left)?;
            let right = v.visit(&binary.right)?;
            let conversion = v.visit_opt(binary.conversion.as_ref())?;

            if same(&left, &binary.left)
                && same(&right, &binary.right)
                && same_opt(conversion.as_ref(), binary.conversion.as_ref())
            {
                return Ok(Shared::clone(node));
            }

            Ok(Shared::new(Expr::Binary(BinaryExpr {
                op: binary.op,
                left,
                right,
                lift_to_null: binary.lift_to_null,
                method: binary.method.clone(),
                conversion,
            })))
        }

        pub fn walk_member_access<V: Visitor>(
            v: &mut V,
            node: &ExprRef,
            access: &MemberAccessExpr,
        ) -> Result<ExprRef, V::Error> {
            let target = v.visit_opt(access.target.as_ref())?;
            if same_opt(target.as_ref(), access.target.as_ref()) {
                return Ok(Shared::clone(node));
            }

            Ok(Shared::new(Expr::MemberAccess(MemberAccessExpr {
                target,
                member: access.member.clone(),
            })))
        }

        pub fn walk_method_call<V: Visitor>(v: &mut V, node: &ExprRef, call: &MethodCallExpr) -> Result<ExprRef, V::Error> {
            let instance = v.visit_opt(call.instance.as_ref())?;
            let arguments = rewrite_list(&call.arguments, |a| v.visit(a))?;

            if same_opt(instance.as_ref(), call.instance.as_ref()) && !is_owned(&arguments) {
                return Ok(Shared::clone(node));
            }

            Ok(Shared::new(Expr::MethodCall(MethodCallExpr {
                instance,
                method: call.method.clone(),
                arguments: arguments.into_owned(),
            })))
        }

        pub fn walk_lambda<V: Visitor>(v: &mut V, node: &ExprRef, lambda: &LambdaExpr) -> Result<ExprRef, V::Error> {
            let parameters = rewrite_list(&lambda.parameters, |p| v.visit_parameter_decl(p))?;
            let body = v.visit(&lambda.body)?;

            if !is_owned(&parameters) && same(&body, &lambda.body) {
                return Ok(Shared::clone(node));
            }

            Ok(Shared::new(Expr::Lambda(LambdaExpr {
                ty: lambda.ty.clone(),
                parameters: parameters.into_owned(),
                body,
            })))
        }

        /// Returns `None` when no argument changed.
        pub fn walk_new_expr<V: Visitor>(v: &mut V, new: &NewExpr) -> Result<Option<NewExpr>, V::Error> {
            let arguments = rewrite_list(&new.arguments, |a| v.visit(a))?;
            if !is_owned(&arguments) {
                return Ok(None);
            }

            Ok(Some(NewExpr {
                constructor: new.constructor.clone(),
                arguments: arguments.into_owned(),
                members: new.members.clone(),
            }))
        }

        pub fn walk_new_array<V: Visitor>(v: &mut V, node: &ExprRef, array: &NewArrayExpr) -> Result<ExprRef, V::Error> {
            let expressions = rewrite_list(&array.expressions, |e| v.visit(e))?;
            if !is_owned(&expressions) {
                return Ok(Shared::clone(node));
            }

            Ok(Shared::new(Expr::NewArray(NewArrayExpr {
                kind: array.kind,
                element_type: array.element_type.clone(),
                expressions: expressions.into_owned(),
            })))
        }

        pub fn walk_member_init<V: Visitor>(v: &mut V, node: &ExprRef, init: &MemberInitExpr) -> Result<ExprRef, V::Error> {
            let new = walk_new_expr(v, &init.new)?;
            let bindings = rewrite_list(&init.bindings, |b| v.visit_binding(b))?;

            if new.is_none() && !is_owned(&bindings) {
                return Ok(Shared::clone(node));
            }

            Ok(Shared::new(Expr::MemberInit(MemberInitExpr {
                new: new.map(Shared::new).unwrap_or_else(|| Shared::clone(&init.new)),
                bindings: bindings.into_owned(),
            })))
        }

        pub fn walk_list_init<V: Visitor>(v: &mut V, node: &ExprRef, init: &ListInitExpr) -> Result<ExprRef, V::Error> {
            let new = walk_new_expr(v, &init.new)?;
            let initializers = rewrite_list(&init.initializers, |i| v.visit_element_init(i))?;

            if new.is_none() && !is_owned(&initializers) {
                return Ok(Shared::clone(node));
            }

            Ok(Shared::new(Expr::ListInit(ListInitExpr {
                new: new.map(Shared::new).unwrap_or_else(|| Shared::clone(&init.new)),
                initializers: initializers.into_owned(),
            })))
        }

        pub fn walk_binding<V: Visitor>(v: &mut V, binding: &BindingRef) -> Result<BindingRef, V::Error> {
            match &**binding {
                MemberBinding::Assignment { member, expression } => {
                    let visited = v.visit(expression)?;
                    if same(&visited, expression) {
                        Ok(Shared::clone(binding))
                    } else {
                        Ok(Shared::new(MemberBinding::Assignment {
                            member: member.clone(),
                            expression: visited,
                        }))
                    }
                }
                MemberBinding::MemberMember { member, bindings } => {
                    let visited = rewrite_list(bindings, |b| v.visit_binding(b))?;
                    if is_owned(&visited) {
                        Ok(Shared::new(MemberBinding::MemberMember {
                            member: member.clone(),
                            bindings: visited.into_owned(),
                        }))
                    } else {
                        Ok(Shared::clone(binding))
                    }
                }
                MemberBinding::List { member, initializers } => {
                    let visited = rewrite_list(initializers, |i| v.visit_element_init(i))?;
                    if is_owned(&visited) {
                        Ok(Shared::new(MemberBinding::List {
                            member: member.clone(),
                            initializers: visited.into_owned(),
                        }))
                    } else {
                        Ok(Shared::clone(binding))
                    }
                }
            }
        }

        pub fn walk_conditional<V: Visitor>(v: &mut V, node: &ExprRef, cond: &ConditionalExpr) -> Result<ExprRef, V::Error> {
            let test = v.visit(&cond.test)?;
            let if_true = v.visit(&cond.if_true)?;
            let if_false = v.visit(&cond.if_false)?;

            if same(&test, &cond.test) && same(&if_true, &cond.if_true) && same(&if_false, &cond.if_false) {
                return Ok(Shared::clone(node));
            }

            Ok(Shared::new(Expr::Conditional(ConditionalExpr {
                test,
                if_true,
                if_false,
                ty: cond.ty.clone(),
            })))
        }

        pub fn walk_block<V: Visitor>(v: &mut V, node: &ExprRef, block: &BlockExpr) -> Result<ExprRef, V::Error> {
            let variables = rewrite_list(&block.variables, |p| v.visit_parameter_decl(p))?;
            let expressions = rewrite_list(&block.expressions, |e| v.visit(e))?;

            if !is_owned(&variables) && !is_owned(&expressions) {
                return Ok(Shared::clone(node));
            }

            Ok(Shared::new(Expr::Block(BlockExpr {
                ty: block.ty.clone(),
                variables: variables.into_owned(),
                expressions: expressions.into_owned(),
            })))
        }
    };
}

pub(crate) use define_visitor;
