use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{
    Shared,
    ident::{LabelId, ParameterId},
    ops::{BinaryOp, GotoKind, NewArrayKind, UnaryOp},
    types::{ConstructorDescriptor, MemberDescriptor, MethodDescriptor, TypeDescriptor},
};

use super::constant::ConstantValue;

pub type ExprRef = Shared<Expr>;
pub type ParameterRef = Shared<Parameter>;
pub type LabelRef = Shared<LabelTarget>;
pub type BindingRef = Shared<MemberBinding>;
pub type ElementInitRef = Shared<ElementInit>;

/// Closed set of node kinds, used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Constant,
    Parameter,
    Unary,
    Binary,
    MemberAccess,
    MethodCall,
    Lambda,
    New,
    NewArray,
    MemberInit,
    ListInit,
    TypeIs,
    Conditional,
    Block,
    Goto,
    Label,
    Default,
    Throw,
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: ParameterId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<SmolStr>,
    pub ty: TypeDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelTarget {
    pub id: LabelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<SmolStr>,
    pub ty: TypeDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantExpr {
    pub value: ConstantValue,
    pub ty: TypeDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: ExprRef,
    pub ty: TypeDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<MethodDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub left: ExprRef,
    pub right: ExprRef,
    #[serde(default)]
    pub lift_to_null: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<MethodDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion: Option<ExprRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberAccessExpr {
    /// `None` for static members.
    pub target: Option<ExprRef>,
    pub member: MemberDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCallExpr {
    pub instance: Option<ExprRef>,
    pub method: MethodDescriptor,
    pub arguments: Vec<ExprRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaExpr {
    pub ty: TypeDescriptor,
    pub parameters: Vec<ParameterRef>,
    pub body: ExprRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpr {
    pub constructor: ConstructorDescriptor,
    pub arguments: Vec<ExprRef>,
    /// Members initialised by position, for anonymous construction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<MemberDescriptor>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArrayExpr {
    pub kind: NewArrayKind,
    pub element_type: TypeDescriptor,
    pub expressions: Vec<ExprRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemberBinding {
    Assignment {
        member: MemberDescriptor,
        expression: ExprRef,
    },
    MemberMember {
        member: MemberDescriptor,
        bindings: Vec<BindingRef>,
    },
    List {
        member: MemberDescriptor,
        initializers: Vec<ElementInitRef>,
    },
}

impl MemberBinding {
    pub fn member(&self) -> &MemberDescriptor {
        match self {
            MemberBinding::Assignment { member, .. }
            | MemberBinding::MemberMember { member, .. }
            | MemberBinding::List { member, .. } => member,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementInit {
    pub add_method: MethodDescriptor,
    pub arguments: Vec<ExprRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInitExpr {
    pub new: Shared<NewExpr>,
    pub bindings: Vec<BindingRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListInitExpr {
    pub new: Shared<NewExpr>,
    pub initializers: Vec<ElementInitRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeIsExpr {
    pub operand: ExprRef,
    pub ty: TypeDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalExpr {
    pub test: ExprRef,
    pub if_true: ExprRef,
    pub if_false: ExprRef,
    pub ty: TypeDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockExpr {
    pub ty: TypeDescriptor,
    pub variables: Vec<ParameterRef>,
    pub expressions: Vec<ExprRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GotoExpr {
    pub kind: GotoKind,
    pub target: LabelRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ExprRef>,
    pub ty: TypeDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelExpr {
    pub target: LabelRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<ExprRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrowExpr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand: Option<ExprRef>,
    pub ty: TypeDescriptor,
}

/// Serializable expression tree. Nodes are immutable once built; every
/// rewrite produces new nodes and shares the untouched ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Constant(ConstantExpr),
    Parameter(ParameterRef),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    MemberAccess(MemberAccessExpr),
    MethodCall(MethodCallExpr),
    Lambda(LambdaExpr),
    New(NewExpr),
    NewArray(NewArrayExpr),
    MemberInit(MemberInitExpr),
    ListInit(ListInitExpr),
    TypeIs(TypeIsExpr),
    Conditional(ConditionalExpr),
    Block(BlockExpr),
    Goto(GotoExpr),
    Label(LabelExpr),
    Default { ty: TypeDescriptor },
    Throw(ThrowExpr),
}

impl Expr {
    pub fn kind(&self) -> NodeKind {
        match self {
            Expr::Constant(_) => NodeKind::Constant,
            Expr::Parameter(_) => NodeKind::Parameter,
            Expr::Unary(_) => NodeKind::Unary,
            Expr::Binary(_) => NodeKind::Binary,
            Expr::MemberAccess(_) => NodeKind::MemberAccess,
            Expr::MethodCall(_) => NodeKind::MethodCall,
            Expr::Lambda(_) => NodeKind::Lambda,
            Expr::New(_) => NodeKind::New,
            Expr::NewArray(_) => NodeKind::NewArray,
            Expr::MemberInit(_) => NodeKind::MemberInit,
            Expr::ListInit(_) => NodeKind::ListInit,
            Expr::TypeIs(_) => NodeKind::TypeIs,
            Expr::Conditional(_) => NodeKind::Conditional,
            Expr::Block(_) => NodeKind::Block,
            Expr::Goto(_) => NodeKind::Goto,
            Expr::Label(_) => NodeKind::Label,
            Expr::Default { .. } => NodeKind::Default,
            Expr::Throw(_) => NodeKind::Throw,
        }
    }

    /// Static type of the value this node produces.
    pub fn ty(&self) -> TypeDescriptor {
        match self {
            Expr::Constant(c) => c.ty.clone(),
            Expr::Parameter(p) => p.ty.clone(),
            Expr::Unary(u) => u.ty.clone(),
            Expr::Binary(b) => binary_type(b.op, b.method.as_ref(), &b.left.ty(), &b.right.ty()),
            Expr::MemberAccess(m) => m.member.member_type.clone(),
            Expr::MethodCall(m) => m.method.return_type.clone(),
            Expr::Lambda(l) => l.ty.clone(),
            Expr::New(n) => n.constructor.declaring_type.clone(),
            Expr::NewArray(n) => TypeDescriptor::array_of(n.element_type.clone()),
            Expr::MemberInit(m) => m.new.constructor.declaring_type.clone(),
            Expr::ListInit(l) => l.new.constructor.declaring_type.clone(),
            Expr::TypeIs(_) => TypeDescriptor::bool(),
            Expr::Conditional(c) => c.ty.clone(),
            Expr::Block(b) => b.ty.clone(),
            Expr::Goto(g) => g.ty.clone(),
            Expr::Label(l) => l.target.ty.clone(),
            Expr::Default { ty } => ty.clone(),
            Expr::Throw(t) => t.ty.clone(),
        }
    }
}

/// Result type of a binary operator, shared by both expression forms.
pub(crate) fn binary_type(
    op: BinaryOp,
    method: Option<&MethodDescriptor>,
    left: &TypeDescriptor,
    right: &TypeDescriptor,
) -> TypeDescriptor {
    if let Some(method) = method {
        return method.return_type.clone();
    }

    match op {
        op if op.is_comparison() || op.is_logical() => TypeDescriptor::bool(),
        BinaryOp::Coalesce | BinaryOp::Assign => right.clone(),
        BinaryOp::ArrayIndex => left
            .element_type()
            .cloned()
            .unwrap_or_else(TypeDescriptor::any),
        BinaryOp::Add if left.is_string() || right.is_string() => TypeDescriptor::string(),
        BinaryOp::Divide | BinaryOp::Power
            if left.is_numeric() && (*left == TypeDescriptor::float() || *right == TypeDescriptor::float()) =>
        {
            TypeDescriptor::float()
        }
        _ if *right == TypeDescriptor::float() && left.is_numeric() => TypeDescriptor::float(),
        _ => left.clone(),
    }
}
