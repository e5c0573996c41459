use std::fmt::{self, Debug, Formatter};

use smol_str::SmolStr;

use crate::{
    Shared,
    ast::node::{NodeKind, binary_type},
    ident::{LabelId, ParameterId},
    ops::{BinaryOp, GotoKind, NewArrayKind, UnaryOp},
    registry::{ConstructorRef, MemberRef, MethodRef},
    types::TypeDescriptor,
    value::Value,
};

pub type ExprRef = Shared<Expr>;
pub type ParameterRef = Shared<Parameter>;
pub type LabelRef = Shared<LabelTarget>;
pub type BindingRef = Shared<MemberBinding>;
pub type ElementInitRef = Shared<ElementInit>;

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub id: ParameterId,
    pub name: Option<SmolStr>,
    pub ty: TypeDescriptor,
}

impl Parameter {
    /// Declares a parameter with a fresh identity.
    pub fn new(name: &str, ty: TypeDescriptor) -> ParameterRef {
        Shared::new(Self {
            id: ParameterId::fresh(),
            name: Some(SmolStr::new(name)),
            ty,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelTarget {
    pub id: LabelId,
    pub name: Option<SmolStr>,
    pub ty: TypeDescriptor,
}

impl LabelTarget {
    pub fn new(name: &str, ty: TypeDescriptor) -> LabelRef {
        Shared::new(Self {
            id: LabelId::fresh(),
            name: Some(SmolStr::new(name)),
            ty,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantExpr {
    pub value: Value,
    pub ty: TypeDescriptor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: ExprRef,
    pub ty: TypeDescriptor,
    pub method: Option<MethodRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub left: ExprRef,
    pub right: ExprRef,
    pub lift_to_null: bool,
    pub method: Option<MethodRef>,
    pub conversion: Option<ExprRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberAccessExpr {
    pub target: Option<ExprRef>,
    pub member: MemberRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodCallExpr {
    pub instance: Option<ExprRef>,
    pub method: MethodRef,
    pub arguments: Vec<ExprRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LambdaExpr {
    pub ty: TypeDescriptor,
    pub parameters: Vec<ParameterRef>,
    pub body: ExprRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExpr {
    pub constructor: ConstructorRef,
    pub arguments: Vec<ExprRef>,
    pub members: Option<Vec<MemberRef>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewArrayExpr {
    pub kind: NewArrayKind,
    pub element_type: TypeDescriptor,
    pub expressions: Vec<ExprRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberBinding {
    Assignment { member: MemberRef, expression: ExprRef },
    MemberMember { member: MemberRef, bindings: Vec<BindingRef> },
    List { member: MemberRef, initializers: Vec<ElementInitRef> },
}

impl MemberBinding {
    pub fn member(&self) -> &MemberRef {
        match self {
            MemberBinding::Assignment { member, .. }
            | MemberBinding::MemberMember { member, .. }
            | MemberBinding::List { member, .. } => member,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementInit {
    pub add_method: MethodRef,
    pub arguments: Vec<ExprRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberInitExpr {
    pub new: Shared<NewExpr>,
    pub bindings: Vec<BindingRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListInitExpr {
    pub new: Shared<NewExpr>,
    pub initializers: Vec<ElementInitRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeIsExpr {
    pub operand: ExprRef,
    pub ty: TypeDescriptor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalExpr {
    pub test: ExprRef,
    pub if_true: ExprRef,
    pub if_false: ExprRef,
    pub ty: TypeDescriptor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockExpr {
    pub ty: TypeDescriptor,
    pub variables: Vec<ParameterRef>,
    pub expressions: Vec<ExprRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GotoExpr {
    pub kind: GotoKind,
    pub target: LabelRef,
    pub value: Option<ExprRef>,
    pub ty: TypeDescriptor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelExpr {
    pub target: LabelRef,
    pub default_value: Option<ExprRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThrowExpr {
    pub operand: Option<ExprRef>,
    pub ty: TypeDescriptor,
}

/// Directly executable expression. Same kinds as the remote tree, but
/// constants hold live values and calls hold resolved implementations.
#[derive(Clone, PartialEq)]
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

    pub fn ty(&self) -> TypeDescriptor {
        match self {
            Expr::Constant(c) => c.ty.clone(),
            Expr::Parameter(p) => p.ty.clone(),
            Expr::Unary(u) => u.ty.clone(),
            Expr::Binary(b) => binary_type(
                b.op,
                b.method.as_ref().map(|m| &m.descriptor),
                &b.left.ty(),
                &b.right.ty(),
            ),
            Expr::MemberAccess(m) => m.member.descriptor.member_type.clone(),
            Expr::MethodCall(m) => m.method.descriptor.return_type.clone(),
            Expr::Lambda(l) => l.ty.clone(),
            Expr::New(n) => n.constructor.descriptor.declaring_type.clone(),
            Expr::NewArray(n) => TypeDescriptor::array_of(n.element_type.clone()),
            Expr::MemberInit(m) => m.new.constructor.descriptor.declaring_type.clone(),
            Expr::ListInit(l) => l.new.constructor.descriptor.declaring_type.clone(),
            Expr::TypeIs(_) => TypeDescriptor::bool(),
            Expr::Conditional(c) => c.ty.clone(),
            Expr::Block(b) => b.ty.clone(),
            Expr::Goto(g) => g.ty.clone(),
            Expr::Label(l) => l.target.ty.clone(),
            Expr::Default { ty } => ty.clone(),
            Expr::Throw(t) => t.ty.clone(),
        }
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            Expr::Constant(c) => Some(&c.value),
            _ => None,
        }
    }
}

impl Debug for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(c) => write!(f, "{:?}", c.value),
            Expr::Parameter(p) => match &p.name {
                Some(name) => write!(f, "{}", name),
                None => write!(f, "{}", p.id),
            },
            Expr::Unary(u) => write!(f, "{}({:?})", u.op, u.operand),
            Expr::Binary(b) => write!(f, "({:?} {} {:?})", b.left, b.op, b.right),
            Expr::MemberAccess(m) => match &m.target {
                Some(target) => write!(f, "{:?}.{}", target, m.member.descriptor.name),
                None => write!(f, "{}", m.member.descriptor),
            },
            Expr::MethodCall(m) => {
                if let Some(instance) = &m.instance {
                    write!(f, "{:?}.", instance)?;
                }
                write!(f, "{}(", m.method.descriptor.name)?;
                for (i, arg) in m.arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Lambda(l) => {
                let params = l
                    .parameters
                    .iter()
                    .map(|p| p.name.as_deref().unwrap_or("_").to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "|{}| {:?}", params, l.body)
            }
            other => write!(f, "<{}>", other.kind()),
        }
    }
}
