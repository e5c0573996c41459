//! The local type universe: registered types with their marker metadata,
//! members, methods and constructors, and resolution of wire descriptors
//! against them.
use std::fmt::{self, Debug, Formatter};

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use thiserror::Error;

use crate::{
    Shared,
    eval::{error::EvalError, operators::QueryOperator},
    types::{
        CORE_NAMESPACE, ConstructorDescriptor, MemberDescriptor, MethodDescriptor, MethodKey, QUERY_NAMESPACE,
        TypeDescriptor, TypeKey,
    },
    value::{NativeFn, Value},
};

pub type MethodRef = Shared<MethodInfo>;
pub type MemberRef = Shared<MemberInfo>;
pub type ConstructorRef = Shared<ConstructorInfo>;

/// Native method body. Receives the instance for instance methods.
pub type NativeMethod = dyn Fn(Option<&Value>, &[Value]) -> Result<Value, EvalError> + Send + Sync;
/// Computed member read. Receives `None` for static members.
pub type MemberGetter = dyn Fn(Option<&Value>) -> Result<Value, EvalError> + Send + Sync;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeMarkers {
    /// Values of this type are themselves deferred query arguments.
    pub query_argument: bool,
    /// Values of this type hold variables captured by a client closure.
    pub closure: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodMarkers {
    /// Calls to this method must be shipped, never evaluated locally.
    pub query_boundary: bool,
}

#[derive(Clone)]
pub enum MethodKind {
    Native(Shared<NativeMethod>),
    Operator(QueryOperator),
}

#[derive(Clone)]
pub struct MethodInfo {
    pub descriptor: MethodDescriptor,
    pub kind: MethodKind,
    pub markers: MethodMarkers,
}

impl MethodInfo {
    pub fn native<F>(descriptor: MethodDescriptor, f: F) -> Self
    where
        F: Fn(Option<&Value>, &[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            kind: MethodKind::Native(Shared::new(f)),
            markers: MethodMarkers::default(),
        }
    }

    pub fn operator(operator: QueryOperator, descriptor: MethodDescriptor) -> Self {
        Self {
            descriptor,
            kind: MethodKind::Operator(operator),
            markers: MethodMarkers::default(),
        }
    }

    pub fn query_boundary(mut self) -> Self {
        self.markers.query_boundary = true;
        self
    }

    pub fn shared(self) -> MethodRef {
        Shared::new(self)
    }

    /// Same implementation bound to the caller's instantiation.
    fn instantiate(self: &Shared<Self>, descriptor: &MethodDescriptor) -> MethodRef {
        if self.descriptor == *descriptor {
            return Shared::clone(self);
        }

        Shared::new(Self {
            descriptor: descriptor.clone(),
            kind: self.kind.clone(),
            markers: self.markers,
        })
    }
}

#[derive(Clone)]
pub enum Accessor {
    /// Named field of an object.
    Field,
    Getter(Shared<MemberGetter>),
}

#[derive(Clone)]
pub struct MemberInfo {
    pub descriptor: MemberDescriptor,
    pub accessor: Accessor,
}

impl MemberInfo {
    pub fn field(descriptor: MemberDescriptor) -> MemberRef {
        Shared::new(Self {
            descriptor,
            accessor: Accessor::Field,
        })
    }

    pub fn computed<F>(descriptor: MemberDescriptor, f: F) -> MemberRef
    where
        F: Fn(Option<&Value>) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Shared::new(Self {
            descriptor,
            accessor: Accessor::Getter(Shared::new(f)),
        })
    }

    /// `value` member of a query argument holding a `ty`.
    pub fn query_argument_value(ty: TypeDescriptor) -> MemberRef {
        Self::computed(
            MemberDescriptor::new(TypeDescriptor::query_argument(ty.clone()), "value", ty),
            read_query_argument,
        )
    }

    pub fn read(&self, target: Option<&Value>) -> Result<Value, EvalError> {
        match (&self.accessor, target) {
            (Accessor::Getter(getter), target) => getter(target),
            (Accessor::Field, Some(Value::Object(o))) => o
                .get(&self.descriptor.name)
                .ok_or_else(|| EvalError::MissingMember(self.descriptor.to_string())),
            (Accessor::Field, Some(Value::Null)) => Err(EvalError::NullReference(self.descriptor.to_string())),
            (Accessor::Field, Some(other)) => Err(EvalError::InvalidTypes {
                name: self.descriptor.name.to_string(),
                args: vec![other.name().into()],
            }),
            (Accessor::Field, None) => Err(EvalError::MissingMember(self.descriptor.to_string())),
        }
    }

    /// Stores into a field. Computed members are read-only.
    pub fn write(&self, target: &Value, value: Value) -> Result<(), EvalError> {
        match (&self.accessor, target) {
            (Accessor::Field, Value::Object(o)) => {
                o.set(&self.descriptor.name, value);
                Ok(())
            }
            (_, Value::Null) => Err(EvalError::NullReference(self.descriptor.to_string())),
            (_, other) => Err(EvalError::InvalidTypes {
                name: format!("{}=", self.descriptor.name),
                args: vec![other.name().into()],
            }),
        }
    }

    fn instantiate(self: &Shared<Self>, descriptor: &MemberDescriptor) -> MemberRef {
        if self.descriptor == *descriptor {
            return Shared::clone(self);
        }

        Shared::new(Self {
            descriptor: descriptor.clone(),
            accessor: self.accessor.clone(),
        })
    }
}

#[derive(Clone)]
pub enum ConstructorKind {
    /// Builds an object with the listed fields, filled positionally.
    Record { fields: Vec<SmolStr> },
    Native(Shared<NativeFn>),
}

#[derive(Clone)]
pub struct ConstructorInfo {
    pub descriptor: ConstructorDescriptor,
    pub kind: ConstructorKind,
}

impl ConstructorInfo {
    pub fn record(descriptor: ConstructorDescriptor, fields: Vec<SmolStr>) -> ConstructorRef {
        Shared::new(Self {
            descriptor,
            kind: ConstructorKind::Record { fields },
        })
    }

    pub fn native<F>(descriptor: ConstructorDescriptor, f: F) -> ConstructorRef
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Shared::new(Self {
            descriptor,
            kind: ConstructorKind::Native(Shared::new(f)),
        })
    }

    /// Constructor for a shape-only type whose fields are named by the
    /// construction site.
    pub fn anonymous(ty: TypeDescriptor, members: &[MemberDescriptor]) -> ConstructorRef {
        Self::record(
            ConstructorDescriptor::new(ty, members.iter().map(|m| m.member_type.clone()).collect()),
            members.iter().map(|m| m.name.clone()).collect(),
        )
    }

    /// `members`, when present, names the fields set by each argument.
    pub fn construct(&self, members: Option<&[MemberRef]>, args: Vec<Value>) -> Result<Value, EvalError> {
        let ty = self.descriptor.declaring_type.clone();

        if let Some(members) = members {
            if members.len() != args.len() {
                return Err(EvalError::InvalidNumberOfArguments(
                    self.descriptor.to_string(),
                    members.len(),
                    args.len(),
                ));
            }
            let fields = members
                .iter()
                .map(|m| m.descriptor.name.clone())
                .zip(args)
                .collect();
            return Ok(Value::Object(Shared::new(crate::value::Object::new(ty, fields))));
        }

        match &self.kind {
            ConstructorKind::Record { fields } => {
                if args.len() > fields.len() {
                    return Err(EvalError::InvalidNumberOfArguments(
                        self.descriptor.to_string(),
                        fields.len(),
                        args.len(),
                    ));
                }
                let mut args = args.into_iter();
                let fields = fields
                    .iter()
                    .map(|name| (name.clone(), args.next().unwrap_or_default()))
                    .collect();
                Ok(Value::Object(Shared::new(crate::value::Object::new(ty, fields))))
            }
            ConstructorKind::Native(f) => f(&args),
        }
    }
}

impl PartialEq for MethodInfo {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor && self.markers == other.markers
    }
}

impl PartialEq for MemberInfo {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
    }
}

impl PartialEq for ConstructorInfo {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
    }
}

impl Debug for MethodInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "MethodInfo({})", self.descriptor)
    }
}

impl Debug for MemberInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "MemberInfo({})", self.descriptor)
    }
}

impl Debug for ConstructorInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ConstructorInfo({})", self.descriptor)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("Unresolvable type \"{0}\"")]
    Type(TypeDescriptor),
    #[error("Unresolvable member \"{0}\"")]
    Member(MemberDescriptor),
    #[error("Unresolvable method \"{0}\"")]
    Method(MethodDescriptor),
    #[error("Unresolvable constructor \"{0}\"")]
    Constructor(ConstructorDescriptor),
}

/// Resolves wire descriptors against the types known to this process.
pub trait TypeResolver {
    fn resolve_type(&self, ty: &TypeDescriptor) -> Result<TypeDescriptor, ResolveError>;

    fn resolve_member(&self, member: &MemberDescriptor) -> Result<MemberRef, ResolveError>;

    fn resolve_method(&self, method: &MethodDescriptor) -> Result<MethodRef, ResolveError>;

    /// `members` is set for anonymous construction.
    fn resolve_constructor(
        &self,
        constructor: &ConstructorDescriptor,
        members: Option<&[MemberDescriptor]>,
    ) -> Result<ConstructorRef, ResolveError>;
}

#[derive(Debug, Clone)]
struct TypeInfo {
    markers: TypeMarkers,
}

#[derive(Clone)]
pub struct TypeRegistry {
    types: FxHashMap<TypeKey, TypeInfo>,
    members: FxHashMap<(TypeKey, SmolStr), MemberRef>,
    methods: FxHashMap<MethodKey, MethodRef>,
    constructors: FxHashMap<(TypeKey, usize), ConstructorRef>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_builtins();
        registry
    }
}

impl Debug for TypeRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.types.len())
            .field("members", &self.members.len())
            .field("methods", &self.methods.len())
            .field("constructors", &self.constructors.len())
            .finish()
    }
}

impl TypeRegistry {
    /// Registry without the built-in core and query types.
    pub fn empty() -> Self {
        Self {
            types: FxHashMap::default(),
            members: FxHashMap::default(),
            methods: FxHashMap::default(),
            constructors: FxHashMap::default(),
        }
    }

    pub fn register_type(&mut self, ty: &TypeDescriptor, markers: TypeMarkers) -> &mut Self {
        self.types.insert(ty.key(), TypeInfo { markers });
        self
    }

    /// Registers a record type with its fields, a field accessor per field,
    /// a positional constructor and a parameterless one for member init.
    pub fn register_record(&mut self, ty: &TypeDescriptor, fields: Vec<(&str, TypeDescriptor)>) -> &mut Self {
        self.register_type(ty, TypeMarkers::default());

        let names: Vec<SmolStr> = fields.iter().map(|(n, _)| SmolStr::new(n)).collect();
        for (name, field_type) in &fields {
            self.register_member(MemberInfo::field(MemberDescriptor::new(ty.clone(), name, field_type.clone())));
        }

        let parameter_types = fields.into_iter().map(|(_, t)| t).collect();
        self.register_constructor(ConstructorInfo::record(
            ConstructorDescriptor::new(ty.clone(), parameter_types),
            names.clone(),
        ));
        self.register_constructor(ConstructorInfo::record(
            ConstructorDescriptor::new(ty.clone(), Vec::new()),
            names,
        ));
        self
    }

    pub fn register_member(&mut self, member: MemberRef) -> &mut Self {
        let key = (member.descriptor.declaring_type.key(), member.descriptor.name.clone());
        self.members.insert(key, member);
        self
    }

    pub fn register_method(&mut self, method: MethodInfo) -> MethodRef {
        let method = method.shared();
        self.methods.insert(method.descriptor.key(), Shared::clone(&method));
        method
    }

    pub fn register_constructor(&mut self, constructor: ConstructorRef) -> &mut Self {
        let key = (
            constructor.descriptor.declaring_type.key(),
            constructor.descriptor.parameter_types.len(),
        );
        self.constructors.insert(key, constructor);
        self
    }

    pub fn markers(&self, ty: &TypeDescriptor) -> TypeMarkers {
        self.types.get(&ty.key()).map(|t| t.markers).unwrap_or_default()
    }

    pub fn is_query_argument_type(&self, ty: &TypeDescriptor) -> bool {
        ty.is_query_argument() || self.markers(ty).query_argument
    }

    pub fn is_closure_type(&self, ty: &TypeDescriptor) -> bool {
        ty.is_closure() || self.markers(ty).closure
    }

    pub fn method(&self, declaring_type: &TypeDescriptor, name: &str, arity: usize) -> Option<MethodRef> {
        self.methods
            .get(&MethodKey {
                declaring_type: declaring_type.key(),
                name: SmolStr::new(name),
                arity,
            })
            .cloned()
    }

    pub fn member(&self, declaring_type: &TypeDescriptor, name: &str) -> Option<MemberRef> {
        self.members.get(&(declaring_type.key(), SmolStr::new(name))).cloned()
    }

    pub fn constructor(&self, declaring_type: &TypeDescriptor, arity: usize) -> Option<ConstructorRef> {
        self.constructors.get(&(declaring_type.key(), arity)).cloned()
    }

    fn register_builtins(&mut self) {
        for name in ["unit", "bool", "i64", "f64", "string", "any", "type", "array", "math"] {
            self.register_type(&TypeDescriptor::new(CORE_NAMESPACE, name), TypeMarkers::default());
        }
        for name in ["Queryable", "Enumerable", "CancellationToken", "Func"] {
            self.register_type(&TypeDescriptor::new(QUERY_NAMESPACE, name), TypeMarkers::default());
        }
        self.register_type(
            &TypeDescriptor::new(QUERY_NAMESPACE, "QueryArgument"),
            TypeMarkers {
                query_argument: true,
                closure: false,
            },
        );
        self.register_type(
            &TypeDescriptor::closure(),
            TypeMarkers {
                query_argument: false,
                closure: true,
            },
        );

        self.register_member(MemberInfo::query_argument_value(TypeDescriptor::any()));
        self.register_member(MemberInfo::computed(
            MemberDescriptor::new(TypeDescriptor::string(), "len", TypeDescriptor::int()),
            |target| match target {
                Some(Value::String(s)) => Ok(Value::Int(s.chars().count() as i64)),
                Some(Value::Null) => Err(EvalError::NullReference("core.string::len".to_string())),
                other => Err(invalid_target("len", other)),
            },
        ));
        self.register_member(MemberInfo::computed(
            MemberDescriptor::new(
                TypeDescriptor::array_of(TypeDescriptor::any()),
                "len",
                TypeDescriptor::int(),
            ),
            |target| match target {
                Some(Value::Array(items)) => Ok(Value::Int(items.len() as i64)),
                other => Err(invalid_target("len", other)),
            },
        ));

        self.register_string_methods();

        let abs = MethodDescriptor::new(
            TypeDescriptor::new(CORE_NAMESPACE, "math"),
            "abs",
            vec![TypeDescriptor::any()],
            TypeDescriptor::any(),
        );
        self.register_method(MethodInfo::native(abs, |_, args| match args {
            [Value::Int(n)] => n
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(|| EvalError::Overflow("abs".to_string())),
            [Value::Float(n)] => Ok(Value::Float(n.abs())),
            args => Err(invalid_args("abs", args)),
        }));

        let array = TypeDescriptor::array_of(TypeDescriptor::any());
        self.register_constructor(ConstructorInfo::native(
            ConstructorDescriptor::new(array.clone(), Vec::new()),
            |_| Ok(Value::array(Vec::new())),
        ));
        let add = MethodDescriptor::new(array.clone(), "add", vec![TypeDescriptor::any()], array);
        self.register_method(MethodInfo::native(add, |instance, args| match (instance, args) {
            (Some(Value::Array(items)), [item]) => {
                let mut items = items.to_vec();
                items.push(item.clone());
                Ok(Value::array(items))
            }
            (_, args) => Err(invalid_args("add", args)),
        }));

        for operator in QueryOperator::ALL {
            for arity in operator.arities() {
                self.register_method(MethodInfo::operator(*operator, operator.definition(*arity)));
            }
        }
    }

    fn register_string_methods(&mut self) {
        type StrPredicate = fn(&str, &str) -> bool;
        let predicates: [(&str, StrPredicate); 3] = [
            ("contains", |s, p| s.contains(p)),
            ("starts_with", |s, p| s.starts_with(p)),
            ("ends_with", |s, p| s.ends_with(p)),
        ];
        for (name, predicate) in predicates {
            let descriptor = MethodDescriptor::new(
                TypeDescriptor::string(),
                name,
                vec![TypeDescriptor::string()],
                TypeDescriptor::bool(),
            );
            self.register_method(MethodInfo::native(descriptor, move |instance, args| {
                match (instance, args) {
                    (Some(Value::String(s)), [Value::String(p)]) => Ok(Value::Bool(predicate(s, p))),
                    (_, args) => Err(invalid_args(name, args)),
                }
            }));
        }

        type StrMap = fn(&str) -> String;
        let maps: [(&str, StrMap); 3] = [
            ("to_upper", |s| s.to_uppercase()),
            ("to_lower", |s| s.to_lowercase()),
            ("trim", |s| s.trim().to_string()),
        ];
        for (name, map) in maps {
            let descriptor = MethodDescriptor::new(TypeDescriptor::string(), name, Vec::new(), TypeDescriptor::string());
            self.register_method(MethodInfo::native(descriptor, move |instance, args| match instance {
                Some(Value::String(s)) => Ok(Value::String(map(s))),
                _ => Err(invalid_args(name, args)),
            }));
        }
    }

    fn is_known(&self, ty: &TypeDescriptor) -> bool {
        ty.is_anonymous() || self.types.contains_key(&ty.key())
    }

    fn resolve_all(&self, types: &[TypeDescriptor]) -> Result<(), ResolveError> {
        types.iter().try_for_each(|t| self.resolve_type(t).map(|_| ()))
    }
}

impl TypeResolver for TypeRegistry {
    fn resolve_type(&self, ty: &TypeDescriptor) -> Result<TypeDescriptor, ResolveError> {
        if !self.is_known(ty) {
            return Err(ResolveError::Type(ty.clone()));
        }
        self.resolve_all(&ty.generic_arguments)?;
        Ok(ty.clone())
    }

    fn resolve_member(&self, member: &MemberDescriptor) -> Result<MemberRef, ResolveError> {
        self.resolve_type(&member.declaring_type)
            .and_then(|_| self.resolve_type(&member.member_type))
            .map_err(|_| ResolveError::Member(member.clone()))?;

        match self.members.get(&(member.declaring_type.key(), member.name.clone())) {
            Some(known) => Ok(known.instantiate(member)),
            None if member.declaring_type.is_anonymous() => Ok(MemberInfo::field(member.clone())),
            None => Err(ResolveError::Member(member.clone())),
        }
    }

    fn resolve_method(&self, method: &MethodDescriptor) -> Result<MethodRef, ResolveError> {
        self.resolve_type(&method.declaring_type)
            .and_then(|_| self.resolve_all(&method.generic_arguments))
            .and_then(|_| self.resolve_all(&method.parameter_types))
            .and_then(|_| self.resolve_type(&method.return_type))
            .map_err(|_| ResolveError::Method(method.clone()))?;

        self.methods
            .get(&method.key())
            .map(|known| known.instantiate(method))
            .ok_or_else(|| ResolveError::Method(method.clone()))
    }

    fn resolve_constructor(
        &self,
        constructor: &ConstructorDescriptor,
        members: Option<&[MemberDescriptor]>,
    ) -> Result<ConstructorRef, ResolveError> {
        let declaring_type = &constructor.declaring_type;
        self.resolve_type(declaring_type)
            .and_then(|_| self.resolve_all(&constructor.parameter_types))
            .map_err(|_| ResolveError::Constructor(constructor.clone()))?;

        match (self.constructor(declaring_type, constructor.parameter_types.len()), members) {
            (Some(known), _) if known.descriptor == *constructor => Ok(known),
            (Some(known), _) => Ok(Shared::new(ConstructorInfo {
                descriptor: constructor.clone(),
                kind: known.kind.clone(),
            })),
            (None, Some(members)) if declaring_type.is_anonymous() => {
                Ok(ConstructorInfo::anonymous(declaring_type.clone(), members))
            }
            (None, _) => Err(ResolveError::Constructor(constructor.clone())),
        }
    }
}

fn read_query_argument(target: Option<&Value>) -> Result<Value, EvalError> {
    match target {
        Some(Value::QueryArgument(arg)) => Ok(arg.value.clone()),
        other => Err(invalid_target("value", other)),
    }
}

fn invalid_target(name: &str, target: Option<&Value>) -> EvalError {
    EvalError::InvalidTypes {
        name: name.to_string(),
        args: vec![target.map(|v| v.name()).unwrap_or("static").into()],
    }
}

fn invalid_args(name: &str, args: &[Value]) -> EvalError {
    EvalError::InvalidTypes {
        name: name.to_string(),
        args: args.iter().map(|a| a.name().into()).collect(),
    }
}
