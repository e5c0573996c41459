//! Serializable stand-ins for runtime types and their members.
//!
//! A [`TypeDescriptor`] names a type structurally (namespace, name, generic
//! arguments) so that expression trees can reference types without holding a
//! live handle. Two descriptors are equal iff every field matches.
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

pub const CORE_NAMESPACE: &str = "core";
pub const QUERY_NAMESPACE: &str = "query";
pub const ANONYMOUS_NAMESPACE: &str = "anon";

/// Identifies a type definition regardless of its generic instantiation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey {
    pub namespace: SmolStr,
    pub name: SmolStr,
}

impl Display for TypeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub namespace: SmolStr,
    pub name: SmolStr,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generic_arguments: Vec<TypeDescriptor>,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default)]
    pub is_generic: bool,
}

impl TypeDescriptor {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: SmolStr::new(namespace),
            name: SmolStr::new(name),
            generic_arguments: Vec::new(),
            is_array: false,
            is_generic: false,
        }
    }

    pub fn generic(namespace: &str, name: &str, generic_arguments: Vec<TypeDescriptor>) -> Self {
        Self {
            namespace: SmolStr::new(namespace),
            name: SmolStr::new(name),
            is_generic: !generic_arguments.is_empty(),
            generic_arguments,
            is_array: false,
        }
    }

    pub fn array_of(element: TypeDescriptor) -> Self {
        Self {
            namespace: SmolStr::new(CORE_NAMESPACE),
            name: SmolStr::new("array"),
            generic_arguments: vec![element],
            is_array: true,
            is_generic: false,
        }
    }

    pub fn unit() -> Self {
        Self::new(CORE_NAMESPACE, "unit")
    }

    pub fn bool() -> Self {
        Self::new(CORE_NAMESPACE, "bool")
    }

    pub fn int() -> Self {
        Self::new(CORE_NAMESPACE, "i64")
    }

    pub fn float() -> Self {
        Self::new(CORE_NAMESPACE, "f64")
    }

    pub fn string() -> Self {
        Self::new(CORE_NAMESPACE, "string")
    }

    /// The top type; every value is assignable to it.
    pub fn any() -> Self {
        Self::new(CORE_NAMESPACE, "any")
    }

    pub fn queryable(element: TypeDescriptor) -> Self {
        Self::generic(QUERY_NAMESPACE, "Queryable", vec![element])
    }

    pub fn enumerable(element: TypeDescriptor) -> Self {
        Self::generic(QUERY_NAMESPACE, "Enumerable", vec![element])
    }

    pub fn query_argument(inner: TypeDescriptor) -> Self {
        Self::generic(QUERY_NAMESPACE, "QueryArgument", vec![inner])
    }

    pub fn cancellation() -> Self {
        Self::new(QUERY_NAMESPACE, "CancellationToken")
    }

    /// Shape-only type built on the fly, e.g. for projections.
    pub fn anonymous(name: &str) -> Self {
        Self::new(ANONYMOUS_NAMESPACE, name)
    }

    pub fn type_handle() -> Self {
        Self::new(CORE_NAMESPACE, "type")
    }

    /// Record of variables captured by a client-side closure.
    pub fn closure() -> Self {
        Self::new(QUERY_NAMESPACE, "Closure")
    }

    /// Function type; the last generic argument is the return type.
    pub fn function(parameters: Vec<TypeDescriptor>, ret: TypeDescriptor) -> Self {
        let mut generic_arguments = parameters;
        generic_arguments.push(ret);
        Self::generic(QUERY_NAMESPACE, "Func", generic_arguments)
    }

    pub fn key(&self) -> TypeKey {
        TypeKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    pub fn full_name(&self) -> String {
        self.to_string()
    }

    pub fn is_unit(&self) -> bool {
        self.namespace == CORE_NAMESPACE && self.name == "unit"
    }

    pub fn is_any(&self) -> bool {
        self.namespace == CORE_NAMESPACE && self.name == "any"
    }

    pub fn is_anonymous(&self) -> bool {
        self.namespace == ANONYMOUS_NAMESPACE
    }

    pub fn is_float(&self) -> bool {
        self.namespace == CORE_NAMESPACE && self.name == "f64"
    }

    pub fn is_string(&self) -> bool {
        self.namespace == CORE_NAMESPACE && self.name == "string"
    }

    pub fn is_numeric(&self) -> bool {
        self.namespace == CORE_NAMESPACE && matches!(self.name.as_str(), "i64" | "f64")
    }

    pub fn is_queryable(&self) -> bool {
        self.is_query_type("Queryable")
    }

    pub fn is_enumerable(&self) -> bool {
        self.is_query_type("Enumerable")
    }

    pub fn is_query_argument(&self) -> bool {
        self.is_query_type("QueryArgument")
    }

    pub fn is_cancellation(&self) -> bool {
        self.is_query_type("CancellationToken")
    }

    pub fn is_closure(&self) -> bool {
        self.is_query_type("Closure")
    }

    pub fn is_function(&self) -> bool {
        self.is_query_type("Func")
    }

    /// Arrays, enumerables and queryables are sequences; strings are not.
    pub fn is_sequence(&self) -> bool {
        self.is_array || self.is_queryable() || self.is_enumerable()
    }

    pub fn element_type(&self) -> Option<&TypeDescriptor> {
        if self.is_sequence() {
            self.generic_arguments.first()
        } else {
            None
        }
    }

    pub fn return_type(&self) -> Option<&TypeDescriptor> {
        if self.is_function() {
            self.generic_arguments.last()
        } else {
            None
        }
    }

    /// Loose assignability used by type tests: exact match, `any`, or a
    /// sequence whose element types are assignable.
    pub fn is_assignable_from(&self, other: &TypeDescriptor) -> bool {
        if self == other || self.is_any() {
            return true;
        }

        match (self.element_type(), other.element_type()) {
            (Some(target), Some(source)) if self.is_enumerable() || self.is_array == other.is_array => {
                target.is_assignable_from(source)
            }
            _ => false,
        }
    }

    fn is_query_type(&self, name: &str) -> bool {
        self.namespace == QUERY_NAMESPACE && self.name == name
    }
}

impl Display for TypeDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_array {
            if let Some(element) = self.generic_arguments.first() {
                return write!(f, "[{}]", element);
            }
        }

        write!(f, "{}.{}", self.namespace, self.name)?;
        if !self.generic_arguments.is_empty() {
            let args = self
                .generic_arguments
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "<{}>", args)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberDescriptor {
    pub declaring_type: TypeDescriptor,
    pub name: SmolStr,
    pub member_type: TypeDescriptor,
}

impl MemberDescriptor {
    pub fn new(declaring_type: TypeDescriptor, name: &str, member_type: TypeDescriptor) -> Self {
        Self {
            declaring_type,
            name: SmolStr::new(name),
            member_type,
        }
    }
}

impl Display for MemberDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub declaring_type: TypeDescriptor,
    pub name: SmolStr,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generic_arguments: Vec<TypeDescriptor>,
    pub parameter_types: Vec<TypeDescriptor>,
    pub return_type: TypeDescriptor,
}

impl MethodDescriptor {
    pub fn new(
        declaring_type: TypeDescriptor,
        name: &str,
        parameter_types: Vec<TypeDescriptor>,
        return_type: TypeDescriptor,
    ) -> Self {
        Self {
            declaring_type,
            name: SmolStr::new(name),
            generic_arguments: Vec::new(),
            parameter_types,
            return_type,
        }
    }

    pub fn with_generic_arguments(mut self, generic_arguments: Vec<TypeDescriptor>) -> Self {
        self.generic_arguments = generic_arguments;
        self
    }

    /// Identity of the method definition, ignoring how it was instantiated.
    pub fn key(&self) -> MethodKey {
        MethodKey {
            declaring_type: self.declaring_type.key(),
            name: self.name.clone(),
            arity: self.parameter_types.len(),
        }
    }
}

impl Display for MethodDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)?;
        if !self.generic_arguments.is_empty() {
            let args = self
                .generic_arguments
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "<{}>", args)?;
        }
        write!(f, "/{}", self.parameter_types.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub declaring_type: TypeKey,
    pub name: SmolStr,
    pub arity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstructorDescriptor {
    pub declaring_type: TypeDescriptor,
    pub parameter_types: Vec<TypeDescriptor>,
}

impl ConstructorDescriptor {
    pub fn new(declaring_type: TypeDescriptor, parameter_types: Vec<TypeDescriptor>) -> Self {
        Self {
            declaring_type,
            parameter_types,
        }
    }
}

impl Display for ConstructorDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}::new/{}", self.declaring_type, self.parameter_types.len())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_structural_equality() {
        let a = TypeDescriptor::queryable(TypeDescriptor::new("app", "Product"));
        let b = TypeDescriptor::queryable(TypeDescriptor::new("app", "Product"));
        let c = TypeDescriptor::queryable(TypeDescriptor::new("app", "Order"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[rstest]
    #[case::array(TypeDescriptor::array_of(TypeDescriptor::int()), Some(TypeDescriptor::int()))]
    #[case::queryable(TypeDescriptor::queryable(TypeDescriptor::string()), Some(TypeDescriptor::string()))]
    #[case::string(TypeDescriptor::string(), None)]
    #[case::function(TypeDescriptor::function(vec![TypeDescriptor::int()], TypeDescriptor::bool()), None)]
    fn test_element_type(#[case] ty: TypeDescriptor, #[case] expected: Option<TypeDescriptor>) {
        assert_eq!(ty.element_type().cloned(), expected);
    }

    #[rstest]
    #[case::plain(TypeDescriptor::int(), "core.i64")]
    #[case::generic(TypeDescriptor::queryable(TypeDescriptor::new("app", "Product")), "query.Queryable<app.Product>")]
    #[case::array(TypeDescriptor::array_of(TypeDescriptor::string()), "[core.string]")]
    fn test_display(#[case] ty: TypeDescriptor, #[case] expected: &str) {
        assert_eq!(ty.to_string(), expected);
    }

    #[test]
    fn test_assignability() {
        let any = TypeDescriptor::any();
        let ints = TypeDescriptor::enumerable(TypeDescriptor::int());
        assert!(any.is_assignable_from(&TypeDescriptor::string()));
        assert!(ints.is_assignable_from(&TypeDescriptor::array_of(TypeDescriptor::int())));
        assert!(!TypeDescriptor::int().is_assignable_from(&TypeDescriptor::float()));
    }

    #[test]
    fn test_method_key_ignores_generic_arguments() {
        let m1 = MethodDescriptor::new(
            TypeDescriptor::new("app", "Helpers"),
            "suffix",
            vec![TypeDescriptor::string()],
            TypeDescriptor::string(),
        );
        let m2 = m1.clone().with_generic_arguments(vec![TypeDescriptor::int()]);
        assert_eq!(m1.key(), m2.key());
        assert_ne!(m1, m2);
    }
}
