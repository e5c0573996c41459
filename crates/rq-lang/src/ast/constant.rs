use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::types::TypeDescriptor;

/// Serializable payload of a constant node. Never holds a live handle:
/// data sources travel as [`ConstantValue::QueryableResource`] references
/// and are re-bound on the receiving side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConstantValue {
    Null,
    Unit,
    Bool(bool),
    Int(i64),
    /// Non-finite values travel as the strings `"inf"`, `"-inf"` and `"nan"`.
    Float(#[serde(with = "float_repr")] f64),
    String(String),
    Array(Vec<ConstantValue>),
    Object {
        ty: TypeDescriptor,
        fields: Vec<(SmolStr, ConstantValue)>,
    },
    /// A literal captured by partial evaluation.
    QueryArgument {
        ty: TypeDescriptor,
        value: Box<ConstantValue>,
    },
    /// Reference to a root data source, resolved by element type.
    QueryableResource { element_type: TypeDescriptor },
    /// In-memory sequence exposed as a queryable.
    LocalSequence {
        element_type: TypeDescriptor,
        items: Vec<ConstantValue>,
    },
    Type(TypeDescriptor),
}

/// Floats compare by value, except that NaN equals NaN so decoded trees
/// compare equal to the ones they were encoded from.
impl PartialEq for ConstantValue {
    fn eq(&self, other: &Self) -> bool {
        use ConstantValue::*;

        match (self, other) {
            (Null, Null) | (Unit, Unit) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (String(a), String(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Object { ty: ta, fields: fa }, Object { ty: tb, fields: fb }) => ta == tb && fa == fb,
            (QueryArgument { ty: ta, value: va }, QueryArgument { ty: tb, value: vb }) => ta == tb && va == vb,
            (QueryableResource { element_type: a }, QueryableResource { element_type: b }) => a == b,
            (
                LocalSequence {
                    element_type: ta,
                    items: ia,
                },
                LocalSequence {
                    element_type: tb,
                    items: ib,
                },
            ) => ta == tb && ia == ib,
            (Type(a), Type(b)) => a == b,
            _ => false,
        }
    }
}

mod float_repr {
    use std::fmt::{self, Formatter};

    use serde::{
        Deserializer, Serializer,
        de::{self, Visitor},
    };

    const INFINITY: &str = "inf";
    const NEG_INFINITY: &str = "-inf";
    const NAN: &str = "nan";

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str(NAN)
        } else if *value == f64::INFINITY {
            serializer.serialize_str(INFINITY)
        } else if *value == f64::NEG_INFINITY {
            serializer.serialize_str(NEG_INFINITY)
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        deserializer.deserialize_any(FloatVisitor)
    }

    struct FloatVisitor;

    impl Visitor<'_> for FloatVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut Formatter) -> fmt::Result {
            write!(f, "a number or one of \"{INFINITY}\", \"{NEG_INFINITY}\", \"{NAN}\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            match v {
                INFINITY => Ok(f64::INFINITY),
                NEG_INFINITY => Ok(f64::NEG_INFINITY),
                NAN => Ok(f64::NAN),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }
    }
}

impl ConstantValue {
    pub fn is_queryable_resource(&self) -> bool {
        matches!(self, ConstantValue::QueryableResource { .. })
    }
}

impl From<bool> for ConstantValue {
    fn from(b: bool) -> Self {
        ConstantValue::Bool(b)
    }
}

impl From<i64> for ConstantValue {
    fn from(n: i64) -> Self {
        ConstantValue::Int(n)
    }
}

impl From<f64> for ConstantValue {
    fn from(n: f64) -> Self {
        ConstantValue::Float(n)
    }
}

impl From<&str> for ConstantValue {
    fn from(s: &str) -> Self {
        ConstantValue::String(s.to_string())
    }
}

impl From<String> for ConstantValue {
    fn from(s: String) -> Self {
        ConstantValue::String(s)
    }
}
