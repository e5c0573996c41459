use smallvec::SmallVec;

use crate::{
    Shared,
    config::Options,
    execution::ResultShape,
    types::TypeDescriptor,
    value::{Queryable, Value},
};

use super::{DynamicObject, DynamicValue, MappingError};

/// Maps runtime values onto [`DynamicValue`] trees by inspecting each
/// object's own fields.
#[derive(Debug, Clone)]
pub struct DynamicMapper {
    set_type_information: bool,
    max_depth: u32,
}

impl Default for DynamicMapper {
    fn default() -> Self {
        Self::new(&Options::default())
    }
}

/// Addresses of the containers currently being mapped.
type Ancestors = SmallVec<[usize; 16]>;

impl DynamicMapper {
    pub fn new(options: &Options) -> Self {
        Self {
            set_type_information: options.set_type_information,
            max_depth: options.max_depth,
        }
    }

    pub fn with_type_information(mut self, enabled: bool) -> Self {
        self.set_type_information = enabled;
        self
    }

    pub fn map(&self, value: &Value) -> Result<DynamicValue, MappingError> {
        self.map_value(value, &mut Ancestors::new())
    }

    /// Sequences always map to a list, whatever sequence form they come in.
    pub fn map_result(&self, value: &Value, shape: ResultShape) -> Result<DynamicValue, MappingError> {
        match (shape, value) {
            (ResultShape::Sequence, Value::Null) => Ok(DynamicValue::List(Vec::new())),
            (ResultShape::Void, Value::Unit) => Ok(DynamicValue::Null),
            _ => self.map(value),
        }
    }

    fn map_value(&self, value: &Value, ancestors: &mut Ancestors) -> Result<DynamicValue, MappingError> {
        if ancestors.len() as u32 >= self.max_depth {
            return Err(MappingError::DepthExceeded(self.max_depth));
        }

        match value {
            Value::Null | Value::Unit => Ok(DynamicValue::Null),
            Value::Bool(b) => Ok(DynamicValue::Bool(*b)),
            Value::Int(n) => Ok(DynamicValue::Int(*n)),
            Value::Float(n) => Ok(DynamicValue::Float(*n)),
            Value::String(s) => Ok(DynamicValue::String(s.clone())),
            Value::Type(ty) => Ok(DynamicValue::String(ty.to_string())),
            Value::QueryArgument(arg) => self.map_value(&arg.value, ancestors),
            Value::Array(items) | Value::Queryable(Queryable::Local { items, .. }) => {
                self.enter(Shared::as_ptr(items) as usize, None, ancestors, |ancestors| {
                    self.map_list(items, ancestors)
                })
            }
            Value::Queryable(Queryable::Source(source)) => {
                let items = source.enumerate()?;
                self.map_list(&items, ancestors)
            }
            Value::Object(object) => {
                let address = Shared::as_ptr(object) as usize;
                self.enter(address, Some(object.ty()), ancestors, |ancestors| {
                    let properties = object
                        .fields()
                        .iter()
                        .map(|(name, v)| self.map_value(v, ancestors).map(|m| (name.clone(), m)))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(DynamicValue::Object(DynamicObject {
                        ty: self.set_type_information.then(|| object.ty().clone()),
                        properties,
                    }))
                })
            }
            Value::Queryable(Queryable::Resource { .. }) => Err(MappingError::Unmappable("remote resource")),
            Value::Queryable(Queryable::Query { .. }) => Err(MappingError::Unmappable("query handle")),
            Value::Function(_) => Err(MappingError::Unmappable("function")),
            Value::Cancellation(_) => Err(MappingError::Unmappable("cancellation handle")),
        }
    }

    fn map_list(&self, items: &[Value], ancestors: &mut Ancestors) -> Result<DynamicValue, MappingError> {
        items
            .iter()
            .map(|v| self.map_value(v, ancestors))
            .collect::<Result<Vec<_>, _>>()
            .map(DynamicValue::List)
    }

    fn enter<F>(
        &self,
        address: usize,
        ty: Option<&TypeDescriptor>,
        ancestors: &mut Ancestors,
        f: F,
    ) -> Result<DynamicValue, MappingError>
    where
        F: FnOnce(&mut Ancestors) -> Result<DynamicValue, MappingError>,
    {
        if ancestors.contains(&address) {
            let ty = ty
                .cloned()
                .unwrap_or_else(|| TypeDescriptor::array_of(TypeDescriptor::any()));
            return Err(MappingError::Cycle(ty));
        }

        ancestors.push(address);
        let result = f(ancestors);
        ancestors.pop();
        result
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn summary() -> Value {
        Value::object(
            TypeDescriptor::new("app", "Summary"),
            vec![("Name", Value::from("a")), ("Count", Value::Int(3))],
        )
    }

    #[test]
    fn test_object_maps_to_named_fields() {
        let mapped = DynamicMapper::default().map(&summary()).unwrap();
        assert_eq!(
            mapped,
            DynamicValue::Object(
                DynamicObject::new(Some(TypeDescriptor::new("app", "Summary")))
                    .with("Name", DynamicValue::String("a".to_string()))
                    .with("Count", DynamicValue::Int(3))
            )
        );
    }

    #[test]
    fn test_type_information_can_be_omitted() {
        let mapped = DynamicMapper::default()
            .with_type_information(false)
            .map(&summary())
            .unwrap();
        let DynamicValue::Object(object) = mapped else {
            panic!("expected object");
        };
        assert_eq!(object.ty, None);
        assert_eq!(object.len(), 2);
    }

    #[rstest]
    #[case::null(Value::Null, DynamicValue::Null)]
    #[case::query_argument(Value::query_argument(TypeDescriptor::int(), Value::Int(7)), DynamicValue::Int(7))]
    #[case::local(
        Value::Queryable(Queryable::local(TypeDescriptor::bool(), vec![Value::Bool(true)])),
        DynamicValue::List(vec![DynamicValue::Bool(true)])
    )]
    fn test_map(#[case] value: Value, #[case] expected: DynamicValue) {
        assert_eq!(DynamicMapper::default().map(&value), Ok(expected));
    }

    #[test]
    fn test_shared_object_is_not_a_cycle() {
        let shared = summary();
        let pair = Value::array(vec![shared.clone(), shared]);
        assert!(DynamicMapper::default().map(&pair).is_ok());
    }

    #[test]
    fn test_cycle_is_fatal() {
        let ty = TypeDescriptor::new("app", "Node");
        let node = Shared::new(crate::value::Object::new(ty.clone(), vec![]));
        node.set("next", Value::Object(Shared::clone(&node)));

        let result = DynamicMapper::default().map(&Value::Object(Shared::clone(&node)));
        node.set("next", Value::Null);

        assert_eq!(result, Err(MappingError::Cycle(ty)));
    }

    #[test]
    fn test_handles_are_unmappable() {
        let resource = Value::Queryable(Queryable::Resource {
            element_type: TypeDescriptor::int(),
        });
        assert_eq!(
            DynamicMapper::default().map(&resource),
            Err(MappingError::Unmappable("remote resource"))
        );
    }

    #[rstest]
    #[case::empty_sequence(Value::Null, ResultShape::Sequence, DynamicValue::List(vec![]))]
    #[case::void(Value::Unit, ResultShape::Void, DynamicValue::Null)]
    #[case::scalar(Value::Int(1), ResultShape::Scalar, DynamicValue::Int(1))]
    fn test_map_result(#[case] value: Value, #[case] shape: ResultShape, #[case] expected: DynamicValue) {
        assert_eq!(DynamicMapper::default().map_result(&value, shape), Ok(expected));
    }
}
