use crate::{
    error::{EncodingError, PropertyError, Result},
    pclass::{
        Cardinality, ClassType, ElementType, EnumType, Primitive, PropertyCell,
        PropertyDescriptor, PropertyObject, TypeSystem, Value,
    },
};
use ordered_float::OrderedFloat;
use serde_json::{Map, Number, Value as Json};
use std::sync::Arc;
use tracing::warn;

/// Reserved key carrying the class name in file mode.
pub const CLASS_NAME_KEY: &str = "_pclass_name";
/// Reserved key carrying the class hash in regular mode.
pub const CLASS_HASH_KEY: &str = "_pclass_hash";

/// Serializes property-class graphs to and from the JSON form.
///
/// File mode identifies classes by name, emits enum element names, and
/// pretty-prints; regular mode identifies classes by hash, emits enum values,
/// and produces compact one-line output.
#[derive(Debug)]
pub struct JsonSerializer<'a> {
    types: &'a TypeSystem,
    is_file: bool,
    strict: bool,
}

impl<'a> JsonSerializer<'a> {
    pub fn new(types: &'a TypeSystem, is_file: bool) -> Self {
        Self {
            types,
            is_file,
            strict: true,
        }
    }

    /// Allows decoding to continue past unknown enum values and missing
    /// properties.
    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }

    pub fn save(&self, object: &PropertyObject) -> Result<String> {
        let json = self.object_to_json(object)?;
        let text = if self.is_file {
            serde_json::to_string_pretty(&json)
        } else {
            serde_json::to_string(&json)
        };
        Ok(text.unwrap()) // SAFETY: string-keyed values always render
    }

    pub fn load(&self, data: &str) -> Result<PropertyObject> {
        let json: Json =
            serde_json::from_str(data).map_err(|e| EncodingError::Malformed(e.to_string()))?;
        self.json_to_object(&json)
    }

    fn object_to_json(&self, object: &PropertyObject) -> Result<Json> {
        let mut map = Map::new();
        if self.is_file {
            map.insert(
                CLASS_NAME_KEY.to_owned(),
                Json::String(object.class().name().to_owned()),
            );
        } else {
            map.insert(
                CLASS_HASH_KEY.to_owned(),
                Json::Number(Number::from(object.class().hash())),
            );
        }

        for property in object.properties() {
            let desc = property.descriptor();
            let value = match property.cell() {
                PropertyCell::Scalar(value) => self.value_to_json(desc, value)?,
                PropertyCell::Array(values) | PropertyCell::Vector(values) => Json::Array(
                    values
                        .iter()
                        .map(|v| self.value_to_json(desc, v))
                        .collect::<Result<_>>()?,
                ),
            };
            map.insert(desc.name().to_owned(), value);
        }
        Ok(Json::Object(map))
    }

    fn value_to_json(&self, desc: &PropertyDescriptor, value: &Value) -> Result<Json> {
        Ok(match value {
            Value::Signed(v) => Json::Number(Number::from(*v)),
            Value::Unsigned(v) | Value::Gid(v) => Json::Number(Number::from(*v)),
            Value::F32(v) => float_number(desc, f64::from(v.0))?,
            Value::F64(v) => float_number(desc, v.0)?,
            Value::Str(s) | Value::WStr(s) => Json::String(s.clone()),
            Value::Enum(v) => self.enum_to_json(desc, *v)?,
            Value::Null => Json::Null,
            Value::Object(object) => self.object_to_json(object)?,
        })
    }

    fn enum_to_json(&self, desc: &PropertyDescriptor, value: i32) -> Result<Json> {
        if !self.is_file {
            return Ok(Json::Number(Number::from(value)));
        }
        let enum_type = match desc.element() {
            ElementType::Enum(e) => e,
            _ => {
                return Err(PropertyError::TypeMismatch {
                    property: desc.name().to_owned(),
                    expected: desc.element().to_string(),
                    actual: "enum".to_owned(),
                }
                .into())
            }
        };
        match enum_type.name_of(value) {
            Some(name) => Ok(Json::String(name.to_owned())),
            None if self.strict => Err(EncodingError::UnknownTag {
                context: enum_type.name().to_owned(),
                value: i64::from(value),
            }
            .into()),
            None => {
                warn!(
                    value,
                    enum_type = enum_type.name(),
                    "Emitting unregistered enum value numerically"
                );
                Ok(Json::Number(Number::from(value)))
            }
        }
    }

    fn json_to_object(&self, json: &Json) -> Result<PropertyObject> {
        let map = json
            .as_object()
            .ok_or_else(|| EncodingError::Malformed("expected a JSON object".to_owned()))?;

        let class = self.resolve_class(map)?;
        let mut object = PropertyObject::create(&class);

        for (index, desc) in class.descriptors().iter().enumerate() {
            let entry = match map.get(desc.name()) {
                Some(entry) => entry,
                None if self.strict => {
                    return Err(EncodingError::Malformed(format!(
                        "missing property '{}'",
                        desc.name()
                    ))
                    .into())
                }
                None => {
                    warn!(property = desc.name(), "Missing property left defaulted");
                    continue;
                }
            };

            let cell = match desc.cardinality() {
                Cardinality::Scalar => {
                    PropertyCell::Scalar(self.json_to_value(desc, &class, entry)?)
                }
                Cardinality::Array(n) => {
                    let values = self.json_to_values(desc, &class, entry)?;
                    if values.len() != n {
                        return Err(PropertyError::OutOfRange {
                            property: desc.name().to_owned(),
                            index: values.len(),
                            len: n,
                        }
                        .into());
                    }
                    PropertyCell::Array(values)
                }
                Cardinality::Vector => {
                    PropertyCell::Vector(self.json_to_values(desc, &class, entry)?)
                }
            };
            object.cells[index] = cell;
        }
        Ok(object)
    }

    fn resolve_class(&self, map: &Map<String, Json>) -> Result<Arc<ClassType>> {
        let ty = if self.is_file {
            let name = map
                .get(CLASS_NAME_KEY)
                .and_then(Json::as_str)
                .ok_or_else(|| {
                    EncodingError::Malformed(format!("missing '{CLASS_NAME_KEY}' key"))
                })?;
            self.types.get(name)?
        } else {
            let hash = map
                .get(CLASS_HASH_KEY)
                .and_then(Json::as_u64)
                .and_then(|h| u32::try_from(h).ok())
                .ok_or_else(|| {
                    EncodingError::Malformed(format!("missing '{CLASS_HASH_KEY}' key"))
                })?;
            self.types.get_by_hash(hash)?
        };
        let class = ty.as_class().ok_or_else(|| {
            crate::error::TypeError::NotClass(ty.name().to_owned())
        })?;
        Ok(Arc::clone(class))
    }

    fn json_to_values(
        &self,
        desc: &PropertyDescriptor,
        owner: &Arc<ClassType>,
        json: &Json,
    ) -> Result<Vec<Value>> {
        json.as_array()
            .ok_or_else(|| {
                EncodingError::Malformed(format!("property '{}' is not an array", desc.name()))
            })?
            .iter()
            .map(|entry| self.json_to_value(desc, owner, entry))
            .collect()
    }

    fn json_to_value(
        &self,
        desc: &PropertyDescriptor,
        owner: &Arc<ClassType>,
        json: &Json,
    ) -> Result<Value> {
        match desc.element() {
            element if element.is_class() => {
                let expected = element
                    .class_in(owner)
                    .expect("class element resolves to a class");
                match json {
                    Json::Null if desc.is_pointer() => Ok(Value::Null),
                    Json::Null => {
                        Err(PropertyError::NullDereference(desc.name().to_owned()).into())
                    }
                    _ => {
                        let object = self.json_to_object(json)?;
                        let ok = if desc.is_pointer() {
                            object.class().is_a(expected.hash())
                        } else {
                            object.class().hash() == expected.hash()
                        };
                        if !ok {
                            return Err(PropertyError::TypeMismatch {
                                property: desc.name().to_owned(),
                                expected: expected.name().to_owned(),
                                actual: object.class().name().to_owned(),
                            }
                            .into());
                        }
                        Ok(Value::Object(Box::new(object)))
                    }
                }
            }
            ElementType::Enum(enum_type) => self.json_to_enum(desc, enum_type, json),
            ElementType::Primitive(primitive) => json_to_primitive(desc, *primitive, json),
            _ => unreachable!("class elements are handled above"),
        }
    }

    fn json_to_enum(
        &self,
        desc: &PropertyDescriptor,
        enum_type: &EnumType,
        json: &Json,
    ) -> Result<Value> {
        if let Some(name) = json.as_str() {
            return match enum_type.value_of(name) {
                Some(value) => Ok(Value::Enum(value)),
                None => Err(EncodingError::Malformed(format!(
                    "unknown element '{name}' of {}",
                    enum_type.name()
                ))
                .into()),
            };
        }
        let value = json
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| malformed(desc, json))?;
        if !enum_type.is_valid(value) {
            if self.strict {
                return Err(EncodingError::UnknownTag {
                    context: enum_type.name().to_owned(),
                    value: i64::from(value),
                }
                .into());
            }
            warn!(
                value,
                enum_type = enum_type.name(),
                "Accepting unregistered enum value"
            );
        }
        Ok(Value::Enum(value))
    }
}

fn json_to_primitive(
    desc: &PropertyDescriptor,
    primitive: Primitive,
    json: &Json,
) -> Result<Value> {
    let value = match primitive {
        p if p.is_signed_int() => Value::Signed(json.as_i64().ok_or_else(|| malformed(desc, json))?),
        p if p.is_unsigned_int() => {
            Value::Unsigned(json.as_u64().ok_or_else(|| malformed(desc, json))?)
        }
        Primitive::F32 => Value::F32(OrderedFloat(
            json.as_f64().ok_or_else(|| malformed(desc, json))? as f32,
        )),
        Primitive::F64 => {
            Value::F64(OrderedFloat(json.as_f64().ok_or_else(|| malformed(desc, json))?))
        }
        Primitive::Gid => Value::Gid(json.as_u64().ok_or_else(|| malformed(desc, json))?),
        Primitive::Str => Value::Str(
            json.as_str()
                .ok_or_else(|| malformed(desc, json))?
                .to_owned(),
        ),
        Primitive::WStr => Value::WStr(
            json.as_str()
                .ok_or_else(|| malformed(desc, json))?
                .to_owned(),
        ),
        _ => unreachable!("integer primitives are handled above"),
    };
    Ok(value)
}

fn float_number(desc: &PropertyDescriptor, value: f64) -> Result<Json> {
    Number::from_f64(value)
        .map(Json::Number)
        .ok_or_else(|| EncodingError::NonFinite(desc.name().to_owned()).into())
}

fn malformed(desc: &PropertyDescriptor, json: &Json) -> crate::error::Error {
    EncodingError::Malformed(format!(
        "property '{}' cannot decode from {json}",
        desc.name()
    ))
    .into()
}
