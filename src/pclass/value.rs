use crate::{
    error::PropertyError,
    pclass::{
        object::PropertyObject,
        types::{ClassType, ElementType, Primitive, PropertyDescriptor},
    },
};
use ordered_float::OrderedFloat;
use std::sync::Arc;

/// A runtime value held by one slot of a property.
#[derive(Clone, PartialEq, Debug)]
pub enum Value {
    Signed(i64),
    Unsigned(u64),
    F32(OrderedFloat<f32>),
    F64(OrderedFloat<f64>),
    Str(String),
    WStr(String),
    Gid(u64),
    Enum(i32),
    Object(Box<PropertyObject>),
    Null,
}

impl Value {
    pub fn kind_label(&self) -> &'static str {
        match self {
            Value::Signed(_) => "signed integer",
            Value::Unsigned(_) => "unsigned integer",
            Value::F32(_) => "float",
            Value::F64(_) => "double",
            Value::Str(_) => "string",
            Value::WStr(_) => "wide string",
            Value::Gid(_) => "gid",
            Value::Enum(_) => "enum",
            Value::Object(_) => "object",
            Value::Null => "null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&PropertyObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut PropertyObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// The zero value stored in freshly created cells of `element`.
    ///
    /// Non-pointer class elements are expected to be populated by the class
    /// factory, which owns the recursion; this returns `Null` for them.
    pub(crate) fn default_for(element: &ElementType) -> Value {
        match element {
            ElementType::Primitive(p) => match p {
                Primitive::F32 => Value::F32(OrderedFloat(0.0)),
                Primitive::F64 => Value::F64(OrderedFloat(0.0)),
                Primitive::Str => Value::Str(String::new()),
                Primitive::WStr => Value::WStr(String::new()),
                Primitive::Gid => Value::Gid(0),
                p if p.is_signed_int() => Value::Signed(0),
                _ => Value::Unsigned(0),
            },
            ElementType::Enum(_) => Value::Enum(0),
            ElementType::Class(_) | ElementType::SelfClass => Value::Null,
        }
    }

    /// Validates `self` against a descriptor and normalizes it to the variant
    /// the descriptor's element type stores.
    pub(crate) fn conform(
        self,
        desc: &PropertyDescriptor,
        owner: &Arc<ClassType>,
    ) -> Result<Value, PropertyError> {
        let mismatch = |actual: &Value| PropertyError::TypeMismatch {
            property: desc.name().to_owned(),
            expected: desc.element().to_string(),
            actual: actual.kind_label().to_owned(),
        };

        match desc.element() {
            ElementType::Primitive(p) => conform_primitive(self, *p, desc),
            ElementType::Enum(e) => {
                let raw = match &self {
                    Value::Enum(v) => i64::from(*v),
                    Value::Signed(v) => *v,
                    _ => return Err(mismatch(&self)),
                };
                let value = i32::try_from(raw).map_err(|_| mismatch(&self))?;
                if !e.is_valid(value) {
                    return Err(PropertyError::TypeMismatch {
                        property: desc.name().to_owned(),
                        expected: e.name().to_owned(),
                        actual: format!("unregistered value {value}"),
                    });
                }
                Ok(Value::Enum(value))
            }
            element @ (ElementType::Class(_) | ElementType::SelfClass) => {
                let class = element
                    .class_in(owner)
                    .expect("class element resolves to a class");
                match self {
                    Value::Null if desc.is_pointer() => Ok(Value::Null),
                    Value::Object(obj) => {
                        let ok = if desc.is_pointer() {
                            obj.class().is_a(class.hash())
                        } else {
                            obj.class().hash() == class.hash()
                        };
                        if ok {
                            Ok(Value::Object(obj))
                        } else {
                            Err(PropertyError::TypeMismatch {
                                property: desc.name().to_owned(),
                                expected: class.name().to_owned(),
                                actual: obj.class().name().to_owned(),
                            })
                        }
                    }
                    other => Err(mismatch(&other)),
                }
            }
        }
    }
}

fn conform_primitive(
    value: Value,
    primitive: Primitive,
    desc: &PropertyDescriptor,
) -> Result<Value, PropertyError> {
    let mismatch = |actual: &Value| PropertyError::TypeMismatch {
        property: desc.name().to_owned(),
        expected: primitive.to_string(),
        actual: actual.kind_label().to_owned(),
    };

    if primitive.is_signed_int() {
        let raw = match &value {
            Value::Signed(v) => *v,
            Value::Unsigned(v) => i64::try_from(*v).map_err(|_| mismatch(&value))?,
            _ => return Err(mismatch(&value)),
        };
        let width = primitive.bit_width().expect("integer has a width");
        if width < 64 {
            let min = -(1i64 << (width - 1));
            let max = (1i64 << (width - 1)) - 1;
            if raw < min || raw > max {
                return Err(mismatch(&value));
            }
        }
        return Ok(Value::Signed(raw));
    }

    if primitive.is_unsigned_int() {
        let raw = match &value {
            Value::Unsigned(v) => *v,
            Value::Signed(v) => u64::try_from(*v).map_err(|_| mismatch(&value))?,
            _ => return Err(mismatch(&value)),
        };
        let width = primitive.bit_width().expect("integer has a width");
        if width < 64 && raw > (1u64 << width) - 1 {
            return Err(mismatch(&value));
        }
        return Ok(Value::Unsigned(raw));
    }

    match (primitive, value) {
        (Primitive::F32, Value::F32(v)) => Ok(Value::F32(v)),
        (Primitive::F64, Value::F64(v)) => Ok(Value::F64(v)),
        (Primitive::F64, Value::F32(v)) => Ok(Value::F64(OrderedFloat(f64::from(v.0)))),
        (Primitive::Str, Value::Str(s) | Value::WStr(s)) => Ok(Value::Str(s)),
        (Primitive::WStr, Value::Str(s) | Value::WStr(s)) => Ok(Value::WStr(s)),
        (Primitive::Gid, Value::Gid(v) | Value::Unsigned(v)) => Ok(Value::Gid(v)),
        (_, value) => Err(mismatch(&value)),
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Signed(v.into())
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Signed(v.into())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Signed(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Signed(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Unsigned(v.into())
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Unsigned(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Unsigned(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Unsigned(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(OrderedFloat(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(OrderedFloat(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<PropertyObject> for Value {
    fn from(v: PropertyObject) -> Self {
        Value::Object(Box::new(v))
    }
}
