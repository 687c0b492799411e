use crate::{
    error::{EncodingError, PropertyError, Result, TypeError},
    pclass::{
        Cardinality, ClassType, ElementType, EnumType, Primitive, PropertyCell,
        PropertyDescriptor, PropertyObject, TypeSystem, Value,
    },
};
use ordered_float::OrderedFloat;
use quick_xml::{
    events::{BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};
use std::sync::Arc;
use tracing::warn;

/// Root element wrapping the object in file mode.
pub const OBJECTS_ROOT: &str = "Objects";
/// Element name of a serialized class instance.
pub const CLASS_ELEMENT: &str = "Class";

/// Serializes property-class graphs to and from the XML form.
///
/// Every instance is a `<Class name="…">` element with one child element per
/// property; arrays and vectors repeat the property element. Enums are always
/// emitted by element name. The XML prolog is left to the file façade.
#[derive(Debug)]
pub struct XmlSerializer<'a> {
    types: &'a TypeSystem,
    is_file: bool,
    strict: bool,
}

impl<'a> XmlSerializer<'a> {
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
        let mut writer = if self.is_file {
            Writer::new_with_indent(Vec::new(), b' ', 2)
        } else {
            Writer::new(Vec::new())
        };

        if self.is_file {
            write_event(&mut writer, Event::Start(BytesStart::new(OBJECTS_ROOT)));
        }
        self.write_object(&mut writer, object)?;
        if self.is_file {
            write_event(&mut writer, Event::End(BytesEnd::new(OBJECTS_ROOT)));
        }

        Ok(String::from_utf8(writer.into_inner()).unwrap()) // SAFETY: the writer emits UTF-8
    }

    pub fn load(&self, data: &str) -> Result<PropertyObject> {
        let root = parse_document(data)?;
        let object_node = if root.name == OBJECTS_ROOT {
            root.children
                .first()
                .ok_or_else(|| EncodingError::Malformed("empty <Objects> root".to_owned()))?
        } else if root.name == CLASS_ELEMENT {
            &root
        } else {
            return Err(EncodingError::BadMagic(root.name).into());
        };
        self.node_to_object(object_node)
    }

    fn write_object(&self, writer: &mut Writer<Vec<u8>>, object: &PropertyObject) -> Result<()> {
        let mut start = BytesStart::new(CLASS_ELEMENT);
        start.push_attribute(("name", object.class().name()));
        write_event(writer, Event::Start(start));

        for property in object.properties() {
            let desc = property.descriptor();
            match property.cell() {
                PropertyCell::Scalar(value) => self.write_value(writer, desc, value)?,
                PropertyCell::Array(values) | PropertyCell::Vector(values) => {
                    for value in values {
                        self.write_value(writer, desc, value)?;
                    }
                }
            }
        }

        write_event(writer, Event::End(BytesEnd::new(CLASS_ELEMENT)));
        Ok(())
    }

    fn write_value(
        &self,
        writer: &mut Writer<Vec<u8>>,
        desc: &PropertyDescriptor,
        value: &Value,
    ) -> Result<()> {
        if value.is_null() {
            write_event(writer, Event::Empty(BytesStart::new(desc.name())));
            return Ok(());
        }

        write_event(writer, Event::Start(BytesStart::new(desc.name())));
        match value {
            Value::Object(object) => self.write_object(writer, object)?,
            Value::Enum(v) => {
                let text = self.enum_text(desc, *v)?;
                write_event(writer, Event::Text(BytesText::new(&text)));
            }
            other => {
                let text = scalar_text(other);
                write_event(writer, Event::Text(BytesText::new(&text)));
            }
        }
        write_event(writer, Event::End(BytesEnd::new(desc.name())));
        Ok(())
    }

    fn enum_text(&self, desc: &PropertyDescriptor, value: i32) -> Result<String> {
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
            Some(name) => Ok(name.to_owned()),
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
                Ok(value.to_string())
            }
        }
    }

    fn node_to_object(&self, node: &XmlNode) -> Result<PropertyObject> {
        if node.name != CLASS_ELEMENT {
            return Err(
                EncodingError::Malformed(format!("expected <Class>, found <{}>", node.name)).into(),
            );
        }
        let class_name = node
            .attr("name")
            .ok_or_else(|| EncodingError::Malformed("<Class> without a name".to_owned()))?;
        let ty = self.types.get(class_name)?;
        let class = Arc::clone(
            ty.as_class()
                .ok_or_else(|| TypeError::NotClass(ty.name().to_owned()))?,
        );

        let mut object = PropertyObject::create(&class);
        for (index, desc) in class.descriptors().iter().enumerate() {
            let entries: Vec<&XmlNode> = node
                .children
                .iter()
                .filter(|child| child.name == desc.name())
                .collect();

            let cell = match desc.cardinality() {
                Cardinality::Scalar => match entries.first() {
                    Some(entry) => PropertyCell::Scalar(self.node_to_value(desc, &class, entry)?),
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
                },
                Cardinality::Array(n) => {
                    if entries.len() != n {
                        return Err(PropertyError::OutOfRange {
                            property: desc.name().to_owned(),
                            index: entries.len(),
                            len: n,
                        }
                        .into());
                    }
                    PropertyCell::Array(
                        entries
                            .iter()
                            .map(|e| self.node_to_value(desc, &class, e))
                            .collect::<Result<_>>()?,
                    )
                }
                Cardinality::Vector => PropertyCell::Vector(
                    entries
                        .iter()
                        .map(|e| self.node_to_value(desc, &class, e))
                        .collect::<Result<_>>()?,
                ),
            };
            object.cells[index] = cell;
        }
        Ok(object)
    }

    fn node_to_value(
        &self,
        desc: &PropertyDescriptor,
        owner: &Arc<ClassType>,
        node: &XmlNode,
    ) -> Result<Value> {
        match desc.element() {
            element if element.is_class() => {
                let expected = element
                    .class_in(owner)
                    .expect("class element resolves to a class");
                let child = node.children.iter().find(|c| c.name == CLASS_ELEMENT);
                match child {
                    None if desc.is_pointer() => Ok(Value::Null),
                    None => Err(PropertyError::NullDereference(desc.name().to_owned()).into()),
                    Some(child) => {
                        let object = self.node_to_object(child)?;
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
            ElementType::Enum(enum_type) => self.text_to_enum(desc, enum_type, &node.text),
            ElementType::Primitive(primitive) => text_to_primitive(desc, *primitive, &node.text),
            _ => unreachable!("class elements are handled above"),
        }
    }

    fn text_to_enum(
        &self,
        desc: &PropertyDescriptor,
        enum_type: &EnumType,
        text: &str,
    ) -> Result<Value> {
        if let Some(value) = enum_type.value_of(text) {
            return Ok(Value::Enum(value));
        }
        let value: i32 = text.parse().map_err(|_| {
            EncodingError::Malformed(format!(
                "unknown element '{text}' of {} in property '{}'",
                enum_type.name(),
                desc.name()
            ))
        })?;
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

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Signed(v) => v.to_string(),
        Value::Unsigned(v) | Value::Gid(v) => v.to_string(),
        Value::F32(v) => v.0.to_string(),
        Value::F64(v) => v.0.to_string(),
        Value::Str(s) | Value::WStr(s) => s.clone(),
        Value::Enum(v) => v.to_string(),
        Value::Object(_) | Value::Null => String::new(),
    }
}

fn text_to_primitive(desc: &PropertyDescriptor, primitive: Primitive, text: &str) -> Result<Value> {
    let parse_error = || {
        EncodingError::Malformed(format!(
            "property '{}' cannot decode from '{text}'",
            desc.name()
        ))
    };
    let value = match primitive {
        p if p.is_signed_int() => Value::Signed(text.parse().map_err(|_| parse_error())?),
        p if p.is_unsigned_int() => Value::Unsigned(text.parse().map_err(|_| parse_error())?),
        Primitive::F32 => Value::F32(OrderedFloat(text.parse().map_err(|_| parse_error())?)),
        Primitive::F64 => Value::F64(OrderedFloat(text.parse().map_err(|_| parse_error())?)),
        Primitive::Gid => Value::Gid(text.parse().map_err(|_| parse_error())?),
        Primitive::Str => Value::Str(text.to_owned()),
        Primitive::WStr => Value::WStr(text.to_owned()),
        _ => unreachable!("integer primitives are handled above"),
    };
    Ok(value)
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) {
    writer.write_event(event).unwrap() // SAFETY: writing to a Vec cannot fail
}

/// A parsed element: name, attributes, concatenated text, child elements.
#[derive(Debug, Default)]
struct XmlNode {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<XmlNode>,
}

impl XmlNode {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Reads a document into a node tree, returning the root element.
fn parse_document(data: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(data);
    let mut stack: Vec<XmlNode> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| EncodingError::Malformed(e.to_string()))?;
        match event {
            Event::Start(start) => {
                stack.push(node_from_start(&start)?);
            }
            Event::Empty(start) => {
                let node = node_from_start(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Ok(node),
                }
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| EncodingError::Malformed("unbalanced end tag".to_owned()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Ok(node),
                }
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| EncodingError::Malformed(e.to_string()))?;
                if let Some(node) = stack.last_mut() {
                    // Indentation around child elements is not content.
                    if node.children.is_empty() || !text.trim().is_empty() {
                        node.text.push_str(&text);
                    }
                }
            }
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::CData(_) => {}
            Event::DocType(_) => {}
            Event::Eof => {
                return Err(EncodingError::Malformed("no root element".to_owned()).into());
            }
        }
    }
}

fn node_from_start(start: &BytesStart<'_>) -> Result<XmlNode> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| EncodingError::Malformed(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| EncodingError::Malformed(e.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(XmlNode {
        name,
        attrs,
        text: String::new(),
        children: Vec::new(),
    })
}
