use crate::{
    bitio::{BitBuffer, BitPos, BitStream},
    error::{EncodingError, PropertyError, Result, TypeError},
    pclass::{
        Cardinality, ClassType, ElementType, Primitive, PropertyCell, PropertyDescriptor,
        PropertyObject, TypeSystem, Value,
    },
    serialization::BinarySerializerFlags,
};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use ordered_float::OrderedFloat;
use std::{
    io::{Read, Write},
    sync::Arc,
};
use tracing::{debug, warn};

/// Serializes property-class graphs to and from the compact binary form.
///
/// Regular mode (`is_file = false`) is bit-packed with no alignment between
/// properties; file mode byte-aligns every property and frames every object
/// with a bit-size word, making the output suitable for persistent files.
#[derive(Debug)]
pub struct BinarySerializer<'a> {
    types: &'a TypeSystem,
    is_file: bool,
    flags: BinarySerializerFlags,
    strict: bool,
}

impl<'a> BinarySerializer<'a> {
    pub fn new(types: &'a TypeSystem, is_file: bool, flags: BinarySerializerFlags) -> Self {
        Self {
            types,
            is_file,
            flags,
            strict: true,
        }
    }

    /// Allows decoding to continue past unknown class hashes (file mode) and
    /// unregistered enum values, leaving null slots behind.
    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }

    pub fn flags(&self) -> BinarySerializerFlags {
        self.flags
    }

    /// Serializes `object` into a fresh byte vector.
    pub fn serialize(&self, object: &PropertyObject) -> Result<Vec<u8>> {
        let mut buffer = BitBuffer::new();
        let mut stream = BitStream::new(&mut buffer);
        self.save(object, &mut stream)?;
        let len = stream.tell().as_bytes();
        let mut bytes = buffer.into_vec();
        bytes.truncate(len);
        Ok(bytes)
    }

    /// Deserializes an object from `bytes`.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<PropertyObject> {
        let mut buffer = BitBuffer::from_vec(bytes.to_vec());
        let mut stream = BitStream::new(&mut buffer);
        self.load(&mut stream)
    }

    /// Serializes `object` at the stream's cursor.
    pub fn save(&self, object: &PropertyObject, stream: &mut BitStream) -> Result<()> {
        if self
            .flags
            .contains(BinarySerializerFlags::WRITE_SERIALIZER_FLAGS)
        {
            stream.write_bits(u64::from(self.flags.bits()), 32);
        }

        if self.flags.contains(BinarySerializerFlags::COMPRESSED) {
            let mut scratch = BitBuffer::new();
            let body_len = {
                let mut body = BitStream::new(&mut scratch);
                self.save_object(Some(object), &mut body)?;
                body.tell().as_bytes()
            };

            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(&scratch.as_slice()[..body_len])
                .unwrap(); // SAFETY: compressing into a Vec cannot fail
            let compressed = encoder.finish().unwrap(); // SAFETY: as above

            stream.write_bits(body_len as u64, 32);
            stream.write_bytes(&compressed)?;
            return Ok(());
        }

        self.save_object(Some(object), stream)
    }

    /// Deserializes an object at the stream's cursor.
    pub fn load(&self, stream: &mut BitStream) -> Result<PropertyObject> {
        let mut flags = self.flags;
        if self
            .flags
            .contains(BinarySerializerFlags::WRITE_SERIALIZER_FLAGS)
        {
            let raw = stream.read_bits(32)? as u32;
            flags = BinarySerializerFlags::from_bits_truncate(raw);
        }

        if flags.contains(BinarySerializerFlags::COMPRESSED) {
            let expected = stream.read_bits(32)? as usize;
            let compressed_len = stream.remaining_bits() / 8;
            let compressed = stream.read_bytes(compressed_len)?.to_vec();

            let mut inflated = Vec::with_capacity(expected);
            ZlibDecoder::new(compressed.as_slice())
                .read_to_end(&mut inflated)
                .map_err(|e| EncodingError::DecompressFailed(e.to_string()))?;
            if inflated.len() != expected {
                return Err(EncodingError::DecompressFailed(format!(
                    "inflated to {} bytes, expected {expected}",
                    inflated.len()
                ))
                .into());
            }

            let mut buffer = BitBuffer::from_vec(inflated);
            let mut body = BitStream::new(&mut buffer);
            return self.load_root(&mut body);
        }

        self.load_root(stream)
    }

    fn load_root(&self, stream: &mut BitStream) -> Result<PropertyObject> {
        self.load_object(stream)?
            .ok_or_else(|| PropertyError::NullDereference("<root>".to_owned()).into())
    }

    fn save_object(&self, object: Option<&PropertyObject>, stream: &mut BitStream) -> Result<()> {
        if !self.is_file {
            return match object {
                Some(object) => {
                    stream.write_bits(u64::from(object.class().hash()), 32);
                    self.save_properties(object, stream)
                }
                None => {
                    stream.write_bits(0, 32);
                    Ok(())
                }
            };
        }

        // File-mode frame: a bit-size word covering the hash and payload,
        // then the hash, then byte-aligned properties.
        stream.align_to_byte();
        let size_pos = stream.tell();
        stream.write_bits(0, 32);
        match object {
            Some(object) => {
                stream.write_bits(u64::from(object.class().hash()), 32);
                self.save_properties(object, stream)?;
            }
            None => stream.write_bits(0, 32),
        }

        let end = stream.tell();
        let size_bits = end.bits() - size_pos.bits() - 32;
        stream.seek(size_pos);
        stream.write_bits(size_bits as u64, 32);
        stream.seek(end);
        stream.align_to_byte();
        Ok(())
    }

    fn save_properties(&self, object: &PropertyObject, stream: &mut BitStream) -> Result<()> {
        for property in object.properties() {
            let desc = property.descriptor();
            if self.is_file {
                stream.align_to_byte();
            }
            match property.cell() {
                PropertyCell::Scalar(value) => self.save_value(desc, value, stream)?,
                PropertyCell::Array(values) => {
                    for value in values {
                        self.save_value(desc, value, stream)?;
                    }
                }
                PropertyCell::Vector(values) => {
                    stream.write_bits(values.len() as u64, 32);
                    for value in values {
                        self.save_value(desc, value, stream)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn save_value(
        &self,
        desc: &PropertyDescriptor,
        value: &Value,
        stream: &mut BitStream,
    ) -> Result<()> {
        match desc.element() {
            element if element.is_class() => {
                let object = match value {
                    Value::Object(object) => Some(object.as_ref()),
                    Value::Null => None,
                    other => return Err(type_mismatch(desc, other).into()),
                };
                if desc.is_pointer() {
                    stream.write_bits(u64::from(object.is_some()), 1);
                    match object {
                        Some(object) => self.save_object(Some(object), stream),
                        None => Ok(()),
                    }
                } else {
                    let object = object.ok_or_else(|| {
                        PropertyError::NullDereference(desc.name().to_owned())
                    })?;
                    self.save_object(Some(object), stream)
                }
            }
            ElementType::Enum(_) => match value {
                Value::Enum(v) => {
                    stream.write_bits(u64::from(*v as u32), 32);
                    Ok(())
                }
                other => Err(type_mismatch(desc, other).into()),
            },
            ElementType::Primitive(primitive) => {
                self.save_primitive(desc, *primitive, value, stream)
            }
            _ => unreachable!("class elements are handled above"),
        }
    }

    fn save_primitive(
        &self,
        desc: &PropertyDescriptor,
        primitive: Primitive,
        value: &Value,
        stream: &mut BitStream,
    ) -> Result<()> {
        match (primitive, value) {
            (p, Value::Signed(v)) if p.is_signed_int() => {
                let width = p.bit_width().unwrap(); // SAFETY: integers always have a width
                stream.write_bits(*v as u64 & width_mask(width), width);
                Ok(())
            }
            (p, Value::Unsigned(v)) if p.is_unsigned_int() => {
                let width = p.bit_width().unwrap(); // SAFETY: integers always have a width
                stream.write_bits(*v & width_mask(width), width);
                Ok(())
            }
            (Primitive::F32, Value::F32(v)) => {
                stream.write_bits(u64::from(v.0.to_bits()), 32);
                Ok(())
            }
            (Primitive::F64, Value::F64(v)) => {
                stream.write_bits(v.0.to_bits(), 64);
                Ok(())
            }
            (Primitive::Gid, Value::Gid(v)) => {
                stream.write_bits(*v, 64);
                Ok(())
            }
            (Primitive::Str, Value::Str(s)) => {
                let bytes = s.as_bytes();
                let len = checked_len(desc, bytes.len())?;
                stream.write_bits(u64::from(len), 16);
                for byte in bytes {
                    stream.write_bits(u64::from(*byte), 8);
                }
                Ok(())
            }
            (Primitive::WStr, Value::WStr(s)) => {
                let units: Vec<u16> = s.encode_utf16().collect();
                let len = checked_len(desc, units.len())?;
                stream.write_bits(u64::from(len), 16);
                for unit in units {
                    stream.write_bits(u64::from(unit), 16);
                }
                Ok(())
            }
            (_, value) => Err(type_mismatch(desc, value).into()),
        }
    }

    fn load_object(&self, stream: &mut BitStream) -> Result<Option<PropertyObject>> {
        if !self.is_file {
            let hash = stream.read_bits(32)? as u32;
            if hash == 0 {
                return Ok(None);
            }
            let class = self.resolve_class(hash)?;
            let mut object = PropertyObject::create(&class);
            self.load_properties(&mut object, stream)?;
            return Ok(Some(object));
        }

        stream.align_to_byte();
        let size_bits = stream.read_bits(32)? as usize;
        let frame_start = stream.tell();
        let hash = stream.read_bits(32)? as u32;
        if hash == 0 {
            stream.align_to_byte();
            return Ok(None);
        }

        let class = match self.resolve_class(hash) {
            Ok(class) => class,
            Err(_) if !self.strict => {
                // The frame size lets us skip what we cannot understand.
                warn!(hash, "Skipping object with an unknown class hash");
                stream.seek(BitPos::from_bits(frame_start.bits() + size_bits));
                stream.align_to_byte();
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let mut object = PropertyObject::create(&class);
        self.load_properties(&mut object, stream)?;
        debug_assert_eq!(stream.tell().bits() - frame_start.bits(), size_bits);
        stream.align_to_byte();
        debug!(class = class.name(), "Loaded object frame");
        Ok(Some(object))
    }

    fn resolve_class(&self, hash: u32) -> Result<Arc<ClassType>> {
        let ty = self.types.get_by_hash(hash)?;
        let class = ty
            .as_class()
            .ok_or_else(|| TypeError::NotClass(ty.name().to_owned()))?;
        Ok(Arc::clone(class))
    }

    fn load_properties(&self, object: &mut PropertyObject, stream: &mut BitStream) -> Result<()> {
        let class = Arc::clone(object.class());
        for (index, desc) in class.descriptors().iter().enumerate() {
            if self.is_file {
                stream.align_to_byte();
            }
            let cell = match desc.cardinality() {
                Cardinality::Scalar => {
                    PropertyCell::Scalar(self.load_value(desc, &class, stream)?)
                }
                Cardinality::Array(n) => {
                    let mut values = Vec::with_capacity(n);
                    for _ in 0..n {
                        values.push(self.load_value(desc, &class, stream)?);
                    }
                    PropertyCell::Array(values)
                }
                Cardinality::Vector => {
                    let count = stream.read_bits(32)? as usize;
                    let mut values = Vec::with_capacity(count.min(4096));
                    for _ in 0..count {
                        values.push(self.load_value(desc, &class, stream)?);
                    }
                    PropertyCell::Vector(values)
                }
            };
            object.cells[index] = cell;
        }
        Ok(())
    }

    fn load_value(
        &self,
        desc: &PropertyDescriptor,
        owner: &Arc<ClassType>,
        stream: &mut BitStream,
    ) -> Result<Value> {
        match desc.element() {
            element if element.is_class() => {
                let expected = element
                    .class_in(owner)
                    .expect("class element resolves to a class");
                if desc.is_pointer() {
                    if stream.read_bits(1)? == 0 {
                        return Ok(Value::Null);
                    }
                    match self.load_object(stream)? {
                        Some(object) if object.class().is_a(expected.hash()) => {
                            Ok(Value::Object(Box::new(object)))
                        }
                        Some(object) => Err(PropertyError::TypeMismatch {
                            property: desc.name().to_owned(),
                            expected: expected.name().to_owned(),
                            actual: object.class().name().to_owned(),
                        }
                        .into()),
                        None => Ok(Value::Null),
                    }
                } else {
                    match self.load_object(stream)? {
                        Some(object) if object.class().hash() == expected.hash() => {
                            Ok(Value::Object(Box::new(object)))
                        }
                        Some(object) => Err(PropertyError::TypeMismatch {
                            property: desc.name().to_owned(),
                            expected: expected.name().to_owned(),
                            actual: object.class().name().to_owned(),
                        }
                        .into()),
                        None => {
                            Err(PropertyError::NullDereference(desc.name().to_owned()).into())
                        }
                    }
                }
            }
            ElementType::Enum(enum_type) => {
                let raw = stream.read_bits(32)? as u32 as i32;
                if !enum_type.is_valid(raw) {
                    if self.strict {
                        return Err(EncodingError::UnknownTag {
                            context: enum_type.name().to_owned(),
                            value: i64::from(raw),
                        }
                        .into());
                    }
                    warn!(
                        value = raw,
                        enum_type = enum_type.name(),
                        "Accepting unregistered enum value"
                    );
                }
                Ok(Value::Enum(raw))
            }
            ElementType::Primitive(primitive) => self.load_primitive(*primitive, stream),
            _ => unreachable!("class elements are handled above"),
        }
    }

    fn load_primitive(&self, primitive: Primitive, stream: &mut BitStream) -> Result<Value> {
        Ok(match primitive {
            p if p.is_signed_int() => {
                let width = p.bit_width().unwrap(); // SAFETY: integers always have a width
                Value::Signed(stream.read_signed_bits(width)?)
            }
            p if p.is_unsigned_int() => {
                let width = p.bit_width().unwrap(); // SAFETY: integers always have a width
                Value::Unsigned(stream.read_bits(width)?)
            }
            Primitive::F32 => Value::F32(OrderedFloat(f32::from_bits(
                stream.read_bits(32)? as u32,
            ))),
            Primitive::F64 => Value::F64(OrderedFloat(f64::from_bits(stream.read_bits(64)?))),
            Primitive::Gid => Value::Gid(stream.read_bits(64)?),
            Primitive::Str => {
                let len = stream.read_bits(16)? as usize;
                let mut bytes = Vec::with_capacity(len);
                for _ in 0..len {
                    bytes.push(stream.read_bits(8)? as u8);
                }
                Value::Str(String::from_utf8_lossy(&bytes).into_owned())
            }
            Primitive::WStr => {
                let len = stream.read_bits(16)? as usize;
                let mut units = Vec::with_capacity(len);
                for _ in 0..len {
                    units.push(stream.read_bits(16)? as u16);
                }
                Value::WStr(String::from_utf16_lossy(&units))
            }
            _ => unreachable!("integer primitives are handled above"),
        })
    }
}

fn width_mask(width: u32) -> u64 {
    if width == 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn checked_len(desc: &PropertyDescriptor, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| {
        EncodingError::LengthOverflow {
            what: desc.name().to_owned(),
            len,
        }
        .into()
    })
}

fn type_mismatch(desc: &PropertyDescriptor, value: &Value) -> PropertyError {
    PropertyError::TypeMismatch {
        property: desc.name().to_owned(),
        expected: desc.element().to_string(),
        actual: value.kind_label().to_owned(),
    }
}
