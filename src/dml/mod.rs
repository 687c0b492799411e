use crate::error::{DmlError, EncodingError};
use byteordered::ByteOrdered;
use derive_more::Display;
use internment::Intern;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use tracing::warn;

pub use message::{Message, MessageManager, MessageTemplate, MESSAGE_HEADER_SIZE};

pub mod message;

/// The primitive type of one DML field.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Serialize, Deserialize,
)]
pub enum DmlKind {
    #[display("BYT")]
    Byt,
    #[display("UBYT")]
    UByt,
    #[display("SHRT")]
    Shrt,
    #[display("USHRT")]
    UShrt,
    #[display("INT")]
    Int,
    #[display("UINT")]
    UInt,
    #[display("STR")]
    Str,
    #[display("WSTR")]
    WStr,
    #[display("FLT")]
    Flt,
    #[display("DBL")]
    Dbl,
    #[display("GID")]
    Gid,
}

/// The value of one DML field.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum DmlValue {
    Byt(i8),
    UByt(u8),
    Shrt(i16),
    UShrt(u16),
    Int(i32),
    UInt(u32),
    Str(String),
    WStr(String),
    Flt(OrderedFloat<f32>),
    Dbl(OrderedFloat<f64>),
    Gid(u64),
}

impl DmlValue {
    pub fn kind(&self) -> DmlKind {
        match self {
            DmlValue::Byt(_) => DmlKind::Byt,
            DmlValue::UByt(_) => DmlKind::UByt,
            DmlValue::Shrt(_) => DmlKind::Shrt,
            DmlValue::UShrt(_) => DmlKind::UShrt,
            DmlValue::Int(_) => DmlKind::Int,
            DmlValue::UInt(_) => DmlKind::UInt,
            DmlValue::Str(_) => DmlKind::Str,
            DmlValue::WStr(_) => DmlKind::WStr,
            DmlValue::Flt(_) => DmlKind::Flt,
            DmlValue::Dbl(_) => DmlKind::Dbl,
            DmlValue::Gid(_) => DmlKind::Gid,
        }
    }

    fn zero(kind: DmlKind) -> Self {
        match kind {
            DmlKind::Byt => DmlValue::Byt(0),
            DmlKind::UByt => DmlValue::UByt(0),
            DmlKind::Shrt => DmlValue::Shrt(0),
            DmlKind::UShrt => DmlValue::UShrt(0),
            DmlKind::Int => DmlValue::Int(0),
            DmlKind::UInt => DmlValue::UInt(0),
            DmlKind::Str => DmlValue::Str(String::new()),
            DmlKind::WStr => DmlValue::WStr(String::new()),
            DmlKind::Flt => DmlValue::Flt(OrderedFloat(0.0)),
            DmlKind::Dbl => DmlValue::Dbl(OrderedFloat(0.0)),
            DmlKind::Gid => DmlValue::Gid(0),
        }
    }
}

impl From<i8> for DmlValue {
    fn from(v: i8) -> Self {
        DmlValue::Byt(v)
    }
}

impl From<u8> for DmlValue {
    fn from(v: u8) -> Self {
        DmlValue::UByt(v)
    }
}

impl From<i16> for DmlValue {
    fn from(v: i16) -> Self {
        DmlValue::Shrt(v)
    }
}

impl From<u16> for DmlValue {
    fn from(v: u16) -> Self {
        DmlValue::UShrt(v)
    }
}

impl From<i32> for DmlValue {
    fn from(v: i32) -> Self {
        DmlValue::Int(v)
    }
}

impl From<u32> for DmlValue {
    fn from(v: u32) -> Self {
        DmlValue::UInt(v)
    }
}

impl From<f32> for DmlValue {
    fn from(v: f32) -> Self {
        DmlValue::Flt(OrderedFloat(v))
    }
}

impl From<f64> for DmlValue {
    fn from(v: f64) -> Self {
        DmlValue::Dbl(OrderedFloat(v))
    }
}

impl From<&str> for DmlValue {
    fn from(v: &str) -> Self {
        DmlValue::Str(v.to_owned())
    }
}

impl From<String> for DmlValue {
    fn from(v: String) -> Self {
        DmlValue::Str(v)
    }
}

/// One named, typed field of a [`Record`].
#[derive(Clone, PartialEq, Debug)]
pub struct DmlField {
    name: Intern<String>,
    kind: DmlKind,
    transferable: bool,
    value: DmlValue,
}

impl DmlField {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DmlKind {
        self.kind
    }

    /// Whether this field contributes bytes to the encoded record.
    pub fn transferable(&self) -> bool {
        self.transferable
    }

    pub fn value(&self) -> &DmlValue {
        &self.value
    }

    /// Sets the field's value. The value must match the field's kind; `STR`
    /// values are accepted by `WSTR` fields and converted.
    pub fn set(&mut self, value: impl Into<DmlValue>) -> Result<(), DmlError> {
        let value = match (self.kind, value.into()) {
            (DmlKind::WStr, DmlValue::Str(s)) => DmlValue::WStr(s),
            (DmlKind::Gid, DmlValue::UInt(v)) => DmlValue::Gid(u64::from(v)),
            (_, value) => value,
        };
        if value.kind() != self.kind {
            return Err(DmlError::ValueMismatch {
                field: self.name.to_string(),
                expected: kind_label(self.kind),
                actual: kind_label(value.kind()),
            });
        }
        self.value = value;
        Ok(())
    }

    /// Encoded size of this field's value, in bytes.
    pub fn encoded_size(&self) -> usize {
        match &self.value {
            DmlValue::Byt(_) | DmlValue::UByt(_) => 1,
            DmlValue::Shrt(_) | DmlValue::UShrt(_) => 2,
            DmlValue::Int(_) | DmlValue::UInt(_) | DmlValue::Flt(_) => 4,
            DmlValue::Dbl(_) | DmlValue::Gid(_) => 8,
            DmlValue::Str(s) => 2 + s.len(),
            DmlValue::WStr(s) => 2 + 2 * s.encode_utf16().count(),
        }
    }

    fn write_to<W: Write>(&self, w: &mut LittleEndianOrdered<W>) -> io::Result<()> {
        match &self.value {
            DmlValue::Byt(v) => w.write_i8(*v),
            DmlValue::UByt(v) => w.write_u8(*v),
            DmlValue::Shrt(v) => w.write_i16(*v),
            DmlValue::UShrt(v) => w.write_u16(*v),
            DmlValue::Int(v) => w.write_i32(*v),
            DmlValue::UInt(v) => w.write_u32(*v),
            DmlValue::Flt(v) => w.write_f32(v.0),
            DmlValue::Dbl(v) => w.write_f64(v.0),
            DmlValue::Gid(v) => w.write_u64(*v),
            DmlValue::Str(s) => {
                w.write_u16(s.len() as u16)?;
                for byte in s.as_bytes() {
                    w.write_u8(*byte)?;
                }
                Ok(())
            }
            DmlValue::WStr(s) => {
                let units: Vec<u16> = s.encode_utf16().collect();
                w.write_u16(units.len() as u16)?;
                for unit in units {
                    w.write_u16(unit)?;
                }
                Ok(())
            }
        }
    }

    fn read_from<R: Read>(&mut self, r: &mut LittleEndianOrdered<R>) -> io::Result<()> {
        self.value = match self.kind {
            DmlKind::Byt => DmlValue::Byt(r.read_i8()?),
            DmlKind::UByt => DmlValue::UByt(r.read_u8()?),
            DmlKind::Shrt => DmlValue::Shrt(r.read_i16()?),
            DmlKind::UShrt => DmlValue::UShrt(r.read_u16()?),
            DmlKind::Int => DmlValue::Int(r.read_i32()?),
            DmlKind::UInt => DmlValue::UInt(r.read_u32()?),
            DmlKind::Flt => DmlValue::Flt(OrderedFloat(r.read_f32()?)),
            DmlKind::Dbl => DmlValue::Dbl(OrderedFloat(r.read_f64()?)),
            DmlKind::Gid => DmlValue::Gid(r.read_u64()?),
            DmlKind::Str => {
                let len = r.read_u16()? as usize;
                let mut bytes = Vec::with_capacity(len);
                for _ in 0..len {
                    bytes.push(r.read_u8()?);
                }
                DmlValue::Str(String::from_utf8_lossy(&bytes).into_owned())
            }
            DmlKind::WStr => {
                let len = r.read_u16()? as usize;
                let mut units = Vec::with_capacity(len);
                for _ in 0..len {
                    units.push(r.read_u16()?);
                }
                DmlValue::WStr(String::from_utf16_lossy(&units))
            }
        };
        Ok(())
    }
}

/// Little-endian wrapper used by the record codec.
pub(crate) type LittleEndianOrdered<T> =
    ByteOrdered<T, byteordered::StaticEndianness<byteordered::byteorder::LittleEndian>>;

fn kind_label(kind: DmlKind) -> &'static str {
    match kind {
        DmlKind::Byt => "BYT",
        DmlKind::UByt => "UBYT",
        DmlKind::Shrt => "SHRT",
        DmlKind::UShrt => "USHRT",
        DmlKind::Int => "INT",
        DmlKind::UInt => "UINT",
        DmlKind::Str => "STR",
        DmlKind::WStr => "WSTR",
        DmlKind::Flt => "FLT",
        DmlKind::Dbl => "DBL",
        DmlKind::Gid => "GID",
    }
}

/// An ordered, named-field record of primitive values.
///
/// Insertion order is the wire order; fields marked non-transferable occupy
/// no bytes in the encoded form and are skipped on decode.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Record {
    fields: Vec<DmlField>,
}

macro_rules! dml_field_accessors {
    ($(($kind:ident, $add:ident, $has:ident, $get:ident, $get_mut:ident)),* $(,)?) => {
        impl Record {
            $(
                pub fn $add(&mut self, name: &str, transferable: bool) -> Option<&mut DmlField> {
                    self.add_field(name, DmlKind::$kind, transferable)
                }

                pub fn $has(&self, name: &str) -> bool {
                    self.get_field(name, DmlKind::$kind).is_some()
                }

                pub fn $get(&self, name: &str) -> Option<&DmlField> {
                    self.get_field(name, DmlKind::$kind)
                }

                pub fn $get_mut(&mut self, name: &str) -> Option<&mut DmlField> {
                    self.get_field_mut(name, DmlKind::$kind)
                }
            )*
        }
    };
}

dml_field_accessors![
    (Byt, add_byt_field, has_byt_field, get_byt_field, get_byt_field_mut),
    (UByt, add_ubyt_field, has_ubyt_field, get_ubyt_field, get_ubyt_field_mut),
    (Shrt, add_shrt_field, has_shrt_field, get_shrt_field, get_shrt_field_mut),
    (UShrt, add_ushrt_field, has_ushrt_field, get_ushrt_field, get_ushrt_field_mut),
    (Int, add_int_field, has_int_field, get_int_field, get_int_field_mut),
    (UInt, add_uint_field, has_uint_field, get_uint_field, get_uint_field_mut),
    (Str, add_str_field, has_str_field, get_str_field, get_str_field_mut),
    (WStr, add_wstr_field, has_wstr_field, get_wstr_field, get_wstr_field_mut),
    (Flt, add_flt_field, has_flt_field, get_flt_field, get_flt_field_mut),
    (Dbl, add_dbl_field, has_dbl_field, get_dbl_field, get_dbl_field_mut),
    (Gid, add_gid_field, has_gid_field, get_gid_field, get_gid_field_mut),
];

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, or returns the existing one when `name` is already
    /// declared with the same kind. A name declared with a different kind
    /// yields `None`.
    pub fn add_field(
        &mut self,
        name: &str,
        kind: DmlKind,
        transferable: bool,
    ) -> Option<&mut DmlField> {
        if let Some(index) = self.index_of(name) {
            if self.fields[index].kind == kind {
                return Some(&mut self.fields[index]);
            }
            warn!(
                field = name,
                existing = %self.fields[index].kind,
                requested = %kind,
                "Field already declared with a different kind"
            );
            return None;
        }
        self.fields.push(DmlField {
            name: Intern::from_ref(name),
            kind,
            transferable,
            value: DmlValue::zero(kind),
        });
        self.fields.last_mut()
    }

    pub fn get_field(&self, name: &str, kind: DmlKind) -> Option<&DmlField> {
        self.index_of(name)
            .map(|i| &self.fields[i])
            .filter(|f| f.kind == kind)
    }

    pub fn get_field_mut(&mut self, name: &str, kind: DmlKind) -> Option<&mut DmlField> {
        match self.index_of(name) {
            Some(i) if self.fields[i].kind == kind => Some(&mut self.fields[i]),
            _ => None,
        }
    }

    /// Whether a field with `name` exists, of any kind.
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Fields, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &DmlField> {
        self.fields.iter()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Encoded size in bytes of all transferable fields.
    pub fn size(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| f.transferable)
            .map(|f| f.encoded_size())
            .sum()
    }

    /// Encodes the transferable fields, in insertion order, to a
    /// little-endian byte blob.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteOrdered::le(Vec::with_capacity(self.size()));
        for field in self.fields.iter().filter(|f| f.transferable) {
            field.write_to(&mut w).unwrap(); // SAFETY: writing to a Vec cannot fail
        }
        w.into_inner()
    }

    /// Decodes the transferable fields, in insertion order, from a
    /// little-endian byte blob.
    pub fn from_bytes(&mut self, bytes: &[u8]) -> Result<(), EncodingError> {
        let available = bytes.len() * 8;
        let mut r = ByteOrdered::le(io::Cursor::new(bytes));
        for index in 0..self.fields.len() {
            if !self.fields[index].transferable {
                continue;
            }
            self.fields[index]
                .read_from(&mut r)
                .map_err(|_| EncodingError::Truncated {
                    needed: self.size() * 8,
                    available,
                })?;
        }
        Ok(())
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name.as_str() == name)
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = &'a DmlField;
    type IntoIter = std::slice::Iter<'a, DmlField>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
