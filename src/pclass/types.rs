use crate::pclass::object::PropertyObject;
use bitflags::bitflags;
use derive_more::Display;
use fxhash::FxHashMap;
use internment::Intern;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// The three categories a registered type can fall into.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Serialize, Deserialize,
)]
pub enum TypeKind {
    #[display("primitive")]
    Primitive,
    #[display("enum")]
    Enum,
    #[display("class")]
    Class,
}

/// A primitive wire type. The display form is the canonical registered name.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Serialize, Deserialize,
)]
pub enum Primitive {
    #[display("bi4")]
    I4,
    #[display("char")]
    I8,
    #[display("short")]
    I16,
    #[display("s24")]
    I24,
    #[display("int")]
    I32,
    #[display("long")]
    I64,
    #[display("bui4")]
    U4,
    #[display("unsigned char")]
    U8,
    #[display("unsigned short")]
    U16,
    #[display("u24")]
    U24,
    #[display("unsigned int")]
    U32,
    #[display("unsigned long")]
    U64,
    #[display("float")]
    F32,
    #[display("double")]
    F64,
    #[display("std::string")]
    Str,
    #[display("std::wstring")]
    WStr,
    #[display("gid")]
    Gid,
}

impl Primitive {
    /// Every primitive the type system pre-registers, in registration order.
    pub const ALL: [Primitive; 17] = [
        Primitive::I4,
        Primitive::I8,
        Primitive::I16,
        Primitive::I24,
        Primitive::I32,
        Primitive::I64,
        Primitive::U4,
        Primitive::U8,
        Primitive::U16,
        Primitive::U24,
        Primitive::U32,
        Primitive::U64,
        Primitive::F32,
        Primitive::F64,
        Primitive::Str,
        Primitive::WStr,
        Primitive::Gid,
    ];

    /// Bit width of a fixed-width primitive. Strings are length-prefixed and
    /// have no fixed width.
    pub fn bit_width(&self) -> Option<u32> {
        Some(match self {
            Primitive::I4 | Primitive::U4 => 4,
            Primitive::I8 | Primitive::U8 => 8,
            Primitive::I16 | Primitive::U16 => 16,
            Primitive::I24 | Primitive::U24 => 24,
            Primitive::I32 | Primitive::U32 | Primitive::F32 => 32,
            Primitive::I64 | Primitive::U64 | Primitive::F64 | Primitive::Gid => 64,
            Primitive::Str | Primitive::WStr => return None,
        })
    }

    pub fn is_signed_int(&self) -> bool {
        matches!(
            self,
            Primitive::I4
                | Primitive::I8
                | Primitive::I16
                | Primitive::I24
                | Primitive::I32
                | Primitive::I64
        )
    }

    pub fn is_unsigned_int(&self) -> bool {
        matches!(
            self,
            Primitive::U4
                | Primitive::U8
                | Primitive::U16
                | Primitive::U24
                | Primitive::U32
                | Primitive::U64
        )
    }
}

/// A primitive type as registered with a type system. The registered name is
/// usually the canonical one, but custom aliases may be registered on top.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PrimitiveType {
    pub(crate) name: Intern<String>,
    pub(crate) hash: u32,
    pub(crate) primitive: Primitive,
}

impl PrimitiveType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn primitive(&self) -> Primitive {
        self.primitive
    }
}

/// An enum type: a mapping between element names and 32-bit signed values.
#[derive(Clone, Debug)]
pub struct EnumType {
    pub(crate) name: Intern<String>,
    pub(crate) hash: u32,
    pub(crate) elements: Vec<(Intern<String>, i32)>,
    pub(crate) by_name: FxHashMap<Intern<String>, i32>,
    pub(crate) by_value: FxHashMap<i32, Intern<String>>,
}

impl EnumType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Registered elements, in registration order.
    pub fn elements(&self) -> &[(Intern<String>, i32)] {
        &self.elements
    }

    pub fn value_of(&self, element: &str) -> Option<i32> {
        self.by_name.get(&Intern::from_ref(element)).copied()
    }

    pub fn name_of(&self, value: i32) -> Option<&str> {
        self.by_value.get(&value).map(|n| n.as_str())
    }

    pub fn is_valid(&self, value: i32) -> bool {
        self.by_value.contains_key(&value)
    }
}

bitflags! {
    /// Behavioral flags carried by a property descriptor.
    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    pub struct PropertyFlags: u32 {
        const NONE = 0;
        const SAVE = 1 << 0;
        const COPY = 1 << 1;
        const PUBLIC = 1 << 2;
        const TRANSMIT = 1 << 3;
        const PERSIST = 1 << 5;
        const DEPRECATED = 1 << 6;
    }
}

impl Default for PropertyFlags {
    fn default() -> Self {
        PropertyFlags::SAVE | PropertyFlags::COPY
    }
}

/// How many values a property holds.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Cardinality {
    Scalar,
    /// A fixed-length array of exactly `n` values, no length prefix on the
    /// wire.
    Array(usize),
    /// A dynamically-sized vector, length-prefixed on the wire.
    Vector,
}

/// The resolved element type of a property.
///
/// Element types resolve at class registration, so classes must be registered
/// after the types their properties refer to. The one exception is a class
/// referring to itself (`SelfClass`), which resolves against the owning class
/// at use time.
#[derive(Clone, Debug)]
pub enum ElementType {
    Primitive(Primitive),
    Enum(Arc<EnumType>),
    Class(Arc<ClassType>),
    SelfClass,
}

impl ElementType {
    /// Resolves the element's class, if it is class-typed.
    pub fn class_in<'a>(&'a self, owner: &'a Arc<ClassType>) -> Option<&'a Arc<ClassType>> {
        match self {
            ElementType::Class(class) => Some(class),
            ElementType::SelfClass => Some(owner),
            _ => None,
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self, ElementType::Class(_) | ElementType::SelfClass)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Primitive(p) => p.fmt(f),
            ElementType::Enum(e) => f.write_str(e.name()),
            ElementType::Class(c) => f.write_str(c.name()),
            ElementType::SelfClass => f.write_str("<self>"),
        }
    }
}

/// Static metadata about one field of a property class.
#[derive(Clone, Debug)]
pub struct PropertyDescriptor {
    pub(crate) name: Intern<String>,
    pub(crate) element: ElementType,
    pub(crate) cardinality: Cardinality,
    pub(crate) is_pointer: bool,
    pub(crate) flags: PropertyFlags,
}

impl PropertyDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element(&self) -> &ElementType {
        &self.element
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_pointer(&self) -> bool {
        self.is_pointer
    }

    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }
}

/// Hook run on every freshly created instance of a class, typically to set
/// non-zero defaults.
pub type Initializer = Box<dyn Fn(&mut PropertyObject) + Send + Sync>;

/// A registered property class: an ordered descriptor list, an optional base
/// class, and the machinery to create instances.
pub struct ClassType {
    pub(crate) name: Intern<String>,
    pub(crate) hash: u32,
    pub(crate) base: Option<Arc<ClassType>>,
    /// Base descriptors first, own descriptors after, in declaration order.
    pub(crate) descriptors: Vec<PropertyDescriptor>,
    /// Hashes of this class and every base, nearest first.
    pub(crate) ancestors: Vec<u32>,
    pub(crate) initializer: Option<Initializer>,
}

impl ClassType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn base(&self) -> Option<&Arc<ClassType>> {
        self.base.as_ref()
    }

    /// The full ordered descriptor list, base descriptors included.
    pub fn descriptors(&self) -> &[PropertyDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, name: &str) -> Option<(usize, &PropertyDescriptor)> {
        self.descriptors
            .iter()
            .enumerate()
            .find(|(_, d)| d.name.as_str() == name)
    }

    /// Whether this class is `other` or a registered subclass of it.
    pub fn is_a(&self, other_hash: u32) -> bool {
        self.ancestors.contains(&other_hash)
    }
}

impl fmt::Debug for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassType")
            .field("name", &self.name)
            .field("hash", &self.hash)
            .field("base", &self.base.as_ref().map(|b| b.name()))
            .field("descriptors", &self.descriptors)
            .finish()
    }
}

impl PartialEq for ClassType {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for ClassType {}

/// A type descriptor held by the type system.
#[derive(Clone, Debug)]
pub enum Type {
    Primitive(Arc<PrimitiveType>),
    Enum(Arc<EnumType>),
    Class(Arc<ClassType>),
}

impl Type {
    pub fn name(&self) -> &str {
        match self {
            Type::Primitive(t) => t.name(),
            Type::Enum(t) => t.name(),
            Type::Class(t) => t.name(),
        }
    }

    pub fn hash(&self) -> u32 {
        match self {
            Type::Primitive(t) => t.hash(),
            Type::Enum(t) => t.hash(),
            Type::Class(t) => t.hash(),
        }
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            Type::Primitive(_) => TypeKind::Primitive,
            Type::Enum(_) => TypeKind::Enum,
            Type::Class(_) => TypeKind::Class,
        }
    }

    pub fn as_class(&self) -> Option<&Arc<ClassType>> {
        match self {
            Type::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&Arc<EnumType>> {
        match self {
            Type::Enum(e) => Some(e),
            _ => None,
        }
    }
}
