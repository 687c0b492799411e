use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type surfaced by the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    Dml(#[from] DmlError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Type registration and lookup failures.
///
/// Registration errors are raised eagerly; a misconfigured type registry is
/// a programming bug, not a runtime condition.
#[derive(Debug, Error)]
pub enum TypeError {
    #[error("A type has already been registered with the name '{0}'")]
    DuplicateName(String),

    #[error("The name '{name}' hashes to {hash:#010X}, which is already taken by '{existing}'")]
    HashCollision {
        name: String,
        existing: String,
        hash: u32,
    },

    #[error("No type is registered with the name '{0}'")]
    UnknownName(String),

    #[error("No type is registered with the hash {0:#010X}")]
    UnknownHash(u32),

    #[error("The type '{0}' is not a class type")]
    NotClass(String),

    #[error("The type '{0}' is not a primitive type")]
    NotPrimitive(String),
}

/// Property access failures on a live property-class instance.
#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("Index {index} is out of range for property '{property}' (length {len})")]
    OutOfRange {
        property: String,
        index: usize,
        len: usize,
    },

    #[error("Value of type '{actual}' cannot be stored in property '{property}' ({expected})")]
    TypeMismatch {
        property: String,
        expected: String,
        actual: String,
    },

    #[error("Property '{0}' holds a null value where an object is required")]
    NullDereference(String),

    #[error("No property named '{0}' is declared by the class")]
    UnknownProperty(String),
}

/// Wire-level encode/decode failures.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("Ran out of data while decoding ({needed} bits needed, {available} available)")]
    Truncated { needed: usize, available: usize },

    #[error("Byte-oriented access at bit position {0}, which is not on a byte boundary")]
    Misaligned(usize),

    #[error("Unknown tag {value} while decoding '{context}'")]
    UnknownTag { context: String, value: i64 },

    #[error("Unrecognized document root '{0}'")]
    BadMagic(String),

    #[error("Failed to decompress serialized data ({0})")]
    DecompressFailed(String),

    #[error("The value of '{0}' is not a finite number")]
    NonFinite(String),

    #[error("Length of '{what}' ({len}) does not fit the 16-bit length prefix")]
    LengthOverflow { what: String, len: usize },

    #[error("Malformed document ({0})")]
    Malformed(String),
}

/// Failures raised by the serialized-file façade.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("Not enough data to determine which serializer was used")]
    ShortHeader,

    #[error("File operation failed ({})", .0.kind())]
    IoFailed(#[from] io::Error),

    #[error("Operation is invalid for a file opened in {0} mode")]
    BadMode(&'static str),
}

/// DML record and message failures.
#[derive(Debug, Error)]
pub enum DmlError {
    #[error("Field '{field}' holds {expected} values, not {actual}")]
    ValueMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("A message template is already registered for service {service}, order {order}")]
    DuplicateTemplate { service: u8, order: u8 },

    #[error("No message template is registered under the name '{0}'")]
    UnknownTemplate(String),

    #[error("Encoded message is {0} bytes, which does not fit the 16-bit length field")]
    MessageTooLarge(usize),
}

/// Configuration tree failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("A child cannot be added without a name")]
    InvalidDefinition,

    #[error("Invalid value given for '{path}': {reason}")]
    InvalidData { path: String, reason: String },

    #[error("Invalid default value given for '{path}': expected {expected}")]
    InvalidDataType { path: String, expected: &'static str },

    #[error("No variable exists with the path '{0}'")]
    InvalidPath(String),

    #[error("Config data is missing required variables: {}", .0.join(", "))]
    MissingData(Vec<String>),

    #[error("Failed to read config file ({})", .0.kind())]
    FileError(#[from] io::Error),

    #[error("Failed to parse config data ({0})")]
    InvalidFormat(#[from] serde_yaml::Error),
}
