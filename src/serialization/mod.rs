use bitflags::bitflags;

pub use binary::BinarySerializer;
pub use file::{FileMode, SerializedFile};
pub use json::JsonSerializer;
pub use xml::XmlSerializer;

pub mod binary;
pub mod file;
pub mod json;
pub mod xml;

bitflags! {
    /// Framing options of the binary serializer.
    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    pub struct BinarySerializerFlags: u32 {
        const NONE = 0;
        /// Prepend the flags word to the payload when writing, and read it
        /// back before decoding.
        const WRITE_SERIALIZER_FLAGS = 1 << 0;
        /// zlib-deflate the payload, prefixed with its uncompressed size.
        const COMPRESSED = 1 << 3;
    }
}
