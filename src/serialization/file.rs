use crate::{
    error::{FileError, Result},
    pclass::{PropertyObject, TypeSystem},
    serialization::{BinarySerializer, BinarySerializerFlags, JsonSerializer, XmlSerializer},
};
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Magic prefix of binary serialized files.
pub const BINARY_HEADER: &[u8; 4] = b"BINd";
/// Magic prefix of JSON serialized files.
pub const JSON_HEADER: &[u8; 4] = b"JSON";
/// Prolog emitted in front of XML serialized files.
pub const XML_PROLOG: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>"#;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum FileMode {
    Read,
    Write,
}

/// An on-disk serialized object in any of the three formats.
///
/// Writing prepends the format's magic; reading peeks the first four bytes
/// and dispatches to the right serializer, treating anything that is neither
/// `BINd` nor `JSON` as XML. All serialization happens in file mode.
#[derive(Debug)]
pub struct SerializedFile {
    path: PathBuf,
    mode: FileMode,
    newline: Vec<u8>,
    file: File,
}

impl SerializedFile {
    pub fn open(path: impl AsRef<Path>, mode: FileMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = match mode {
            FileMode::Read => File::open(&path),
            FileMode::Write => File::create(&path),
        }
        .map_err(FileError::IoFailed)?;
        Ok(Self {
            path,
            mode,
            newline: b"\n".to_vec(),
            file,
        })
    }

    /// Overrides the newline separator substituted into JSON and XML output.
    pub fn with_newline(mut self, newline: &[u8]) -> Self {
        self.newline = newline.to_vec();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the serialized object back, detecting the format from the
    /// header.
    pub fn read(&mut self, types: &TypeSystem) -> Result<PropertyObject> {
        if self.mode != FileMode::Read {
            return Err(FileError::BadMode("write").into());
        }
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(FileError::IoFailed)?;
        let mut data = Vec::new();
        self.file
            .read_to_end(&mut data)
            .map_err(FileError::IoFailed)?;

        // Make sure that there is at least enough data to determine which
        // serializer was used.
        if data.len() < 4 {
            return Err(FileError::ShortHeader.into());
        }

        if data[..4] == *BINARY_HEADER {
            debug!(path = %self.path.display(), "Reading binary serialized file");
            let serializer =
                BinarySerializer::new(types, true, BinarySerializerFlags::WRITE_SERIALIZER_FLAGS);
            serializer.deserialize(&data[4..])
        } else if data[..4] == *JSON_HEADER {
            debug!(path = %self.path.display(), "Reading JSON serialized file");
            let text = String::from_utf8_lossy(&data[4..]);
            JsonSerializer::new(types, true).load(&text)
        } else {
            debug!(path = %self.path.display(), "Reading XML serialized file");
            let text = String::from_utf8_lossy(&data);
            XmlSerializer::new(types, true).load(&text)
        }
    }

    /// Writes `object` in the binary format. The serializer flags word is
    /// always written so that `read` can recover the flags.
    pub fn write_binary(
        &mut self,
        types: &TypeSystem,
        object: &PropertyObject,
        flags: BinarySerializerFlags,
    ) -> Result<()> {
        self.check_writable()?;
        let flags = flags | BinarySerializerFlags::WRITE_SERIALIZER_FLAGS;
        let bytes = BinarySerializer::new(types, true, flags).serialize(object)?;
        let mut out = Vec::with_capacity(4 + bytes.len());
        out.extend_from_slice(BINARY_HEADER);
        out.extend_from_slice(&bytes);
        self.rewrite(&out)
    }

    /// Writes `object` in the JSON format.
    pub fn write_json(&mut self, types: &TypeSystem, object: &PropertyObject) -> Result<()> {
        self.check_writable()?;
        let data = JsonSerializer::new(types, true).save(object)?;
        let mut out = Vec::new();
        out.extend_from_slice(JSON_HEADER);
        out.extend_from_slice(&self.newline);
        out.extend_from_slice(&substitute_newlines(&data, &self.newline));
        self.rewrite(&out)
    }

    /// Writes `object` in the XML format, prolog included.
    pub fn write_xml(&mut self, types: &TypeSystem, object: &PropertyObject) -> Result<()> {
        self.check_writable()?;
        let data = XmlSerializer::new(types, true).save(object)?;
        let mut out = Vec::new();
        out.extend_from_slice(XML_PROLOG);
        out.extend_from_slice(&self.newline);
        out.extend_from_slice(&substitute_newlines(&data, &self.newline));
        self.rewrite(&out)
    }

    fn check_writable(&self) -> Result<()> {
        if self.mode != FileMode::Write {
            return Err(FileError::BadMode("read").into());
        }
        Ok(())
    }

    fn rewrite(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(FileError::IoFailed)?;
        self.file.write_all(data).map_err(FileError::IoFailed)?;
        Ok(())
    }
}

/// Replaces every LF in `data` with the configured separator, byte for byte.
fn substitute_newlines(data: &str, newline: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for byte in data.bytes() {
        if byte == b'\n' {
            out.extend_from_slice(newline);
        } else {
            out.push(byte);
        }
    }
    out
}
