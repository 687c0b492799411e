#![doc = include_str!("../README.md")]

pub use crate::bitio::{BitBuffer, BitPos, BitStream};
pub use crate::error::{
    ConfigError, DmlError, EncodingError, Error, FileError, PropertyError, Result, TypeError,
};

pub mod bitio;
pub mod config;
pub mod dml;
pub mod error;
pub mod pclass;
pub mod serialization;
