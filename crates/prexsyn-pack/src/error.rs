use std::io;

use thiserror::Error;

use crate::format::PackKind;

/// Errors that can occur while reading or writing `.pxs` files.
#[derive(Debug, Error)]
pub enum PackError {
    #[error("invalid magic bytes: expected PXS\\0")]
    InvalidMagic,

    #[error("unsupported format version {major}.{minor}.{patch}")]
    UnsupportedVersion { major: u8, minor: u8, patch: u8 },

    #[error("unknown payload kind byte {0:#04x}")]
    UnknownKind(u8),

    #[error("payload kind mismatch: expected {expected}, found {found}")]
    KindMismatch { expected: PackKind, found: PackKind },

    #[error("content hash mismatch: file is corrupted")]
    HashMismatch,

    #[error("file too small to be a valid PXS file")]
    FileTooSmall,

    /// The header declares more payload than the file holds.
    #[error("header declares a {declared}-byte payload but only {available} bytes are present")]
    PayloadLength { declared: u64, available: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, PackError>;
