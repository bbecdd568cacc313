//! PXS binary format implementation.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{PackError, Result};

/// Magic bytes identifying a PXS file: "PXS\0"
pub const MAGIC: [u8; 4] = [0x50, 0x58, 0x53, 0x00];

/// 4 (magic) + 3 (version) + 1 (flags) + 1 (kind) + 8 (item count) + 8 (payload len)
const HEADER_SIZE: usize = 25;

const HASH_SIZE: usize = 32;

/// PXS format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl PackVersion {
    pub const CURRENT: PackVersion = PackVersion {
        major: 0,
        minor: 1,
        patch: 0,
    };

    /// Same major version and a minor version no newer than ours.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major && self.minor <= Self::CURRENT.minor
    }
}

impl fmt::Display for PackVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// PXS format flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackFlags {
    bits: u8,
}

impl PackFlags {
    pub const NONE: PackFlags = PackFlags { bits: 0 };

    /// A chemical space carrying secondary building blocks.
    pub const HAS_SECONDARY: u8 = 0x01;

    /// A chemical space whose primary index has been built.
    pub const HAS_INDEX: u8 = 0x02;

    pub fn new(bits: u8) -> Self {
        Self { bits }
    }

    pub fn has(&self, flag: u8) -> bool {
        self.bits & flag != 0
    }

    pub fn set(&mut self, flag: u8) {
        self.bits |= flag;
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }
}

/// What a PXS payload holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PackKind {
    BuildingBlocks = 1,
    Reactions = 2,
    ChemicalSpace = 3,
    Synthesis = 4,
    SynthesisVector = 5,
}

impl PackKind {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(PackKind::BuildingBlocks),
            2 => Ok(PackKind::Reactions),
            3 => Ok(PackKind::ChemicalSpace),
            4 => Ok(PackKind::Synthesis),
            5 => Ok(PackKind::SynthesisVector),
            other => Err(PackError::UnknownKind(other)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PackKind::BuildingBlocks => "building-blocks",
            PackKind::Reactions => "reactions",
            PackKind::ChemicalSpace => "chemical-space",
            PackKind::Synthesis => "synthesis",
            PackKind::SynthesisVector => "synthesis-vector",
        }
    }
}

impl fmt::Display for PackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value that can be stored as the payload of a PXS file.
pub trait Packable: Serialize + DeserializeOwned {
    const KIND: PackKind;

    /// Number of top-level items, recorded in the header for inspection.
    fn item_count(&self) -> u64;

    fn flags(&self) -> PackFlags {
        PackFlags::NONE
    }
}

/// Decoded fixed header of a PXS file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackHeader {
    pub version: PackVersion,
    pub flags: PackFlags,
    pub kind: PackKind,
    pub item_count: u64,
    pub payload_len: u64,
}

impl PackHeader {
    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(PackError::FileTooSmall);
        }
        if data[0..4] != MAGIC {
            return Err(PackError::InvalidMagic);
        }
        let version = PackVersion {
            major: data[4],
            minor: data[5],
            patch: data[6],
        };
        if !version.is_compatible() {
            return Err(PackError::UnsupportedVersion {
                major: version.major,
                minor: version.minor,
                patch: version.patch,
            });
        }
        let flags = PackFlags::new(data[7]);
        let kind = PackKind::from_byte(data[8])?;
        Ok(Self {
            version,
            flags,
            kind,
            item_count: read_u64(&data[9..17]),
            payload_len: read_u64(&data[17..25]),
        })
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// A PXS file: header metadata + typed payload.
#[derive(Debug)]
pub struct PackFile<T> {
    pub version: PackVersion,
    pub flags: PackFlags,
    pub value: T,
}

impl<T: Packable> PackFile<T> {
    pub fn new(value: T) -> Self {
        Self {
            version: PackVersion::CURRENT,
            flags: value.flags(),
            value,
        }
    }

    /// Serialize to a writer in PXS binary format.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        encode(writer, self.version, self.flags, &self.value)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(&data)
    }

    /// Deserialize from a byte slice, checking kind and content hash.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header = verify_bytes(data)?;
        if header.kind != T::KIND {
            return Err(PackError::KindMismatch {
                expected: T::KIND,
                found: header.kind,
            });
        }
        let payload_end = HEADER_SIZE + payload_len(&header, data.len())?;
        let payload = &data[HEADER_SIZE..payload_end];
        let value: T =
            serde_json::from_slice(payload).map_err(|e| PackError::Serialization(e.to_string()))?;
        Ok(Self {
            version: header.version,
            flags: header.flags,
            value,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read_from(&mut reader)
    }
}

fn encode<W: Write, T: Packable>(
    writer: &mut W,
    version: PackVersion,
    flags: PackFlags,
    value: &T,
) -> Result<()> {
    let payload =
        serde_json::to_vec(value).map_err(|e| PackError::Serialization(e.to_string()))?;

    let mut hasher = Sha256::new();

    writer.write_all(&MAGIC)?;
    hasher.update(MAGIC);

    let version_bytes = [version.major, version.minor, version.patch];
    writer.write_all(&version_bytes)?;
    hasher.update(version_bytes);

    let tag = [flags.bits(), T::KIND as u8];
    writer.write_all(&tag)?;
    hasher.update(tag);

    for val in [value.item_count(), payload.len() as u64] {
        let bytes = val.to_le_bytes();
        writer.write_all(&bytes)?;
        hasher.update(bytes);
    }

    writer.write_all(&payload)?;
    hasher.update(&payload);

    let hash: [u8; 32] = hasher.finalize().into();
    writer.write_all(&hash)?;
    Ok(())
}

/// Write `value` to `path` at the current version.
pub fn save<T: Packable>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    encode(&mut writer, PackVersion::CURRENT, value.flags(), value)?;
    writer.flush()?;
    Ok(())
}

/// Read, verify and decode the payload stored at `path`.
pub fn load<T: Packable>(path: impl AsRef<Path>) -> Result<T> {
    PackFile::<T>::load(path).map(|file| file.value)
}

/// Check framing and content hash without decoding the payload.
pub fn verify_bytes(data: &[u8]) -> Result<PackHeader> {
    if data.len() < HEADER_SIZE + HASH_SIZE {
        return Err(PackError::FileTooSmall);
    }
    let header = PackHeader::parse(data)?;
    let payload_end = HEADER_SIZE + payload_len(&header, data.len())?;

    let stored_hash = &data[payload_end..payload_end + HASH_SIZE];
    let mut hasher = Sha256::new();
    hasher.update(&data[..payload_end]);
    let computed: [u8; 32] = hasher.finalize().into();
    if stored_hash != computed {
        return Err(PackError::HashMismatch);
    }
    Ok(header)
}

/// Declared payload length, checked against the bytes between the header
/// and the trailing hash. `file_len` must cover at least both of those.
fn payload_len(header: &PackHeader, file_len: usize) -> Result<usize> {
    let available = file_len - HEADER_SIZE - HASH_SIZE;
    match usize::try_from(header.payload_len) {
        Ok(len) if len <= available => Ok(len),
        _ => Err(PackError::PayloadLength {
            declared: header.payload_len,
            available,
        }),
    }
}

/// Read and verify a whole file, returning its header.
pub fn verify_file(path: impl AsRef<Path>) -> Result<PackHeader> {
    let data = std::fs::read(path)?;
    verify_bytes(&data)
}

/// Read only the fixed header of a file.
pub fn peek_header(path: impl AsRef<Path>) -> Result<PackHeader> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; HEADER_SIZE];
    match file.read_exact(&mut buf) {
        Ok(()) => PackHeader::parse(&buf),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(PackError::FileTooSmall),
        Err(e) => Err(e.into()),
    }
}
