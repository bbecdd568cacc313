//! Binary cache container (`.pxs`) for PrexSyn.
//!
//! Building-block lists, reaction lists, whole chemical spaces and
//! synthesis routes are all persisted in the same framed layout. The
//! payload is JSON; integrity is guarded by a SHA-256 trailer.
//!
//! ## File Layout
//!
//! ```text
//! PXS File Layout:
//! ┌──────────────────────────────┐
//! │ Magic: 0x50585300 ("PXS\0") │  4 bytes
//! │ Version: major.minor.patch   │  3 bytes
//! │ Flags                        │  1 byte
//! │ Payload kind                 │  1 byte
//! ├──────────────────────────────┤
//! │ Header                       │
//! │   item_count: u64            │
//! │   payload_length: u64        │
//! ├──────────────────────────────┤
//! │ JSON payload                 │
//! ├──────────────────────────────┤
//! │ Content Hash (SHA-256)       │  32 bytes
//! └──────────────────────────────┘
//! ```

mod error;
mod format;

pub use error::{PackError, Result};
pub use format::{
    load, peek_header, save, verify_bytes, verify_file, PackFile, PackFlags, PackHeader,
    PackKind, PackVersion, Packable, MAGIC,
};
