// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{
    fmt,
    io::{self, Read, Write},
};

use bitflags::bitflags;
use thiserror::Error;

use crate::{
    ext::{ReadExt, WriteExt},
    Platform,
};

/// Well defined magic field for a capsule header
pub const CAPSULE_MAGIC: &[u8; 4] = b"\0dlc";

/// Newest container version this crate reads and the one it writes
pub const FORMAT_VERSION: i32 = 1;

bitflags! {
    /// Bit-set stored in the header describing optional content
    /// and how the capsule is signed
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u16 {
        const SHARED_ASSETS = 1 << 0;
        const SCENES = 1 << 1;
        const SCRIPTS = 1 << 2;
        const SIGNED = 1 << 3;
        const VERSION_SIGNED = 1 << 4;
        const PRELOAD_SHARED_ASSETS = 1 << 5;
        const PRELOAD_SCENES = 1 << 6;

        /// Flags describing which content is present
        const CONTENT = Self::SHARED_ASSETS.bits() | Self::SCENES.bits() | Self::SCRIPTS.bits();
    }
}

impl Flags {
    const NAMES: [(Self, &'static str); 7] = [
        (Self::SHARED_ASSETS, "shared-assets"),
        (Self::SCENES, "scenes"),
        (Self::SCRIPTS, "scripts"),
        (Self::SIGNED, "signed"),
        (Self::VERSION_SIGNED, "version-signed"),
        (Self::PRELOAD_SHARED_ASSETS, "preload-shared-assets"),
        (Self::PRELOAD_SCENES, "preload-scenes"),
    ];

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names().collect::<Vec<_>>();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join(", "))
        }
    }
}

/// Fixed-size record at the start of every capsule
///
/// Layout (little endian):
/// magic (4) · version (i32) · platform (i32) · flags (u16) ·
/// content size (i32) · reserved (i32 × 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: i32,
    pub platform: Platform,
    pub flags: Flags,
    /// Number of entries in the content table
    pub content_size: i32,
}

impl Header {
    /// Size of the encoded header in bytes
    pub const SIZE: usize = 4 + 4 + 4 + 2 + 4 + 4 * 2;

    pub fn new(platform: Platform, flags: Flags, content_size: i32) -> Self {
        Self {
            version: FORMAT_VERSION,
            platform,
            flags,
            content_size,
        }
    }

    pub fn encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), io::Error> {
        writer.write_array(*CAPSULE_MAGIC)?;
        writer.write_i32(self.version)?;
        writer.write_i32(self.platform as i32)?;
        writer.write_u16(self.flags.bits())?;
        writer.write_i32(self.content_size)?;
        // Reserved
        writer.write_i32(0)?;
        writer.write_i32(0)?;

        Ok(())
    }

    /// Decodes the header as a single block. Nothing beyond the
    /// header is touched until every field has been validated.
    pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, DecodeError> {
        let block = reader.read_array::<{ Header::SIZE }>()?;
        let mut block = &block[..];

        let magic = block.read_array::<4>()?;
        if magic != *CAPSULE_MAGIC {
            return Err(DecodeError::InvalidMagic);
        }

        let version = block.read_i32()?;

        match version {
            1 => Self::decode_v1(version, block),
            v => Err(DecodeError::UnsupportedVersion(v)),
        }
    }

    fn decode_v1(version: i32, mut block: &[u8]) -> Result<Self, DecodeError> {
        let platform = block.read_i32()?;
        let platform = Platform::from_i32(platform).ok_or(DecodeError::UnknownPlatform(platform))?;

        let flags = block.read_u16()?;
        let flags = Flags::from_bits(flags).ok_or(DecodeError::UnknownFlags(flags))?;

        if flags.contains(Flags::VERSION_SIGNED) && !flags.contains(Flags::SIGNED) {
            return Err(DecodeError::InconsistentSigning);
        }

        let content_size = block.read_i32()?;
        if content_size < 0 {
            return Err(DecodeError::NegativeContentSize(content_size));
        }

        // Reserved, unused in v1
        let _reserved = block.read_array::<8>()?;

        Ok(Self {
            version,
            platform,
            flags,
            content_size,
        })
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Header must be {} bytes long", Header::SIZE)]
    NotEnoughBytes,
    #[error("Invalid magic, not a capsule")]
    InvalidMagic,
    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(i32),
    #[error("Unknown platform: {0}")]
    UnknownPlatform(i32),
    #[error("Unknown header flags: {0:#06x}")]
    UnknownFlags(u16),
    #[error("Version signed flag set without signed flag")]
    InconsistentSigning,
    #[error("Negative content size: {0}")]
    NegativeContentSize(i32),
    #[error("io")]
    Io(io::Error),
}

impl From<io::Error> for DecodeError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::UnexpectedEof => DecodeError::NotEnoughBytes,
            _ => DecodeError::Io(error),
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn roundtrip() {
        let header = Header::new(
            Platform::Android,
            Flags::SCENES | Flags::SIGNED | Flags::VERSION_SIGNED | Flags::PRELOAD_SCENES,
            4,
        );

        let mut bytes = vec![];
        header.encode(&mut bytes).unwrap();
        assert_eq!(bytes.len(), Header::SIZE);

        let decoded = Header::decode(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn invalid_magic() {
        let mut bytes = vec![];
        Header::new(Platform::Linux, Flags::empty(), 0).encode(&mut bytes).unwrap();
        bytes[1] = b'x';

        assert!(matches!(
            Header::decode(&mut Cursor::new(bytes)),
            Err(DecodeError::InvalidMagic)
        ));
    }

    #[test]
    fn truncated() {
        let mut bytes = vec![];
        Header::new(Platform::Linux, Flags::empty(), 0).encode(&mut bytes).unwrap();
        bytes.truncate(Header::SIZE - 1);

        assert!(matches!(
            Header::decode(&mut Cursor::new(bytes)),
            Err(DecodeError::NotEnoughBytes)
        ));
    }

    #[test]
    fn future_version() {
        let mut header = Header::new(Platform::Windows, Flags::empty(), 0);
        header.version = FORMAT_VERSION + 1;

        let mut bytes = vec![];
        header.encode(&mut bytes).unwrap();

        assert!(matches!(
            Header::decode(&mut Cursor::new(bytes)),
            Err(DecodeError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn flags() {
        let mut flags = Flags::SCRIPTS | Flags::SIGNED;
        assert!(flags.contains(Flags::SCRIPTS));
        assert!(!flags.contains(Flags::SCENES));
        assert_eq!(flags.intersection(Flags::CONTENT), Flags::SCRIPTS);

        flags.set(Flags::SCRIPTS, false);
        assert_eq!(flags, Flags::SIGNED);
        assert_eq!(flags.to_string(), "signed");
        assert_eq!(Flags::from_bits(1 << 12), None);
    }
}
