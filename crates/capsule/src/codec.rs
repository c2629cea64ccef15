// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Primitive encodings shared by every section of a capsule
//!
//! Strings are stored as UTF-16 units, each shifted by [`STRING_SHIFT`].
//! The shift only keeps names and descriptions from being legible in a
//! hex dump. It is trivially reversible and provides no confidentiality
//! or integrity whatsoever, use the signing block for the latter.

use std::{
    fmt,
    io::{self, Read, Write},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ext::{ReadExt, WriteExt};

/// Offset added to every UTF-16 unit of an encoded string (wrapping)
pub const STRING_SHIFT: u16 = 0x0B;

const VERSION_HAS_BUILD: u16 = 1 << 0;
const VERSION_HAS_REVISION: u16 = 1 << 1;

/// A `major.minor[.build[.revision]]` version number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub build: Option<u16>,
    pub revision: Option<u16>,
}

impl Version {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self {
            major,
            minor,
            build: None,
            revision: None,
        }
    }

    pub const fn with_build(self, build: u16) -> Self {
        Self {
            build: Some(build),
            ..self
        }
    }

    pub const fn with_revision(self, revision: u16) -> Self {
        Self {
            revision: Some(revision),
            ..self
        }
    }

    /// Build from signed components where a negative build or
    /// revision means the component is absent
    pub fn from_components(major: i32, minor: i32, build: i32, revision: i32) -> Result<Self, VersionError> {
        let required = |value: i32| u16::try_from(value).map_err(|_| VersionError::OutOfRange(value));
        let optional = |value: i32| {
            if value < 0 {
                Ok(None)
            } else {
                required(value).map(Some)
            }
        };

        Ok(Self {
            major: required(major)?,
            minor: required(minor)?,
            build: optional(build)?,
            revision: optional(revision)?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(build) = self.build {
            write!(f, ".{build}")?;
        }
        if let Some(revision) = self.revision {
            if self.build.is_none() {
                write!(f, ".0")?;
            }
            write!(f, ".{revision}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .trim()
            .split('.')
            .map(|part| part.parse::<u16>().map_err(|_| VersionError::Invalid(s.to_owned())))
            .collect::<Result<Vec<_>, _>>()?;

        match parts.as_slice() {
            [major, minor] => Ok(Self::new(*major, *minor)),
            [major, minor, build] => Ok(Self::new(*major, *minor).with_build(*build)),
            [major, minor, build, revision] => Ok(Self::new(*major, *minor)
                .with_build(*build)
                .with_revision(*revision)),
            _ => Err(VersionError::Invalid(s.to_owned())),
        }
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version string {0:?}, expected major.minor[.build[.revision]]")]
    Invalid(String),
    #[error("version component {0} out of range")]
    OutOfRange(i32),
}

pub fn encode_version<W: Write + ?Sized>(writer: &mut W, version: &Version) -> io::Result<()> {
    let mut flags = 0;
    if version.build.is_some() {
        flags |= VERSION_HAS_BUILD;
    }
    if version.revision.is_some() {
        flags |= VERSION_HAS_REVISION;
    }

    writer.write_u16(flags)?;
    writer.write_u16(version.major)?;
    writer.write_u16(version.minor)?;
    if let Some(build) = version.build {
        writer.write_u16(build)?;
    }
    if let Some(revision) = version.revision {
        writer.write_u16(revision)?;
    }

    Ok(())
}

pub fn decode_version<R: Read + ?Sized>(reader: &mut R) -> io::Result<Version> {
    let flags = reader.read_u16()?;

    if flags & !(VERSION_HAS_BUILD | VERSION_HAS_REVISION) != 0 {
        return Err(invalid_data(format!("unknown version flags {flags:#06x}")));
    }

    let major = reader.read_u16()?;
    let minor = reader.read_u16()?;
    let build = if flags & VERSION_HAS_BUILD != 0 {
        Some(reader.read_u16()?)
    } else {
        None
    };
    let revision = if flags & VERSION_HAS_REVISION != 0 {
        Some(reader.read_u16()?)
    } else {
        None
    };

    Ok(Version {
        major,
        minor,
        build,
        revision,
    })
}

pub fn encode_string<W: Write + ?Sized>(writer: &mut W, value: &str) -> io::Result<()> {
    let units = value.encode_utf16().collect::<Vec<_>>();
    let length = i32::try_from(units.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "string too long to encode"))?;

    writer.write_i32(length)?;
    for unit in units {
        writer.write_u16(unit.wrapping_add(STRING_SHIFT))?;
    }

    Ok(())
}

pub fn decode_string<R: Read + ?Sized>(reader: &mut R) -> io::Result<String> {
    let length = reader.read_i32()?;
    let length = usize::try_from(length).map_err(|_| invalid_data(format!("negative string length {length}")))?;

    // Don't trust the prefix for the allocation, a corrupt
    // length would otherwise reserve gigabytes up front
    let mut units = Vec::with_capacity(length.min(4096));
    for _ in 0..length {
        units.push(reader.read_u16()?.wrapping_sub(STRING_SHIFT));
    }

    String::from_utf16(&units).map_err(|error| invalid_data(error.to_string()))
}

pub fn encode_bytes<W: Write + ?Sized>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_i64(bytes.len() as i64)?;
    writer.write_all(bytes)
}

pub fn decode_bytes<R: Read + ?Sized>(reader: &mut R) -> io::Result<Vec<u8>> {
    let length = reader.read_i64()?;
    let length = usize::try_from(length).map_err(|_| invalid_data(format!("negative blob length {length}")))?;

    let mut bytes = Vec::with_capacity(length.min(1 << 20));
    reader.take(length as u64).read_to_end(&mut bytes)?;

    if bytes.len() != length {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }

    Ok(bytes)
}

pub fn encode_timestamp<W: Write + ?Sized>(writer: &mut W, timestamp: &DateTime<Utc>) -> io::Result<()> {
    writer.write_i64(timestamp.timestamp())
}

pub fn decode_timestamp<R: Read + ?Sized>(reader: &mut R) -> io::Result<DateTime<Utc>> {
    let seconds = reader.read_i64()?;
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| invalid_data(format!("timestamp {seconds} out of range")))
}

pub(crate) fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    fn roundtrip_version(version: Version) -> Version {
        let mut bytes = vec![];
        encode_version(&mut bytes, &version).unwrap();
        decode_version(&mut Cursor::new(bytes)).unwrap()
    }

    fn roundtrip_string(value: &str) -> String {
        let mut bytes = vec![];
        encode_string(&mut bytes, value).unwrap();
        decode_string(&mut Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn version_sentinels() {
        let versions = [
            Version::from_components(1, 2, -1, -1).unwrap(),
            Version::from_components(1, 2, 3, -1).unwrap(),
            Version::from_components(1, 2, -1, 9).unwrap(),
            Version::from_components(0, 0, 0, 0).unwrap(),
            Version::from_components(65_535, 65_535, 65_535, 65_535).unwrap(),
        ];

        for version in versions {
            assert_eq!(roundtrip_version(version), version);
        }

        assert_eq!(Version::from_components(1, 2, -1, -1).unwrap().build, None);
        assert_eq!(
            Version::from_components(-1, 0, 0, 0),
            Err(VersionError::OutOfRange(-1))
        );
    }

    #[test]
    fn version_flags_size() {
        let mut bytes = vec![];
        encode_version(&mut bytes, &Version::new(1, 0)).unwrap();
        // flags + major + minor
        assert_eq!(bytes.len(), 6);

        bytes.clear();
        encode_version(&mut bytes, &Version::new(1, 0).with_build(4).with_revision(2)).unwrap();
        assert_eq!(bytes.len(), 10);
        assert_eq!(&bytes[..2], &[0b11, 0]);
    }

    #[test]
    fn version_strings() {
        assert_eq!("1.2".parse::<Version>().unwrap(), Version::new(1, 2));
        assert_eq!(
            "1.2.3.4".parse::<Version>().unwrap(),
            Version::new(1, 2).with_build(3).with_revision(4)
        );
        assert!("1".parse::<Version>().is_err());
        assert!("1.x".parse::<Version>().is_err());
        assert!("".parse::<Version>().is_err());
        assert_eq!(Version::new(3, 1).with_build(7).to_string(), "3.1.7");
    }

    #[test]
    fn strings_are_shifted() {
        let mut bytes = vec![];
        encode_string(&mut bytes, "A").unwrap();
        assert_eq!(bytes, [1, 0, 0, 0, b'A' + STRING_SHIFT as u8, 0]);
    }

    #[test]
    fn string_boundaries() {
        let values = [
            "",
            "plain ascii",
            "\u{0}\u{1}\u{7f}",
            "\u{fff5}\u{fffa}\u{ffff}",
            "wide 🦀 chars ✓",
        ];

        for value in values {
            assert_eq!(roundtrip_string(value), value);
        }

        // Units near the top of the range wrap instead of failing
        let mut bytes = vec![];
        encode_string(&mut bytes, "\u{fffa}").unwrap();
        assert_eq!(&bytes[4..], &0x0005u16.to_le_bytes());
    }

    #[test]
    fn negative_string_length() {
        let bytes = (-4i32).to_le_bytes();
        let error = decode_string(&mut Cursor::new(bytes)).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn blobs_and_timestamps() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let mut bytes = vec![];
        encode_bytes(&mut bytes, b"payload").unwrap();
        encode_timestamp(&mut bytes, &now).unwrap();

        let mut reader = Cursor::new(bytes);
        assert_eq!(decode_bytes(&mut reader).unwrap(), b"payload");
        assert_eq!(decode_timestamp(&mut reader).unwrap(), now);

        let truncated = [9, 0, 0, 0, 0, 0, 0, 0, 1, 2];
        assert!(decode_bytes(&mut Cursor::new(truncated)).is_err());
    }
}
