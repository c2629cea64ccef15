// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::ext::{ReadExt, WriteExt};

/// Kind of section a table entry points to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "kebab-case")]
#[repr(u16)]
pub enum Kind {
    Metadata = 1,
    IconSet = 2,
    SharedAssetMetadata = 3,
    SceneAssetMetadata = 4,
    ScriptAssembly = 5,
    SharedAssetBundle = 6,
    SceneAssetBundle = 7,
}

impl Kind {
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            1 => Kind::Metadata,
            2 => Kind::IconSet,
            3 => Kind::SharedAssetMetadata,
            4 => Kind::SceneAssetMetadata,
            5 => Kind::ScriptAssembly,
            6 => Kind::SharedAssetBundle,
            7 => Kind::SceneAssetBundle,
            _ => return None,
        })
    }
}

/// Byte range of a single section within the capsule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub kind: Kind,
    pub start: i64,
    pub size: i64,
}

impl Entry {
    pub const SIZE: usize = 2 + 8 + 8;

    pub fn end(&self) -> i64 {
        self.start + self.size
    }

    fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, DecodeError> {
        let kind = reader.read_u16()?;
        let kind = Kind::from_u16(kind).ok_or(DecodeError::UnknownKind(kind))?;
        let start = reader.read_i64()?;
        let size = reader.read_i64()?;

        Ok(Self { kind, start, size })
    }

    fn encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), io::Error> {
        writer.write_u16(self.kind as u16)?;
        writer.write_i64(self.start)?;
        writer.write_i64(self.size)?;
        Ok(())
    }
}

/// Mapping of content kind to byte range, kept in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    entries: Vec<Entry>,
}

impl Table {
    pub fn get(&self, kind: Kind) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.kind == kind)
    }

    pub fn contains(&self, kind: Kind) -> bool {
        self.get(kind).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn encoded_size(&self) -> usize {
        self.entries.len() * Entry::SIZE
    }

    pub(crate) fn push(&mut self, entry: Entry) -> Result<(), DecodeError> {
        if self.contains(entry.kind) {
            return Err(DecodeError::Duplicate(entry.kind));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Reads exactly `count` entries and checks each range is
    /// non-negative, ends within `stream_len` and overlaps no other
    pub fn decode<R: Read + ?Sized>(reader: &mut R, count: usize, stream_len: u64) -> Result<Self, DecodeError> {
        let mut table = Self::default();

        for _ in 0..count {
            let entry = Entry::decode(reader)?;

            if entry.start < 0 || entry.size < 0 || entry.start.checked_add(entry.size).is_none() {
                return Err(DecodeError::InvalidRange(entry.kind));
            }
            if entry.end() as u64 > stream_len {
                return Err(DecodeError::OutOfBounds {
                    kind: entry.kind,
                    end: entry.end(),
                    len: stream_len,
                });
            }
            if let Some(other) = table.iter().find(|other| other.start < entry.end() && entry.start < other.end()) {
                return Err(DecodeError::Overlap(entry.kind, other.kind));
            }

            table.push(entry)?;
        }

        Ok(table)
    }

    pub fn encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), io::Error> {
        for entry in &self.entries {
            entry.encode(writer)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unknown content kind: {0}")]
    UnknownKind(u16),
    #[error("Content {0} listed more than once")]
    Duplicate(Kind),
    #[error("Content {0} has a negative or overflowing range")]
    InvalidRange(Kind),
    #[error("Content {kind} ends at {end}, past the end of the stream ({len})")]
    OutOfBounds { kind: Kind, end: i64, len: u64 },
    #[error("Content {0} overlaps content {1}")]
    Overlap(Kind, Kind),
    #[error("io")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    fn encoded(entries: &[Entry]) -> Vec<u8> {
        let mut bytes = vec![];
        for entry in entries {
            entry.encode(&mut bytes).unwrap();
        }
        bytes
    }

    #[test]
    fn roundtrip() {
        let entries = [
            Entry {
                kind: Kind::Metadata,
                start: 100,
                size: 20,
            },
            Entry {
                kind: Kind::IconSet,
                start: 120,
                size: 0,
            },
            Entry {
                kind: Kind::SceneAssetBundle,
                start: 120,
                size: 80,
            },
        ];

        let table = Table::decode(&mut Cursor::new(encoded(&entries)), 3, 200).unwrap();
        assert_eq!(table.iter().copied().collect::<Vec<_>>(), entries);
        assert!(table.contains(Kind::IconSet));
        assert!(!table.contains(Kind::ScriptAssembly));
    }

    #[test]
    fn rejects_bad_ranges() {
        let out_of_bounds = [Entry {
            kind: Kind::Metadata,
            start: 10,
            size: 20,
        }];
        assert!(matches!(
            Table::decode(&mut Cursor::new(encoded(&out_of_bounds)), 1, 25),
            Err(DecodeError::OutOfBounds { .. })
        ));

        let overlapping = [
            Entry {
                kind: Kind::Metadata,
                start: 10,
                size: 20,
            },
            Entry {
                kind: Kind::IconSet,
                start: 29,
                size: 5,
            },
        ];
        assert!(matches!(
            Table::decode(&mut Cursor::new(encoded(&overlapping)), 2, 100),
            Err(DecodeError::Overlap(Kind::IconSet, Kind::Metadata))
        ));

        let duplicate = [
            Entry {
                kind: Kind::Metadata,
                start: 10,
                size: 5,
            },
            Entry {
                kind: Kind::Metadata,
                start: 15,
                size: 5,
            },
        ];
        assert!(matches!(
            Table::decode(&mut Cursor::new(encoded(&duplicate)), 2, 100),
            Err(DecodeError::Duplicate(Kind::Metadata))
        ));
    }
}
