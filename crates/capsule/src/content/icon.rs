// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{
    collections::BTreeMap,
    fmt,
    io::{Read, Write},
    ops::Range,
    path::Path,
    sync::OnceLock,
};

use bytes::Bytes;
use image::RgbaImage;

use super::{decode_count, encode_count, Content, DecodeError, EncodeError};
use crate::{
    codec::{decode_string, encode_string},
    ext::{CountingReader, ReadExt, WriteExt},
};

/// Fixed icon slots every capsule may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "kebab-case")]
#[repr(u8)]
pub enum Slot {
    Small = 0,
    Medium = 1,
    Large = 2,
    ExtraLarge = 3,
}

impl Slot {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Slot::Small,
            1 => Slot::Medium,
            2 => Slot::Large,
            3 => Slot::ExtraLarge,
            _ => return None,
        })
    }
}

/// An encoded image (PNG or JPEG). The bitmap is decoded on first
/// access and cached.
pub struct Icon {
    range: Range<u64>,
    encoded: Bytes,
    decoded: OnceLock<Result<RgbaImage, image::ImageError>>,
}

impl Icon {
    pub fn new(encoded: impl Into<Bytes>) -> Self {
        let encoded = encoded.into();
        Self {
            range: 0..encoded.len() as u64,
            encoded,
            decoded: OnceLock::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        Ok(Self::new(fs_err::read(path)?))
    }

    /// Position of the encoded image relative to the start of the icon section
    pub fn range(&self) -> Range<u64> {
        self.range.clone()
    }

    pub fn encoded(&self) -> &Bytes {
        &self.encoded
    }

    pub fn is_decoded(&self) -> bool {
        self.decoded.get().is_some()
    }

    pub fn image(&self) -> Result<&RgbaImage, &image::ImageError> {
        self.decoded
            .get_or_init(|| image::load_from_memory(&self.encoded).map(|image| image.to_rgba8()))
            .as_ref()
    }
}

impl Clone for Icon {
    fn clone(&self) -> Self {
        Self {
            range: self.range.clone(),
            encoded: self.encoded.clone(),
            decoded: OnceLock::new(),
        }
    }
}

impl fmt::Debug for Icon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Icon")
            .field("range", &self.range)
            .field("len", &self.encoded.len())
            .field("decoded", &self.is_decoded())
            .finish()
    }
}

impl PartialEq for Icon {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}

/// Standard slot icons followed by any number of named custom icons
///
/// Each entry starts with an i32 size prefix. A non-negative prefix is the
/// image length and is followed by the slot byte. A negative prefix marks a
/// custom icon whose length is `-1 - prefix`, followed by its name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IconSet {
    pub standard: BTreeMap<Slot, Icon>,
    pub custom: BTreeMap<String, Icon>,
}

impl IconSet {
    pub fn get(&self, slot: Slot) -> Option<&Icon> {
        self.standard.get(&slot)
    }

    pub fn custom(&self, name: &str) -> Option<&Icon> {
        self.custom.get(name)
    }

    pub fn len(&self) -> usize {
        self.standard.len() + self.custom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn image_length(name: impl fmt::Display, length: usize) -> Result<i32, EncodeError> {
    i32::try_from(length).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("icon {name} is too large ({length} bytes)"),
        )
        .into()
    })
}

impl Content for IconSet {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        encode_count(writer, self.len())?;

        for (slot, icon) in &self.standard {
            writer.write_i32(image_length(slot, icon.encoded.len())?)?;
            writer.write_u8(*slot as u8)?;
            writer.write_all(&icon.encoded)?;
        }

        for (name, icon) in &self.custom {
            let length = image_length(name, icon.encoded.len())?;
            writer.write_i32(-1 - length)?;
            encode_string(writer, name)?;
            writer.write_all(&icon.encoded)?;
        }

        Ok(())
    }

    fn read_from<R: Read>(&mut self, reader: &mut R) -> Result<(), DecodeError> {
        let mut reader = CountingReader::new(reader);
        let count = decode_count(&mut reader)?;

        self.standard.clear();
        self.custom.clear();

        for _ in 0..count {
            let prefix = reader.read_i32()?;

            if prefix >= 0 {
                let slot = reader.read_u8()?;
                let slot = Slot::from_u8(slot).ok_or(DecodeError::UnknownIconSlot(slot))?;
                let icon = read_icon(&mut reader, prefix as usize)?;
                self.standard.insert(slot, icon);
            } else {
                let length = -1 - prefix;
                let name = decode_string(&mut reader)?;
                let icon = read_icon(&mut reader, length as usize)?;
                self.custom.insert(name, icon);
            }
        }

        Ok(())
    }
}

fn read_icon<R: Read>(reader: &mut CountingReader<R>, length: usize) -> Result<Icon, DecodeError> {
    let start = reader.bytes;

    let mut encoded = Vec::with_capacity(length.min(1 << 20));
    reader.by_ref().take(length as u64).read_to_end(&mut encoded)?;
    if encoded.len() != length {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }

    Ok(Icon {
        range: start..reader.bytes,
        encoded: encoded.into(),
        decoded: OnceLock::new(),
    })
}
