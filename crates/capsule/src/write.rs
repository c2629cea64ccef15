// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use log::trace;
use thiserror::Error;

use crate::{
    content::{self, Content},
    ext::CountingWriter,
    signing::Signature,
    table::{self, Entry, Kind, Table},
    Flags, Header, Platform,
};

/// Assembles a capsule
///
/// Section bodies are spooled into `buffer` as they are added so the
/// header, signing block and table can be finalized up front. Output layout
/// is header, signing block, content table, then bodies in table order.
pub struct Writer<W, B> {
    writer: W,
    buffer: B,
    platform: Platform,
    signature: Option<Signature>,
    preload: Flags,
    table: Table,
    /// Running offset of the next body within `buffer`
    offset: u64,
}

impl<W: Write> Writer<W, Cursor<Vec<u8>>> {
    /// Spool bodies in memory
    pub fn new(writer: W, platform: Platform) -> Self {
        Self::with_buffer(writer, Cursor::new(vec![]), platform)
    }
}

impl<W, B> Writer<W, B>
where
    W: Write,
    B: Read + Write + Seek,
{
    pub fn with_buffer(writer: W, buffer: B, platform: Platform) -> Self {
        Self {
            writer,
            buffer,
            platform,
            signature: None,
            preload: Flags::empty(),
            table: Table::default(),
            offset: 0,
        }
    }

    pub fn with_signature(self, signature: Option<Signature>) -> Self {
        Self { signature, ..self }
    }

    /// Only the preload bits of `flags` are kept, the rest are
    /// derived from the content and signature
    pub fn with_preload(self, flags: Flags) -> Self {
        Self {
            preload: flags.intersection(Flags::PRELOAD_SHARED_ASSETS | Flags::PRELOAD_SCENES),
            ..self
        }
    }

    pub fn add_content<C: Content>(&mut self, kind: Kind, content: &C) -> Result<(), Error> {
        if self.table.contains(kind) {
            return Err(Error::Duplicate(kind));
        }

        let start = self.offset;
        let mut writer = CountingWriter::new(&mut self.buffer);
        if let Err(source) = content.write_to(&mut writer) {
            // Drop the partial body
            self.buffer.seek(SeekFrom::Start(start))?;
            return Err(Error::Content { kind, source });
        }
        let size = writer.bytes;

        trace!("Spooled {kind} content, {size} bytes at {start}");

        self.offset += size;
        self.table.push(Entry {
            kind,
            start: start as i64,
            size: size as i64,
        })?;

        Ok(())
    }

    /// Header flags for the content added so far
    pub fn flags(&self) -> Flags {
        let mut flags = self.preload;

        flags.set(
            Flags::SHARED_ASSETS,
            self.table.contains(Kind::SharedAssetMetadata) || self.table.contains(Kind::SharedAssetBundle),
        );
        flags.set(
            Flags::SCENES,
            self.table.contains(Kind::SceneAssetMetadata) || self.table.contains(Kind::SceneAssetBundle),
        );
        flags.set(Flags::SCRIPTS, self.table.contains(Kind::ScriptAssembly));

        if let Some(signature) = &self.signature {
            flags |= signature.flags();
        }

        flags
    }

    /// Write the capsule and return its content table with absolute offsets
    pub fn finalize(mut self) -> Result<Table, Error> {
        let flags = self.flags();
        let content_size = i32::try_from(self.table.len()).map_err(|_| Error::TooManyEntries)?;

        let base = (Header::SIZE + Signature::encoded_size(flags) + self.table.encoded_size()) as i64;

        let mut table = Table::default();
        for entry in self.table.iter() {
            table.push(Entry {
                start: base + entry.start,
                ..*entry
            })?;
        }

        Header::new(self.platform, flags, content_size).encode(&mut self.writer)?;
        if let Some(signature) = &self.signature {
            signature.encode(&mut self.writer)?;
        }
        table.encode(&mut self.writer)?;

        self.buffer.seek(SeekFrom::Start(0))?;
        io::copy(&mut (&mut self.buffer).take(self.offset), &mut self.writer)?;
        self.writer.flush()?;

        Ok(table)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Content {0} added more than once")]
    Duplicate(Kind),
    #[error("Too many content entries")]
    TooManyEntries,
    #[error("Encode {kind} content")]
    Content {
        kind: Kind,
        #[source]
        source: content::EncodeError,
    },
    #[error("table")]
    Table(#[from] table::DecodeError),
    #[error("io")]
    Io(#[from] io::Error),
}
