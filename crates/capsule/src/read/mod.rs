// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use log::{debug, warn};
use thiserror::Error;

use crate::{
    content::{self, Content},
    header,
    schedule::{Progress, Scheduler},
    signing::{Signature, SigningPolicy, VerifyError},
    table::{self, Entry, Kind, Table},
    Header, Platform,
};

pub use self::section::Section;

mod section;

/// How a capsule should be opened
#[derive(Clone, Copy)]
pub struct OpenOptions<'a> {
    /// Platform of the running host, a mismatch only warns
    pub platform: Option<Platform>,
    /// Required to open signed capsules
    pub policy: Option<&'a dyn SigningPolicy>,
    /// Read the content table immediately, otherwise defer to [`Container::read_table`]
    pub read_table: bool,
}

impl Default for OpenOptions<'_> {
    fn default() -> Self {
        Self {
            platform: None,
            policy: None,
            read_table: true,
        }
    }
}

pub fn open<R: Read + Seek>(mut reader: R, options: &OpenOptions<'_>) -> Result<Container<R>, Error> {
    let len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    let header = Header::decode(&mut reader).map_err(Error::HeaderDecode)?;

    let platform_mismatch = options
        .platform
        .and_then(|host| PlatformMismatch::detect(host, header.platform));
    if let Some(mismatch) = &platform_mismatch {
        warn!("{mismatch}");
    }

    let signature = Signature::decode(&mut reader, header.flags)?;
    if let Some(signature) = &signature {
        let policy = options.policy.ok_or(Error::MissingSigningPolicy)?;
        signature.verify(policy)?;
        debug!("Capsule signature verified");
    }

    let mut container = Container {
        header,
        signature,
        platform_mismatch,
        table: None,
        reader,
        len,
    };

    if options.read_table {
        container.read_table()?;
    }

    Ok(container)
}

pub fn read_bytes<'a>(bytes: &'a [u8], options: &OpenOptions<'_>) -> Result<Container<Cursor<&'a [u8]>>, Error> {
    open(Cursor::new(bytes), options)
}

/// Capsule built for a platform other than the host's
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlatformMismatch {
    #[error("Capsule was built for {built} but is loaded by {host}, editor and player content may differ")]
    EditorPlayer { host: Platform, built: Platform },
    #[error("Capsule was built for {built} but is loaded by {host}")]
    Foreign { host: Platform, built: Platform },
}

impl PlatformMismatch {
    fn detect(host: Platform, built: Platform) -> Option<Self> {
        if host == built {
            None
        } else if host.family() == built.family() {
            Some(Self::EditorPlayer { host, built })
        } else {
            Some(Self::Foreign { host, built })
        }
    }
}

/// An opened capsule, owning its underlying stream
pub struct Container<R> {
    pub header: Header,
    pub signature: Option<Signature>,
    /// Set when opened with a host platform the capsule wasn't built for
    pub platform_mismatch: Option<PlatformMismatch>,
    table: Option<Table>,
    reader: R,
    len: u64,
}

impl<R: Read + Seek> Container<R> {
    /// Offset of the content table from the start of the stream
    fn table_offset(&self) -> u64 {
        (Header::SIZE + Signature::encoded_size(self.header.flags)) as u64
    }

    /// Read the content table if it was deferred at open
    pub fn read_table(&mut self) -> Result<&Table, Error> {
        if self.table.is_none() {
            self.reader.seek(SeekFrom::Start(self.table_offset()))?;
            let table = Table::decode(&mut self.reader, self.header.content_size as usize, self.len)?;
            self.table = Some(table);
        }

        self.table.as_ref().ok_or(Error::TableNotRead)
    }

    /// Bounded stream over the section of `kind`, `None` if absent
    pub fn content_stream(&mut self, kind: Kind) -> Result<Option<Section<'_, R>>, Error> {
        let Some(entry) = self.entry(kind)? else {
            return Ok(None);
        };

        Ok(Some(Section::new(
            &mut self.reader,
            entry.start as u64,
            entry.size as u64,
        )?))
    }

    /// Decode the section of `kind` into `content`
    pub fn load<C: Content>(&mut self, kind: Kind, content: &mut C) -> Result<(), Error> {
        let mut section = self.content_stream(kind)?.ok_or(Error::MissingContent(kind))?;

        content
            .read_from(&mut section)
            .map_err(|source| Error::Content { kind, source })?;

        match section.remaining() {
            0 => Ok(()),
            remaining => Err(Error::Content {
                kind,
                source: content::DecodeError::Unconsumed(remaining),
            }),
        }
    }

    /// Decode the section of `kind` into `content` through the scheduler,
    /// reporting to `progress` and finishing it with the outcome
    pub async fn load_async<C: Content>(
        &mut self,
        scheduler: &Scheduler,
        kind: Kind,
        content: &mut C,
        progress: Progress,
    ) -> Result<(), Error> {
        let result = self.load_scheduled(scheduler, kind, content, &progress).await;
        progress.finish(result.as_ref().map_err(ToString::to_string).map(|_| ()));
        result
    }

    async fn load_scheduled<C: Content>(
        &mut self,
        scheduler: &Scheduler,
        kind: Kind,
        content: &mut C,
        progress: &Progress,
    ) -> Result<(), Error> {
        let mut section = self.content_stream(kind)?.ok_or(Error::MissingContent(kind))?;
        let len = section.len();

        content
            .read_from_async(scheduler, &mut section, len, progress)
            .await
            .map_err(|source| Error::Content { kind, source })
    }

    fn entry(&mut self, kind: Kind) -> Result<Option<Entry>, Error> {
        Ok(self.read_table()?.get(kind).copied())
    }
}

impl<R> Container<R> {
    /// `None` until the table has been read
    pub fn table(&self) -> Option<&Table> {
        self.table.as_ref()
    }

    /// False for absent kinds and while the table is unread
    pub fn has_content(&self, kind: Kind) -> bool {
        self.table.as_ref().is_some_and(|table| table.contains(kind))
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not a valid capsule")]
    HeaderDecode(#[source] header::DecodeError),
    #[error("Invalid content table")]
    TableDecode(#[from] table::DecodeError),
    #[error("Signature mismatch")]
    Signature(#[from] VerifyError),
    #[error("Capsule is signed but no signing policy was provided")]
    MissingSigningPolicy,
    #[error("Content table has not been read")]
    TableNotRead,
    #[error("Capsule has no {0} content")]
    MissingContent(Kind),
    #[error("Decode {kind} content")]
    Content {
        kind: Kind,
        #[source]
        source: content::DecodeError,
    },
    #[error("io")]
    Io(#[from] io::Error),
}

impl Error {
    /// Format errors make the whole capsule unusable for this host,
    /// anything else concerns a single request
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::HeaderDecode(_) | Error::TableDecode(_) | Error::Signature(_) | Error::MissingSigningPolicy
        )
    }
}
