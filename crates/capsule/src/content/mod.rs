// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::schedule::{Progress, Scheduler};

pub use self::bundle::{ContentBundle, State as BundleState};
pub use self::bundle_meta::{Asset, BundleMetadata};
pub use self::icon::{Icon, IconSet, Slot};
pub use self::metadata::{CustomValue, Metadata};
pub use self::script::{Assembly, AssemblyLoader, LoadError, ScriptAssembly};

mod bundle;
mod bundle_meta;
mod icon;
mod metadata;
mod script;

/// A section that knows how to serialize itself into a capsule
///
/// Readers are handed a stream bounded to the section's byte range
/// and must consume all of it.
pub trait Content {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    fn read_from<R: Read>(&mut self, reader: &mut R) -> Result<(), DecodeError>;

    /// Pull `len` bytes through the scheduler before decoding so large
    /// sections never monopolise the runtime
    #[allow(async_fn_in_trait)]
    async fn read_from_async<R: Read>(
        &mut self,
        scheduler: &Scheduler,
        reader: &mut R,
        len: u64,
        progress: &Progress,
    ) -> Result<(), DecodeError> {
        let bytes = scheduler.read(reader, len, progress).await?;
        let mut remaining = bytes.as_slice();

        self.read_from(&mut remaining)?;

        if !remaining.is_empty() {
            return Err(DecodeError::Unconsumed(remaining.len() as u64));
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unknown icon slot {0}")]
    UnknownIconSlot(u8),
    #[error("Negative count {0}")]
    NegativeCount(i32),
    #[error("Invalid length {length} for {name}")]
    InvalidLength { name: String, length: i64 },
    #[error("{0} bytes of section left unread")]
    Unconsumed(u64),
    #[error("io")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Too many entries to encode ({0})")]
    TooManyEntries(usize),
    #[error("Content bundle has no source")]
    MissingSource,
    #[error("serialize custom metadata")]
    Json(#[from] serde_json::Error),
    #[error("io")]
    Io(#[from] io::Error),
}

pub(crate) fn encode_count<W: Write + ?Sized>(writer: &mut W, count: usize) -> Result<(), EncodeError> {
    use crate::ext::WriteExt;

    let count = i32::try_from(count).map_err(|_| EncodeError::TooManyEntries(count))?;
    writer.write_i32(count)?;
    Ok(())
}

pub(crate) fn decode_count<R: Read + ?Sized>(reader: &mut R) -> Result<usize, DecodeError> {
    use crate::ext::ReadExt;

    let count = reader.read_i32()?;
    usize::try_from(count).map_err(|_| DecodeError::NegativeCount(count))
}
