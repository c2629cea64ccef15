// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use log::{debug, warn};

use super::{Content, DecodeError, EncodeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum State {
    NotLoaded,
    Loading,
    Loaded,
    FailedToLoad,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    File(PathBuf),
    Memory(Bytes),
}

/// Opaque asset bundle produced by an external bundler
///
/// On the build side it points at the blob on disk. On the consuming
/// side it holds the loaded blob until [`ContentBundle::unload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBundle {
    source: Option<Source>,
    state: State,
    data: Option<Bytes>,
}

impl Default for ContentBundle {
    fn default() -> Self {
        Self {
            source: None,
            state: State::NotLoaded,
            data: None,
        }
    }
}

impl ContentBundle {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(Source::File(path.into())),
            ..Default::default()
        }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            source: Some(Source::Memory(bytes.into())),
            ..Default::default()
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            Some(Source::File(path)) => Some(path),
            _ => None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The loaded blob, only available in [`State::Loaded`]
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    /// Release the loaded blob. No-op when nothing is loaded.
    pub fn unload(&mut self) {
        if self.state == State::NotLoaded {
            return;
        }

        debug!("Unloading content bundle ({})", self.state);
        self.data = None;
        self.state = State::NotLoaded;
    }
}

impl Content for ContentBundle {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        match &self.source {
            Some(Source::File(path)) => {
                let mut file = fs_err::File::open(path)?;
                io::copy(&mut file, writer)?;
            }
            Some(Source::Memory(bytes)) => writer.write_all(bytes)?,
            None => return Err(EncodeError::MissingSource),
        }

        Ok(())
    }

    fn read_from<R: Read>(&mut self, reader: &mut R) -> Result<(), DecodeError> {
        match self.state {
            State::Loaded | State::FailedToLoad => {
                // Keep the current outcome but still step over the section
                io::copy(reader, &mut io::sink())?;
                return Ok(());
            }
            State::NotLoaded | State::Loading => {}
        }

        self.state = State::Loading;

        let mut data = vec![];
        match reader.read_to_end(&mut data) {
            Ok(_) => {
                self.data = Some(data.into());
                self.state = State::Loaded;
                Ok(())
            }
            Err(error) => {
                warn!("Content bundle failed to load: {error}");
                self.data = None;
                self.state = State::FailedToLoad;
                Err(error.into())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn states() {
        let mut bundle = ContentBundle::default();
        assert_eq!(bundle.state(), State::NotLoaded);

        // Unloading twice is harmless
        bundle.unload();
        bundle.unload();
        assert_eq!(bundle.state(), State::NotLoaded);

        bundle.read_from(&mut &b"blob"[..]).unwrap();
        assert_eq!(bundle.state(), State::Loaded);
        assert_eq!(bundle.data().unwrap(), &b"blob"[..]);

        // A second read keeps the loaded blob but consumes the section
        let mut reader = &b"other"[..];
        bundle.read_from(&mut reader).unwrap();
        assert!(reader.is_empty());
        assert_eq!(bundle.data().unwrap(), &b"blob"[..]);

        bundle.unload();
        assert_eq!(bundle.state(), State::NotLoaded);
        assert!(bundle.data().is_none());
    }

    #[test]
    fn write_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("winter-linux-sharedassets");
        fs_err::write(&path, b"opaque bundle").unwrap();

        let mut bytes = vec![];
        ContentBundle::from_file(&path).write_to(&mut bytes).unwrap();
        assert_eq!(bytes, b"opaque bundle");

        assert!(matches!(
            ContentBundle::default().write_to(&mut bytes),
            Err(EncodeError::MissingSource)
        ));
        assert!(ContentBundle::from_file(dir.path().join("missing"))
            .write_to(&mut bytes)
            .is_err());
    }
}
