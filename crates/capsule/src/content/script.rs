// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::io::{Read, Write};

use bytes::Bytes;
use log::{debug, error};
use thiserror::Error;

use super::{decode_count, encode_count, Content, DecodeError, EncodeError};
use crate::{
    codec::{decode_string, encode_string},
    ext::{ReadExt, WriteExt},
};

const NO_SYMBOLS: i64 = -1;

/// A compiled script image with optional debug symbols
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    pub name: String,
    pub image: Bytes,
    pub symbols: Option<Bytes>,
}

impl Assembly {
    pub fn new(name: impl ToString, image: impl Into<Bytes>) -> Self {
        Self {
            name: name.to_string(),
            image: image.into(),
            symbols: None,
        }
    }

    pub fn with_symbols(self, symbols: impl Into<Bytes>) -> Self {
        Self {
            symbols: Some(symbols.into()),
            ..self
        }
    }
}

/// Loads assemblies into the host runtime
pub trait AssemblyLoader {
    fn load(&mut self, assembly: &Assembly) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, Error)]
#[error("load assembly {name}")]
pub struct LoadError {
    pub name: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// Ordered script assemblies
///
/// Stored as a header table of `(name, image length, symbols length)`
/// followed by the bodies in the same order. Decoding keeps the bodies in
/// a single buffer, each assembly is a view into it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptAssembly {
    assemblies: Vec<Assembly>,
}

impl ScriptAssembly {
    pub fn new(assemblies: Vec<Assembly>) -> Self {
        Self { assemblies }
    }

    pub fn push(&mut self, assembly: Assembly) {
        self.assemblies.push(assembly);
    }

    pub fn assemblies(&self) -> &[Assembly] {
        &self.assemblies
    }

    pub fn is_empty(&self) -> bool {
        self.assemblies.is_empty()
    }

    /// Load in order, stopping at the first failure since later
    /// assemblies may reference earlier ones
    pub fn load_all(&self, loader: &mut impl AssemblyLoader) -> Result<usize, LoadError> {
        for (loaded, assembly) in self.assemblies.iter().enumerate() {
            if let Err(source) = loader.load(assembly) {
                error!(
                    "Failed to load assembly {}, {loaded} of {} loaded",
                    assembly.name,
                    self.assemblies.len()
                );
                return Err(LoadError {
                    name: assembly.name.clone(),
                    source,
                });
            }
            debug!("Loaded assembly {}", assembly.name);
        }

        Ok(self.assemblies.len())
    }
}

fn length(bytes: &[u8]) -> i64 {
    bytes.len() as i64
}

fn checked_length(name: &str, length: i64) -> Result<usize, DecodeError> {
    usize::try_from(length).map_err(|_| DecodeError::InvalidLength {
        name: name.to_owned(),
        length,
    })
}

impl Content for ScriptAssembly {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        encode_count(writer, self.assemblies.len())?;

        for assembly in &self.assemblies {
            encode_string(writer, &assembly.name)?;
            writer.write_i64(length(&assembly.image))?;
            writer.write_i64(assembly.symbols.as_deref().map(length).unwrap_or(NO_SYMBOLS))?;
        }

        for assembly in &self.assemblies {
            writer.write_all(&assembly.image)?;
            if let Some(symbols) = &assembly.symbols {
                writer.write_all(symbols)?;
            }
        }

        Ok(())
    }

    fn read_from<R: Read>(&mut self, reader: &mut R) -> Result<(), DecodeError> {
        let count = decode_count(reader)?;

        let mut layout = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let name = decode_string(reader)?;
            let image = checked_length(&name, reader.read_i64()?)?;
            let symbols = match reader.read_i64()? {
                NO_SYMBOLS => None,
                length => Some(checked_length(&name, length)?),
            };
            layout.push((name, image, symbols));
        }

        let total = layout
            .iter()
            .try_fold(0usize, |total, (_, image, symbols)| {
                total.checked_add(*image)?.checked_add(symbols.unwrap_or_default())
            })
            .ok_or_else(|| DecodeError::InvalidLength {
                name: "script bodies".to_owned(),
                length: -1,
            })?;

        let mut body = Vec::with_capacity(total.min(64 << 20));
        reader.by_ref().take(total as u64).read_to_end(&mut body)?;
        if body.len() != total {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        let body = Bytes::from(body);

        let mut offset = 0;
        let mut slice = |length: usize| {
            let view = body.slice(offset..offset + length);
            offset += length;
            view
        };

        self.assemblies = layout
            .into_iter()
            .map(|(name, image, symbols)| Assembly {
                name,
                image: slice(image),
                symbols: symbols.map(&mut slice),
            })
            .collect();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        loaded: Vec<String>,
        broken: Option<&'static str>,
    }

    impl AssemblyLoader for Recorder {
        fn load(&mut self, assembly: &Assembly) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            if self.broken == Some(assembly.name.as_str()) {
                return Err("bad image".into());
            }
            self.loaded.push(assembly.name.clone());
            Ok(())
        }
    }

    fn sample() -> ScriptAssembly {
        ScriptAssembly::new(vec![
            Assembly::new("Dlc.Core", b"core-image".to_vec()).with_symbols(b"core-pdb".to_vec()),
            Assembly::new("Dlc.Gameplay", b"gameplay".to_vec()),
            Assembly::new("Dlc.Ui", Vec::new()).with_symbols(Vec::new()),
        ])
    }

    #[test]
    fn roundtrip() {
        let scripts = sample();

        let mut bytes = vec![];
        scripts.write_to(&mut bytes).unwrap();

        let mut decoded = ScriptAssembly::default();
        let mut reader = bytes.as_slice();
        decoded.read_from(&mut reader).unwrap();

        assert!(reader.is_empty());
        assert_eq!(decoded, scripts);
        assert_eq!(decoded.assemblies()[1].symbols, None);
        assert_eq!(decoded.assemblies()[2].symbols.as_deref(), Some(&[][..]));
    }

    #[test]
    fn load_stops_at_first_failure() {
        let scripts = sample();

        let mut loader = Recorder {
            broken: Some("Dlc.Gameplay"),
            ..Default::default()
        };
        let error = scripts.load_all(&mut loader).unwrap_err();

        assert_eq!(error.name, "Dlc.Gameplay");
        assert_eq!(loader.loaded, ["Dlc.Core"]);

        let mut loader = Recorder::default();
        assert_eq!(scripts.load_all(&mut loader).unwrap(), 3);
    }
}
