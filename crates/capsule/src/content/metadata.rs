// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{
    fmt,
    io::{Read, Write},
};

use chrono::{DateTime, Utc};
use log::warn;

use super::{Content, DecodeError, EncodeError};
use crate::{
    codec::{
        decode_string, decode_timestamp, decode_version, encode_string, encode_timestamp, encode_version, Version,
    },
    ext::{ReadExt, WriteExt},
    registry::{self, CustomMetadata, Value},
    Flags,
};

/// Identity and provenance of a capsule
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub name: String,
    pub unique_key: String,
    pub version: Version,
    pub guid: String,
    pub description: String,
    pub developer: String,
    pub publisher: String,
    pub toolkit_version: Version,
    pub engine_version: String,
    pub content_flags: Flags,
    pub build_time: DateTime<Utc>,
    pub shipped_with_game: bool,
    pub custom: Option<CustomValue>,
}

/// Custom metadata as stored, plus the decoded value when the
/// type name is registered with this process
#[derive(Clone)]
pub struct CustomValue {
    pub type_name: String,
    pub serialized: String,
    resolved: Option<Value>,
}

impl CustomValue {
    pub fn new<T: CustomMetadata>(value: T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            type_name: T::TYPE_NAME.to_owned(),
            serialized: serde_json::to_string(&value)?,
            resolved: Some(std::sync::Arc::new(value)),
        })
    }

    /// Resolve through the process registry, unknown types are kept raw
    fn resolve(type_name: String, serialized: String) -> Self {
        let resolved = match registry::get().resolve_metadata(&type_name, &serialized) {
            Some(Ok(value)) => Some(value),
            Some(Err(error)) => {
                warn!("Custom metadata {type_name} could not be decoded: {error}");
                None
            }
            None => {
                warn!("Custom metadata type {type_name} is not registered, keeping raw value");
                None
            }
        };

        Self {
            type_name,
            serialized,
            resolved,
        }
    }

    pub fn get<T: CustomMetadata>(&self) -> Option<&T> {
        self.resolved.as_ref()?.downcast_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomValue")
            .field("type_name", &self.type_name)
            .field("serialized", &self.serialized)
            .field("resolved", &self.resolved.is_some())
            .finish()
    }
}

impl PartialEq for CustomValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.serialized == other.serialized
    }
}

impl Content for Metadata {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        encode_string(writer, &self.name)?;
        encode_string(writer, &self.unique_key)?;
        encode_version(writer, &self.version)?;
        encode_string(writer, &self.guid)?;
        encode_string(writer, &self.description)?;
        encode_string(writer, &self.developer)?;
        encode_string(writer, &self.publisher)?;
        encode_version(writer, &self.toolkit_version)?;
        encode_string(writer, &self.engine_version)?;
        writer.write_u16(self.content_flags.intersection(Flags::CONTENT).bits())?;
        encode_timestamp(writer, &self.build_time)?;
        writer.write_bool(self.shipped_with_game)?;

        writer.write_bool(self.custom.is_some())?;
        if let Some(custom) = &self.custom {
            encode_string(writer, &custom.type_name)?;
            encode_string(writer, &custom.serialized)?;
        }

        Ok(())
    }

    fn read_from<R: Read>(&mut self, reader: &mut R) -> Result<(), DecodeError> {
        self.name = decode_string(reader)?;
        self.unique_key = decode_string(reader)?;
        self.version = decode_version(reader)?;
        self.guid = decode_string(reader)?;
        self.description = decode_string(reader)?;
        self.developer = decode_string(reader)?;
        self.publisher = decode_string(reader)?;
        self.toolkit_version = decode_version(reader)?;
        self.engine_version = decode_string(reader)?;
        // Anything outside the content bits belongs to the header
        self.content_flags = Flags::from_bits_truncate(reader.read_u16()?).intersection(Flags::CONTENT);
        self.build_time = decode_timestamp(reader)?;
        self.shipped_with_game = reader.read_bool()?;

        self.custom = if reader.read_bool()? {
            let type_name = decode_string(reader)?;
            let serialized = decode_string(reader)?;
            Some(CustomValue::resolve(type_name, serialized))
        } else {
            None
        };

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Storefront {
        sku: String,
    }

    impl CustomMetadata for Storefront {
        const TYPE_NAME: &'static str = "metadata-test.storefront";
    }

    fn sample() -> Metadata {
        Metadata {
            name: "Winter Pack".to_owned(),
            unique_key: "winter".to_owned(),
            version: Version::new(1, 4).with_build(2),
            guid: "0f8fad5b-d9cb-469f-a165-70867728950e".to_owned(),
            description: "Snow ✓".to_owned(),
            developer: "Studio".to_owned(),
            publisher: "Publisher".to_owned(),
            toolkit_version: Version::new(0, 3),
            engine_version: "2022.3.1f1".to_owned(),
            content_flags: Flags::SCENES | Flags::SHARED_ASSETS,
            build_time: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            shipped_with_game: true,
            custom: None,
        }
    }

    fn roundtrip(metadata: &Metadata) -> Metadata {
        let mut bytes = vec![];
        metadata.write_to(&mut bytes).unwrap();

        let mut decoded = Metadata::default();
        let mut reader = bytes.as_slice();
        decoded.read_from(&mut reader).unwrap();
        assert!(reader.is_empty());
        decoded
    }

    #[test]
    fn roundtrip_plain() {
        let metadata = sample();
        assert_eq!(roundtrip(&metadata), metadata);
    }

    #[test]
    fn custom_metadata() {
        let mut metadata = sample();
        metadata.custom = Some(CustomValue::new(Storefront { sku: "W-1".to_owned() }).unwrap());

        // Unregistered types survive as raw values
        let decoded = roundtrip(&metadata);
        let custom = decoded.custom.as_ref().unwrap();
        assert!(!custom.is_resolved());
        assert_eq!(custom.serialized, r#"{"sku":"W-1"}"#);

        registry::register(|registry| registry.register_metadata::<Storefront>());

        let decoded = roundtrip(&metadata);
        assert_eq!(
            decoded.custom.unwrap().get::<Storefront>(),
            Some(&Storefront { sku: "W-1".to_owned() })
        );
    }
}
