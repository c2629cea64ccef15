// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::io::{Read, Write};

use log::warn;

use super::{decode_count, encode_count, Content, DecodeError, EncodeError};
use crate::{
    codec::{decode_string, encode_string},
    registry::{self, AssetType},
};

/// One asset packed into a companion content bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub path: String,
    pub relative_path: String,
    pub type_name: String,
    /// `None` when this process has no registered type by that name
    pub resolved: Option<AssetType>,
}

impl Asset {
    pub fn new(path: impl ToString, relative_path: impl ToString, type_name: impl ToString) -> Self {
        let type_name = type_name.to_string();
        Self {
            path: path.to_string(),
            relative_path: relative_path.to_string(),
            resolved: registry::get().resolve_asset_type(&type_name),
            type_name,
        }
    }
}

/// Listing of the assets in a shared or scene content bundle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleMetadata {
    pub relative_root: String,
    pub assets: Vec<Asset>,
}

impl BundleMetadata {
    pub fn new(relative_root: impl ToString) -> Self {
        Self {
            relative_root: relative_root.to_string(),
            assets: vec![],
        }
    }

    pub fn find(&self, relative_path: &str) -> Option<&Asset> {
        self.assets.iter().find(|asset| asset.relative_path == relative_path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.assets.iter().map(|asset| asset.path.as_str())
    }
}

impl Content for BundleMetadata {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        encode_string(writer, &self.relative_root)?;
        encode_count(writer, self.assets.len())?;

        for asset in &self.assets {
            encode_string(writer, &asset.path)?;
            encode_string(writer, &asset.relative_path)?;
            encode_string(writer, &asset.type_name)?;
        }

        Ok(())
    }

    fn read_from<R: Read>(&mut self, reader: &mut R) -> Result<(), DecodeError> {
        self.relative_root = decode_string(reader)?;
        let count = decode_count(reader)?;

        let registry = registry::get();

        self.assets = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let path = decode_string(reader)?;
            let relative_path = decode_string(reader)?;
            let type_name = decode_string(reader)?;

            let resolved = registry.resolve_asset_type(&type_name);
            if resolved.is_none() {
                warn!("Unknown asset type {type_name} for {relative_path}");
            }

            self.assets.push(Asset {
                path,
                relative_path,
                type_name,
                resolved,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unresolved_types_are_kept() {
        registry::register(|registry| registry.register_asset_type("bundle-meta-test.Material"));

        let mut listing = BundleMetadata::new("Content/Winter");
        listing.assets.push(Asset::new(
            "Content/Winter/snow.mat",
            "snow.mat",
            "bundle-meta-test.Material",
        ));
        listing.assets.push(Asset::new(
            "Content/Winter/custom.bin",
            "custom.bin",
            "bundle-meta-test.Unknown",
        ));

        let mut bytes = vec![];
        listing.write_to(&mut bytes).unwrap();

        let mut decoded = BundleMetadata::default();
        let mut reader = bytes.as_slice();
        decoded.read_from(&mut reader).unwrap();

        assert!(reader.is_empty());
        assert_eq!(decoded, listing);
        assert_eq!(
            decoded.find("snow.mat").unwrap().resolved.as_ref().map(AssetType::name),
            Some("bundle-meta-test.Material")
        );
        assert_eq!(decoded.find("custom.bin").unwrap().resolved, None);
        assert_eq!(decoded.paths().count(), 2);
    }
}
