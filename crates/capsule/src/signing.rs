// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Product binding of a capsule
//!
//! A signed capsule carries the hash of the product it was built for, and
//! optionally the hash of the exact product version. Both are checked against
//! a [`SigningPolicy`] supplied by the host when the capsule is opened.

use std::io::{self, Read, Write};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{
    ext::{ReadExt, WriteExt},
    Flags,
};

pub type Hash = [u8; 32];

/// Decides the hashes a capsule must carry to be usable by this host
pub trait SigningPolicy {
    fn product_hash(&self) -> Hash;

    fn version_hash(&self) -> Hash;
}

/// Policy derived from a product name and version with SHA-256
#[derive(Debug, Clone)]
pub struct ProductPolicy {
    product_hash: Hash,
    version_hash: Hash,
}

impl ProductPolicy {
    pub fn new(product: &str, version: &str) -> Self {
        Self {
            product_hash: Sha256::digest(product.as_bytes()).into(),
            version_hash: Sha256::new()
                .chain_update(product.as_bytes())
                .chain_update([0])
                .chain_update(version.as_bytes())
                .finalize()
                .into(),
        }
    }
}

impl SigningPolicy for ProductPolicy {
    fn product_hash(&self) -> Hash {
        self.product_hash
    }

    fn version_hash(&self) -> Hash {
        self.version_hash
    }
}

/// How a capsule binds itself to the product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Mode {
    #[default]
    Unsigned,
    /// Usable by any version of the product
    Product,
    /// Usable only by the exact product version it was built against
    ProductVersion,
}

impl Mode {
    pub fn flags(&self) -> Flags {
        match self {
            Mode::Unsigned => Flags::empty(),
            Mode::Product => Flags::SIGNED,
            Mode::ProductVersion => Flags::SIGNED | Flags::VERSION_SIGNED,
        }
    }
}

/// Signing block following the header, its size is fully
/// determined by the header flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub product: Hash,
    pub version: Option<Hash>,
}

impl Signature {
    pub fn new(mode: Mode, policy: &dyn SigningPolicy) -> Option<Self> {
        match mode {
            Mode::Unsigned => None,
            Mode::Product => Some(Self {
                product: policy.product_hash(),
                version: None,
            }),
            Mode::ProductVersion => Some(Self {
                product: policy.product_hash(),
                version: Some(policy.version_hash()),
            }),
        }
    }

    pub fn encoded_size(flags: Flags) -> usize {
        match (flags.contains(Flags::SIGNED), flags.contains(Flags::VERSION_SIGNED)) {
            (true, true) => 64,
            (true, false) => 32,
            _ => 0,
        }
    }

    pub fn flags(&self) -> Flags {
        if self.version.is_some() {
            Flags::SIGNED | Flags::VERSION_SIGNED
        } else {
            Flags::SIGNED
        }
    }

    /// Returns `None` when the flags say the capsule is unsigned
    pub fn decode<R: Read + ?Sized>(reader: &mut R, flags: Flags) -> Result<Option<Self>, io::Error> {
        if !flags.contains(Flags::SIGNED) {
            return Ok(None);
        }

        let product = reader.read_array()?;
        let version = if flags.contains(Flags::VERSION_SIGNED) {
            Some(reader.read_array()?)
        } else {
            None
        };

        Ok(Some(Self { product, version }))
    }

    pub fn encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), io::Error> {
        writer.write_array(self.product)?;
        if let Some(version) = self.version {
            writer.write_array(version)?;
        }
        Ok(())
    }

    pub fn verify(&self, policy: &dyn SigningPolicy) -> Result<(), VerifyError> {
        if self.product != policy.product_hash() {
            return Err(VerifyError::Product {
                expected: hex::encode(policy.product_hash()),
                found: hex::encode(self.product),
            });
        }

        if let Some(version) = self.version {
            if version != policy.version_hash() {
                return Err(VerifyError::Version {
                    expected: hex::encode(policy.version_hash()),
                    found: hex::encode(version),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("capsule was built for another product (expected {expected}, found {found})")]
    Product { expected: String, found: String },
    #[error("capsule was built for another product version (expected {expected}, found {found})")]
    Version { expected: String, found: String },
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn block_size_follows_flags() {
        let policy = ProductPolicy::new("Game", "1.0");

        for mode in [Mode::Unsigned, Mode::Product, Mode::ProductVersion] {
            let flags = mode.flags();
            let mut bytes = vec![];

            if let Some(signature) = Signature::new(mode, &policy) {
                assert_eq!(signature.flags(), flags);
                signature.encode(&mut bytes).unwrap();
            }

            assert_eq!(bytes.len(), Signature::encoded_size(flags));

            let decoded = Signature::decode(&mut Cursor::new(&bytes), flags).unwrap();
            assert_eq!(decoded, Signature::new(mode, &policy));
        }
    }

    #[test]
    fn verify() {
        let policy = ProductPolicy::new("Game", "1.0");
        let signature = Signature::new(Mode::ProductVersion, &policy).unwrap();

        assert!(signature.verify(&policy).is_ok());
        assert!(matches!(
            signature.verify(&ProductPolicy::new("Game", "1.1")),
            Err(VerifyError::Version { .. })
        ));
        assert!(matches!(
            signature.verify(&ProductPolicy::new("Other", "1.0")),
            Err(VerifyError::Product { .. })
        ));

        // Product-only binding survives a version bump
        let signature = Signature::new(Mode::Product, &policy).unwrap();
        assert!(signature.verify(&ProductPolicy::new("Game", "2.0")).is_ok());
    }
}
