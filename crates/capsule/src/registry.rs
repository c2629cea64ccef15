// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Process wide lookup of types referenced by name inside a capsule
//!
//! Custom metadata and packed asset types are stored as stable name
//! strings. Hosts register the names they understand at startup, lookups
//! for anything else simply come back empty.

use std::{
    any::Any,
    borrow::Borrow,
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard},
};

use serde::{de::DeserializeOwned, Serialize};

/// Decoded custom metadata value
pub type Value = Arc<dyn Any + Send + Sync>;

type Decoder = fn(&str) -> Result<Value, serde_json::Error>;

static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();

/// Host defined metadata stored alongside the standard fields
pub trait CustomMetadata: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE_NAME: &'static str;
}

/// Resolved name of a packed asset type
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetType(Arc<str>);

impl AssetType {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for AssetType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[derive(Default)]
pub struct Registry {
    metadata: BTreeMap<String, Decoder>,
    asset_types: BTreeSet<AssetType>,
}

impl Registry {
    pub fn register_metadata<T: CustomMetadata>(&mut self) {
        self.metadata.insert(T::TYPE_NAME.to_owned(), decode::<T>);
    }

    pub fn register_asset_type(&mut self, name: &str) {
        self.asset_types.insert(AssetType(Arc::from(name)));
    }

    /// `None` when no decoder is registered for `type_name`
    pub fn resolve_metadata(&self, type_name: &str, serialized: &str) -> Option<Result<Value, serde_json::Error>> {
        self.metadata.get(type_name).map(|decode| decode(serialized))
    }

    pub fn resolve_asset_type(&self, name: &str) -> Option<AssetType> {
        self.asset_types.get(name).cloned()
    }
}

fn decode<T: CustomMetadata>(serialized: &str) -> Result<Value, serde_json::Error> {
    Ok(Arc::new(serde_json::from_str::<T>(serialized)?))
}

fn global() -> &'static RwLock<Registry> {
    REGISTRY.get_or_init(Default::default)
}

/// Read access to the process wide registry
pub fn get() -> RwLockReadGuard<'static, Registry> {
    global().read().unwrap_or_else(PoisonError::into_inner)
}

/// Populate the process wide registry
pub fn register(f: impl FnOnce(&mut Registry)) {
    let mut registry = global().write().unwrap_or_else(PoisonError::into_inner);
    f(&mut registry);
}

#[cfg(test)]
mod test {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Season {
        number: u32,
    }

    impl CustomMetadata for Season {
        const TYPE_NAME: &'static str = "test.season";
    }

    #[test]
    fn lookup() {
        let mut registry = Registry::default();
        registry.register_metadata::<Season>();
        registry.register_asset_type("Texture2D");

        let value = registry.resolve_metadata("test.season", r#"{"number":3}"#).unwrap().unwrap();
        assert_eq!(value.downcast_ref::<Season>(), Some(&Season { number: 3 }));

        assert!(registry.resolve_metadata("test.season", "not json").unwrap().is_err());
        assert!(registry.resolve_metadata("test.unknown", "{}").is_none());
        assert_eq!(registry.resolve_asset_type("Texture2D").unwrap().name(), "Texture2D");
        assert!(registry.resolve_asset_type("Mesh").is_none());
        assert!(registry.resolve_asset_type("texture2d").is_none());
    }

    #[test]
    fn asset_types_are_deduplicated() {
        let mut registry = Registry::default();
        for name in ["Material", "Texture2D", "Material"] {
            registry.register_asset_type(name);
        }

        assert_eq!(registry.asset_types.len(), 2);
        let material = registry.resolve_asset_type("Material").unwrap();
        assert!(Arc::ptr_eq(
            &material.0,
            &registry.resolve_asset_type("Material").unwrap().0
        ));
    }
}
