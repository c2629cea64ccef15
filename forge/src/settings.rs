// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Tool wide settings, stored in the `forge` config domain

use std::{collections::BTreeMap, path::PathBuf};

use capsule::{signing::ProductPolicy, Version};
use config::Config;
use serde::{Deserialize, Serialize};

/// Product the capsules are signed for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub version: String,
}

impl Product {
    pub fn policy(&self) -> ProductPolicy {
        ProductPolicy::new(&self.name, &self.version)
    }
}

/// An external tool invocation, `args` precede the arguments forge adds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    #[serde(default)]
    pub product: Option<Product>,
    /// Version string of the engine the content targets
    #[serde(default)]
    pub engine_version: Option<String>,
    #[serde(default)]
    pub compiler: Option<Tool>,
    #[serde(default)]
    pub bundler: Option<Tool>,
    /// Asset type names keyed by file extension
    #[serde(default)]
    pub asset_types: BTreeMap<String, String>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Settings {
    pub fn toolkit_version() -> Version {
        Version::new(
            env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or_default(),
            env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or_default(),
        )
        .with_build(env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or_default())
    }
}

impl Config for Settings {
    fn domain() -> String {
        "forge".into()
    }

    fn merge(self, other: Self) -> Self {
        Self {
            product: other.product.or(self.product),
            engine_version: other.engine_version.or(self.engine_version),
            compiler: other.compiler.or(self.compiler),
            bundler: other.bundler.or(self.bundler),
            asset_types: self.asset_types.into_iter().chain(other.asset_types).collect(),
            output_dir: other.output_dir.or(self.output_dir),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn later_layers_win() {
        let vendor: Settings = serde_yaml::from_str(
            "
engine-version: 2022.3.1f1
bundler:
  program: /usr/bin/bundle
asset-types:
  mat: Material
  png: Texture2D
",
        )
        .unwrap();
        let admin: Settings = serde_yaml::from_str(
            "
product:
  name: Game
  version: '1.2'
asset-types:
  png: Sprite
",
        )
        .unwrap();

        let merged = vendor.merge(admin);

        assert_eq!(merged.engine_version.as_deref(), Some("2022.3.1f1"));
        assert_eq!(merged.product.unwrap().name, "Game");
        assert_eq!(merged.bundler.unwrap().program, PathBuf::from("/usr/bin/bundle"));
        assert_eq!(merged.asset_types["png"], "Sprite");
        assert_eq!(merged.asset_types["mat"], "Material");
    }
}
