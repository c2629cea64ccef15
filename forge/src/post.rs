// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Platform specific steps run on a written capsule

use std::{
    io,
    path::{Path, PathBuf},
};

use fs_err as fs;
use log::debug;
use thiserror::Error;

use crate::{platform::PlatformProfile, util};

pub trait PostStep {
    fn name(&self) -> &str;

    fn applies_to(&self, profile: &PlatformProfile) -> bool;

    fn run(&self, profile: &PlatformProfile, capsule: &Path) -> Result<(), Error>;
}

/// Wraps Android capsules in a Play asset pack module
///
/// The module is laid out below `root` as `{pack}/build.gradle` plus
/// `{pack}/src/main/assets/{capsule}`.
#[derive(Debug, Clone)]
pub struct AssetPack {
    pub root: PathBuf,
}

impl AssetPack {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn module_dir(&self, pack: &str) -> PathBuf {
        self.root.join(pack)
    }
}

impl PostStep for AssetPack {
    fn name(&self) -> &str {
        "asset-pack"
    }

    fn applies_to(&self, profile: &PlatformProfile) -> bool {
        profile.android().is_some_and(|android| android.asset_pack.is_some())
    }

    fn run(&self, profile: &PlatformProfile, capsule: &Path) -> Result<(), Error> {
        let Some((android, pack)) = profile
            .android()
            .and_then(|android| Some((android, android.asset_pack.as_deref()?)))
        else {
            return Ok(());
        };

        let module = self.module_dir(pack);
        let assets = module.join("src").join("main").join("assets");
        util::ensure_dir_exists(&assets)?;

        let file_name = capsule.file_name().ok_or_else(|| Error::NotAFile(capsule.to_owned()))?;
        util::hardlink_or_copy(capsule, &assets.join(file_name))?;

        fs::write(
            module.join("build.gradle"),
            format!(
                "plugins {{\n    id 'com.android.asset-pack'\n}}\n\nassetPack {{\n    packName = \"{pack}\"\n    dynamicDelivery {{\n        deliveryType = \"{}\"\n    }}\n}}\n",
                android.delivery
            ),
        )?;

        debug!("Asset pack {pack} written to {module:?}");

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("not a file: {0:?}")]
    NotAFile(PathBuf),
    #[error("io")]
    Io(#[from] io::Error),
}
