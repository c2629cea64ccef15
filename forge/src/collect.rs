// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Asset discovery and classification below a content root

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use capsule::Platform;
use itertools::Itertools;
use log::{debug, trace};
use strum::IntoEnumIterator;

use crate::util;

/// Folders excluded on every platform
pub const ALWAYS_EXCLUDED: [&str; 2] = ["Editor", "Exclude"];

pub const SCENE_EXTENSION: &str = "unity";
pub const SCRIPT_EXTENSION: &str = "cs";

/// Extensions never packed into a capsule
pub const DISALLOWED_EXTENSIONS: [&str; 3] = ["asmdef", "asmref", "meta"];

/// Type name of profile documents stored alongside content
pub const PROFILE_TYPE: &str = "DlcProfile";

/// A file found below the content root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub path: PathBuf,
    /// Relative to the content root
    pub relative_path: PathBuf,
    /// Lowercase, without the leading dot
    pub extension: String,
    pub type_name: Option<String>,
}

impl AssetRef {
    pub fn relative_str(&self) -> String {
        self.relative_path.to_string_lossy().replace('\\', "/")
    }
}

/// Lists candidate assets of a content root
pub trait AssetEnumerator {
    /// Every file below `root` not inside a folder named in `excludes`
    fn enumerate(&self, root: &Path, excludes: &[String]) -> io::Result<Vec<AssetRef>>;
}

/// Walks the filesystem, resolving type names from a table of extensions
#[derive(Debug, Clone, Default)]
pub struct DirectoryEnumerator {
    pub types: BTreeMap<String, String>,
}

impl DirectoryEnumerator {
    pub fn new(types: BTreeMap<String, String>) -> Self {
        Self { types }
    }
}

impl AssetEnumerator for DirectoryEnumerator {
    fn enumerate(&self, root: &Path, excludes: &[String]) -> io::Result<Vec<AssetRef>> {
        let skip_dir = |dir: &Path| {
            let relative = dir.strip_prefix(root).unwrap_or(dir);
            match matching_exclude(relative, excludes) {
                Some(name) => {
                    trace!("Excluding {relative:?} ({name})");
                    true
                }
                None => false,
            }
        };

        let files = util::enumerate_files(root, &skip_dir)?;

        Ok(files
            .into_iter()
            .map(|path| {
                let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                let extension = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .unwrap_or_default()
                    .to_lowercase();
                let type_name = self.types.get(&extension).cloned();

                AssetRef {
                    path,
                    relative_path,
                    extension,
                    type_name,
                }
            })
            .collect())
    }
}

/// Folder names excluded when building for `platform`: the always
/// excluded folders followed by the folders of every other platform family
pub fn exclude_folders(platform: Platform) -> Vec<String> {
    let own = platform.folder_name();

    ALWAYS_EXCLUDED
        .into_iter()
        .chain(Platform::iter().map(|other| other.folder_name()).filter(|name| *name != own))
        .unique()
        .map(str::to_owned)
        .collect()
}

/// First exclude name matching any component of `relative`
pub fn matching_exclude<'a>(relative: &Path, excludes: &'a [String]) -> Option<&'a str> {
    relative.components().find_map(|component| {
        let component = component.as_os_str().to_str()?;
        excludes
            .iter()
            .find(|exclude| exclude.as_str() == component)
            .map(String::as_str)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Scene,
    Script,
    Shared,
}

/// Classify by extension, `None` for assets that must never be packed
pub fn classify(asset: &AssetRef) -> Option<Class> {
    if DISALLOWED_EXTENSIONS.contains(&asset.extension.as_str()) || asset.type_name.as_deref() == Some(PROFILE_TYPE) {
        return None;
    }

    Some(match asset.extension.as_str() {
        SCENE_EXTENSION => Class::Scene,
        SCRIPT_EXTENSION => Class::Script,
        _ => Class::Shared,
    })
}

/// Assets of one build, each in exactly one group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    pub scenes: Vec<AssetRef>,
    pub scripts: Vec<AssetRef>,
    pub shared: Vec<AssetRef>,
}

impl Collection {
    /// Group `assets`, dropping scripts when they cannot be used
    pub fn new(assets: Vec<AssetRef>, scripting: bool) -> Self {
        let mut collection = Self::default();

        for asset in assets {
            match classify(&asset) {
                Some(Class::Scene) => collection.scenes.push(asset),
                Some(Class::Script) if scripting => collection.scripts.push(asset),
                Some(Class::Script) => debug!("Skipping script {:?}, scripting unavailable", asset.relative_path),
                Some(Class::Shared) => collection.shared.push(asset),
                None => debug!("Skipping disallowed asset {:?}", asset.relative_path),
            }
        }

        collection
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty() && self.scripts.is_empty() && self.shared.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scenes.len() + self.scripts.len() + self.shared.len()
    }
}
