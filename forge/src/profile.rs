// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{
    collections::{btree_map, BTreeMap},
    fmt,
    path::PathBuf,
};

use capsule::{signing, Platform};
use chrono::{DateTime, Utc};
use config::Config;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{platform::PlatformProfile, Env};

/// A unique [`Profile`] identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Id(String);

impl Id {
    pub fn new(identifier: impl AsRef<str>) -> Self {
        Self(
            identifier
                .as_ref()
                .chars()
                .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
                .collect(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Icon image files, paths are relative to the content root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Icons {
    #[serde(default)]
    pub small: Option<PathBuf>,
    #[serde(default)]
    pub medium: Option<PathBuf>,
    #[serde(default)]
    pub large: Option<PathBuf>,
    #[serde(default)]
    pub extra_large: Option<PathBuf>,
    #[serde(default)]
    pub custom: BTreeMap<String, PathBuf>,
}

/// Bookkeeping written back after a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LastBuild {
    pub time: DateTime<Utc>,
    pub success: bool,
    pub platforms: Vec<Platform>,
}

/// User authored description of one DLC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Profile {
    pub guid: String,
    pub name: String,
    pub version: String,
    pub content_root: PathBuf,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub developer: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub icons: Icons,
    #[serde(default)]
    pub signing: signing::Mode,
    #[serde(default)]
    pub platforms: Vec<PlatformProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_build: Option<LastBuild>,
}

/// A map of profiles
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Map(BTreeMap<Id, Profile>);

impl Map {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn with(items: impl IntoIterator<Item = (Id, Profile)>) -> Self {
        Self(items.into_iter().collect())
    }

    pub fn get(&self, id: &Id) -> Option<&Profile> {
        self.0.get(id)
    }

    pub fn add(&mut self, id: Id, profile: Profile) {
        self.0.insert(id, profile);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Id, &Profile)> {
        self.0.iter()
    }
}

impl IntoIterator for Map {
    type Item = (Id, Profile);
    type IntoIter = btree_map::IntoIter<Id, Profile>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Config for Map {
    fn domain() -> String {
        "profile".into()
    }

    fn merge(self, other: Self) -> Self {
        Self(self.0.into_iter().chain(other.0).collect())
    }
}

/// A change to a stored profile, handed back by a build instead of
/// mutating the profile in place
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    LastBuild { id: Id, last_build: LastBuild },
}

impl Update {
    pub fn id(&self) -> &Id {
        match self {
            Update::LastBuild { id, .. } => id,
        }
    }

    fn apply(self, profile: &mut Profile) {
        match self {
            Update::LastBuild { last_build, .. } => profile.last_build = Some(last_build),
        }
    }
}

pub struct Manager<'a> {
    pub profiles: Map,
    env: &'a Env,
}

impl<'a> Manager<'a> {
    pub fn new(env: &'a Env) -> Manager<'a> {
        let profiles = env.config.load::<Map>().unwrap_or_default();

        Self { env, profiles }
    }

    pub fn get(&self, id: &Id) -> Result<&Profile, Error> {
        self.profiles.get(id).ok_or_else(|| Error::MissingProfile(id.clone()))
    }

    pub fn save_profile(&mut self, id: Id, profile: Profile) -> Result<(), Error> {
        let map = Map::with([(id.clone(), profile.clone())]);
        self.env.config.save(&id, &map)?;

        self.profiles.add(id, profile);

        Ok(())
    }

    /// Apply and persist updates, returning how many profiles changed
    pub fn apply(&mut self, updates: impl IntoIterator<Item = Update>) -> Result<usize, Error> {
        let mut changed = BTreeMap::new();

        for update in updates {
            let id = update.id().clone();
            let Some(profile) = self.profiles.0.get_mut(&id) else {
                log::warn!("Dropping update for unknown profile {id}");
                continue;
            };
            update.apply(profile);
            changed.insert(id, profile.clone());
        }

        let count = changed.len();
        for (id, profile) in changed {
            self.save_profile(id, profile)?;
        }

        Ok(count)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot find profile {0}")]
    MissingProfile(Id),
    #[error("save profiles")]
    SaveProfile(#[from] config::SaveError),
}
