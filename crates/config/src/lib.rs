// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Layered YAML configuration
//!
//! Each domain is read from `{domain}.yaml` followed by every file in
//! `{domain}.d/` (sorted by name) and the results are merged in that order.
//! System scope reads vendor (`usr/share`) before admin (`etc`) layers.

use std::{
    fmt, io,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

const EXTENSION: &str = "yaml";

pub trait Config: DeserializeOwned {
    fn domain() -> String;

    /// Combine with a later layer, `other` takes precedence
    fn merge(self, other: Self) -> Self;
}

#[derive(Debug, Clone)]
pub struct Manager {
    scope: Scope,
}

impl Manager {
    /// Loaded from `usr/share/{program}` then `etc/{program}` relative to
    /// `root`, saved to the latter
    pub fn system(root: impl Into<PathBuf>, program: impl ToString) -> Self {
        Self {
            scope: Scope::System {
                root: root.into(),
                program: program.to_string(),
            },
        }
    }

    /// Loaded from and saved to `$XDG_CONFIG_HOME/{program}`
    pub fn user(program: impl ToString) -> Result<Self, CreateUserError> {
        Ok(Self {
            scope: Scope::User {
                config: dirs::config_dir().ok_or(CreateUserError)?,
                program: program.to_string(),
            },
        })
    }

    /// Loaded from and saved to `path`
    pub fn custom(path: impl Into<PathBuf>) -> Self {
        Self {
            scope: Scope::Custom(path.into()),
        }
    }

    /// Merge every readable layer of `T`, `None` if there are none
    pub fn load<T: Config>(&self) -> Option<T> {
        let domain = T::domain();

        self.scope
            .layers()
            .iter()
            .flat_map(|layer| layer.paths(&domain))
            .filter_map(|path| read_config(&path))
            .reduce(T::merge)
    }

    /// Save `config` as `{domain}.d/{name}.yaml` of the writable layer
    pub fn save<T: Config + Serialize>(&self, name: impl fmt::Display, config: &T) -> Result<PathBuf, SaveError> {
        let dir = self.scope.writable().drop_in_dir(&T::domain());

        fs_err::create_dir_all(&dir).map_err(|io| SaveError::CreateDir(dir.clone(), io))?;

        let path = dir.join(format!("{name}.{EXTENSION}"));
        let serialized = serde_yaml::to_string(config)?;

        fs_err::write(&path, serialized).map_err(|io| SaveError::Write(path.clone(), io))?;

        Ok(path)
    }

    pub fn delete<T: Config>(&self, name: impl fmt::Display) -> Result<(), io::Error> {
        let path = self
            .scope
            .writable()
            .drop_in_dir(&T::domain())
            .join(format!("{name}.{EXTENSION}"));

        fs_err::remove_file(path)
    }
}

#[derive(Debug, Error)]
#[error("$HOME or $XDG_CONFIG_HOME env not set")]
pub struct CreateUserError;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("create config dir {0:?}")]
    CreateDir(PathBuf, #[source] io::Error),
    #[error("serialize config")]
    Yaml(#[from] serde_yaml::Error),
    #[error("write config file {0:?}")]
    Write(PathBuf, #[source] io::Error),
}

fn read_config<T: Config>(path: &Path) -> Option<T> {
    let bytes = fs_err::read(path).ok()?;

    match serde_yaml::from_slice(&bytes) {
        Ok(config) => {
            debug!("Loaded config {path:?}");
            Some(config)
        }
        Err(error) => {
            warn!("Skipping invalid config {path:?}: {error}");
            None
        }
    }
}

#[derive(Debug, Clone)]
enum Scope {
    System { root: PathBuf, program: String },
    User { config: PathBuf, program: String },
    Custom(PathBuf),
}

impl Scope {
    /// Lowest precedence first
    fn layers(&self) -> Vec<Layer> {
        match self {
            Scope::System { root, program } => vec![
                Layer(root.join("usr/share").join(program)),
                Layer(root.join("etc").join(program)),
            ],
            Scope::User { config, program } => vec![Layer(config.join(program))],
            Scope::Custom(dir) => vec![Layer(dir.clone())],
        }
    }

    fn writable(&self) -> Layer {
        match self {
            Scope::System { root, program } => Layer(root.join("etc").join(program)),
            Scope::User { config, program } => Layer(config.join(program)),
            Scope::Custom(dir) => Layer(dir.clone()),
        }
    }
}

/// A single directory holding `{domain}.yaml` and `{domain}.d/`
struct Layer(PathBuf);

impl Layer {
    fn file(&self, domain: &str) -> PathBuf {
        self.0.join(format!("{domain}.{EXTENSION}"))
    }

    fn drop_in_dir(&self, domain: &str) -> PathBuf {
        self.0.join(format!("{domain}.d"))
    }

    fn paths(&self, domain: &str) -> Vec<PathBuf> {
        let file = self.file(domain);
        let mut paths = if file.is_file() { vec![file] } else { vec![] };

        let Ok(read_dir) = fs_err::read_dir(self.drop_in_dir(domain)) else {
            return paths;
        };

        let mut drop_ins = read_dir
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some(EXTENSION))
            .collect::<Vec<_>>();
        drop_ins.sort();

        paths.extend(drop_ins);
        paths
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Settings(BTreeMap<String, String>);

    impl Config for Settings {
        fn domain() -> String {
            "settings".to_owned()
        }

        fn merge(self, other: Self) -> Self {
            Self(self.0.into_iter().chain(other.0).collect())
        }
    }

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        Settings(pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect())
    }

    #[test]
    fn layered_merge() {
        let root = tempfile::tempdir().unwrap();
        let vendor = root.path().join("usr/share/forge");
        let admin = root.path().join("etc/forge");

        fs_err::create_dir_all(vendor.join("settings.d")).unwrap();
        fs_err::create_dir_all(&admin).unwrap();
        fs_err::write(vendor.join("settings.yaml"), "a: vendor\nb: vendor\n").unwrap();
        fs_err::write(vendor.join("settings.d/10-b.yaml"), "b: drop-in\n").unwrap();
        fs_err::write(vendor.join("settings.d/ignored.txt"), "c: nope\n").unwrap();
        fs_err::write(admin.join("settings.yaml"), "a: admin\n").unwrap();

        let manager = Manager::system(root.path(), "forge");
        let loaded = manager.load::<Settings>().unwrap();

        assert_eq!(loaded, settings(&[("a", "admin"), ("b", "drop-in")]));
    }

    #[test]
    fn save_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::custom(dir.path());

        assert!(manager.load::<Settings>().is_none());

        let path = manager.save("local", &settings(&[("key", "value")])).unwrap();
        assert_eq!(path, dir.path().join("settings.d/local.yaml"));

        // Invalid layers are skipped rather than failing the load
        fs_err::write(dir.path().join("settings.d/broken.yaml"), "[not a map").unwrap();
        assert_eq!(manager.load::<Settings>().unwrap(), settings(&[("key", "value")]));

        manager.delete::<Settings>("local").unwrap();
        manager.delete::<Settings>("broken").unwrap();
        assert!(manager.load::<Settings>().is_none());
    }
}
