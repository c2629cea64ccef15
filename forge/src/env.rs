// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{util, Settings};

/// Name of the default output directory below the working directory
const DEFAULT_OUTPUT: &str = "dlc";

pub struct Env {
    /// Compile and bundle scratch space lives below here
    pub cache_dir: PathBuf,
    /// Output directory requested on the command line
    pub output_dir: Option<PathBuf>,
    pub config: config::Manager,
}

impl Env {
    pub fn new(
        cache_dir: Option<PathBuf>,
        config_dir: Option<PathBuf>,
        output_dir: Option<PathBuf>,
    ) -> Result<Self, Error> {
        let is_root = util::is_root();

        let config = match config_dir {
            Some(dir) => config::Manager::custom(dir),
            None if is_root => config::Manager::system("/", "forge"),
            None => config::Manager::user("forge")?,
        };

        let cache_dir = match cache_dir {
            Some(dir) => dir,
            None if is_root => PathBuf::from("/var/cache/forge"),
            None => dirs::cache_dir().ok_or(Error::UserCache)?.join("forge"),
        };
        util::ensure_dir_exists(&cache_dir)?;

        Ok(Self {
            cache_dir,
            output_dir,
            config,
        })
    }

    /// Scratch space of a build batch
    pub fn work_dir(&self) -> PathBuf {
        self.cache_dir.join("work")
    }

    /// The command line wins over configuration, falling
    /// back to `dlc` in the working directory
    pub fn output_dir(&self, settings: &Settings) -> Result<PathBuf, Error> {
        if let Some(dir) = self.output_dir.as_ref().or(settings.output_dir.as_ref()) {
            return Ok(dir.clone());
        }
        Ok(std::env::current_dir()?.join(DEFAULT_OUTPUT))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot find cache dir, $XDG_CACHE_HOME or $HOME env not set")]
    UserCache,
    #[error("cannot find config dir, $XDG_CONFIG_HOME or $HOME env not set")]
    UserConfig,
    #[error("io")]
    Io(#[from] io::Error),
}

impl From<config::CreateUserError> for Error {
    fn from(_: config::CreateUserError) -> Self {
        Error::UserConfig
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn output_dir_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = Env::new(
            Some(dir.path().join("cache")),
            Some(dir.path().join("config")),
            None,
        )
        .unwrap();
        assert!(dir.path().join("cache").exists());
        assert_eq!(env.work_dir(), dir.path().join("cache/work"));

        let mut settings = Settings::default();
        assert!(env.output_dir(&settings).unwrap().ends_with(DEFAULT_OUTPUT));

        settings.output_dir = Some(dir.path().join("configured"));
        assert_eq!(env.output_dir(&settings).unwrap(), dir.path().join("configured"));

        env.output_dir = Some(dir.path().join("flag"));
        assert_eq!(env.output_dir(&settings).unwrap(), dir.path().join("flag"));
    }
}
