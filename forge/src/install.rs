// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Copies capsules shipping with the game into their destination

use std::{io, path::PathBuf};

use log::info;
use thiserror::Error;

use crate::{result::BuildResult, util};

/// Install every successful output that ships with the game,
/// returning the installed paths
pub fn install(result: &BuildResult) -> Result<Vec<PathBuf>, Error> {
    let mut installed = vec![];

    for task in result.successful() {
        let Some(destination) = &task.ship_with_game else {
            continue;
        };
        let file_name = task
            .output
            .file_name()
            .ok_or_else(|| Error::NotAFile(task.output.clone()))?;
        let target = destination.join(file_name);

        util::ensure_dir_exists(destination).map_err(|source| Error::Install {
            path: destination.clone(),
            source,
        })?;
        util::hardlink_or_copy(&task.output, &target).map_err(|source| Error::Install {
            path: target.clone(),
            source,
        })?;

        info!("Installed {} ({}) to {target:?}", task.unique_key, task.platform);

        installed.push(target);
    }

    Ok(installed)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("not a file: {0:?}")]
    NotAFile(PathBuf),
    #[error("install to {path:?}")]
    Install {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod test {
    use capsule::Platform;
    use chrono::Utc;
    use fs_err as fs;

    use super::*;
    use crate::result::test::task;

    #[test]
    fn ships_successful_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let game = dir.path().join("game/StreamingAssets");

        let mut shipped = task("winter", Platform::Linux, true);
        shipped.output = dir.path().join("winter.dlc");
        shipped.ship_with_game = Some(game.clone());
        fs::write(&shipped.output, b"\0dlc").unwrap();

        let mut failed = task("summer", Platform::Linux, false);
        failed.ship_with_game = Some(game.clone());

        let kept = task("autumn", Platform::Linux, true);

        let mut result = BuildResult::new(Utc::now());
        result.push(shipped);
        result.push(failed);
        result.push(kept);

        let installed = install(&result).unwrap();

        assert_eq!(installed, [game.join("winter.dlc")]);
        assert_eq!(fs::read(&installed[0]).unwrap(), b"\0dlc");
    }
}
