// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Asset bundling collaborator

use std::{
    io,
    path::{Path, PathBuf},
    process,
};

use capsule::Platform;
use fs_err::{self as fs, File};
use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;

use crate::settings::Tool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BundleKind {
    SharedAssets,
    SceneAssets,
}

/// `{name}-{platform}-{kind}`, lowercase with whitespace removed
pub fn bundle_name(name: &str, platform: Platform, kind: BundleKind) -> String {
    format!("{name}-{platform}-{kind}")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Assets packed into one named blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleGroup {
    pub name: String,
    pub assets: Vec<PathBuf>,
    pub compress: bool,
}

/// Produces one file per group, named after the group, in `output_dir`
///
/// Invocations are not reentrant: every group of a platform is
/// handed over in a single call.
pub trait AssetBundler {
    fn bundle(&self, platform: Platform, groups: &[BundleGroup], output_dir: &Path) -> Result<(), Error>;
}

/// Runs an external bundler
///
/// Groups are written to `groups.json` in the output directory and the tool
/// is invoked as `program [args..] --platform PLATFORM --groups FILE --output DIR`.
#[derive(Debug, Clone)]
pub struct CommandBundler {
    pub tool: Tool,
}

impl CommandBundler {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }
}

impl AssetBundler for CommandBundler {
    fn bundle(&self, platform: Platform, groups: &[BundleGroup], output_dir: &Path) -> Result<(), Error> {
        fs::create_dir_all(output_dir)?;

        let groups_path = output_dir.join("groups.json");
        serde_json::to_writer_pretty(File::create(&groups_path)?, groups)?;

        let mut command = process::Command::new(&self.tool.program);
        command
            .args(&self.tool.args)
            .arg("--platform")
            .arg(platform.to_string())
            .arg("--groups")
            .arg(&groups_path)
            .arg("--output")
            .arg(output_dir);

        debug!("Running bundler {command:?}");

        let output = command.output().map_err(|source| Error::Spawn {
            program: self.tool.program.clone(),
            source,
        })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!("{line}");
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            warn!("{line}");
        }

        if !output.status.success() {
            return Err(Error::Exit(output.status));
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to run {program:?}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("bundler exited with {0}")]
    Exit(process::ExitStatus),
    #[error("write bundle groups")]
    Json(#[from] serde_json::Error),
    #[error("io")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(
            bundle_name("Winter Pack", Platform::WindowsEditor, BundleKind::SharedAssets),
            "winterpack-windows-editor-sharedassets"
        );
        assert_eq!(
            bundle_name("Lodge", Platform::IOs, BundleKind::SceneAssets),
            "lodge-ios-sceneassets"
        );
    }

    #[test]
    fn missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let bundler = CommandBundler::new(Tool {
            program: dir.path().join("no-such-bundler"),
            args: vec![],
        });

        let result = bundler.bundle(Platform::Linux, &[], &dir.path().join("bundles"));

        assert!(matches!(result, Err(Error::Spawn { .. })));
        assert!(dir.path().join("bundles/groups.json").exists());
    }
}
