// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Script compilation collaborator

use std::{
    path::{Path, PathBuf},
    process,
};

use capsule::{content::Assembly, Platform};
use fs_err as fs;
use log::{debug, warn};

use crate::{collect::AssetRef, settings::Tool};

/// Inputs of a single compilation
#[derive(Debug, Clone)]
pub struct Request<'a> {
    /// Assembly name, also the stem of the produced files
    pub name: &'a str,
    pub sources: &'a [AssetRef],
    pub platform: Platform,
    pub defines: Vec<String>,
    /// Produce debug symbols
    pub debug: bool,
    pub output_dir: &'a Path,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    SucceededWithSymbols(Vec<Assembly>),
    SucceededWithoutSymbols(Vec<Assembly>),
    Failed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed(_))
    }

    pub fn assemblies(&self) -> &[Assembly] {
        match self {
            Outcome::SucceededWithSymbols(assemblies) | Outcome::SucceededWithoutSymbols(assemblies) => assemblies,
            Outcome::Failed(_) => &[],
        }
    }
}

pub trait ScriptCompiler {
    fn compile(&self, request: &Request<'_>) -> Outcome;
}

/// Preprocessor symbols scripts are compiled with
pub fn defines(platform: Platform, strict: bool) -> Vec<String> {
    let platform = platform.to_string().replace('-', "_").to_uppercase();

    let mut defines = vec!["DLC".to_owned(), format!("DLC_{platform}")];
    if strict {
        defines.push("DLC_STRICT".to_owned());
    }
    defines
}

/// Runs an external compiler
///
/// The tool is invoked as
/// `program [args..] --name NAME --platform PLATFORM --output DIR [--define D..] [--debug] SOURCES..`
/// and must leave `NAME.dll` and optionally `NAME.pdb` in the output directory.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    pub tool: Tool,
}

impl CommandCompiler {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }

    fn run(&self, request: &Request<'_>) -> Result<Outcome, String> {
        fs::create_dir_all(request.output_dir).map_err(|e| e.to_string())?;

        let mut command = process::Command::new(&self.tool.program);
        command
            .args(&self.tool.args)
            .arg("--name")
            .arg(request.name)
            .arg("--platform")
            .arg(request.platform.to_string())
            .arg("--output")
            .arg(request.output_dir);
        for define in &request.defines {
            command.arg("--define").arg(define);
        }
        if request.debug {
            command.arg("--debug");
        }
        command.args(request.sources.iter().map(|source| &source.path));

        debug!("Running compiler {command:?}");

        let output = command
            .output()
            .map_err(|e| format!("failed to run {:?}: {e}", self.tool.program))?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!("{line}");
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            warn!("{line}");
        }

        if !output.status.success() {
            return Err(format!("compiler exited with {}", output.status));
        }

        let image_path = artifact(request, "dll");
        let image = fs::read(&image_path).map_err(|e| e.to_string())?;
        let assembly = Assembly::new(request.name, image);

        let symbols_path = artifact(request, "pdb");
        if request.debug && symbols_path.exists() {
            let symbols = fs::read(&symbols_path).map_err(|e| e.to_string())?;
            Ok(Outcome::SucceededWithSymbols(vec![assembly.with_symbols(symbols)]))
        } else {
            Ok(Outcome::SucceededWithoutSymbols(vec![assembly]))
        }
    }
}

fn artifact(request: &Request<'_>, extension: &str) -> PathBuf {
    request.output_dir.join(format!("{}.{extension}", request.name))
}

impl ScriptCompiler for CommandCompiler {
    fn compile(&self, request: &Request<'_>) -> Outcome {
        self.run(request).unwrap_or_else(Outcome::Failed)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn platform_defines() {
        assert_eq!(defines(Platform::Windows, false), ["DLC", "DLC_WINDOWS"]);
        assert_eq!(
            defines(Platform::MacOsEditor, true),
            ["DLC", "DLC_MACOS_EDITOR", "DLC_STRICT"]
        );
    }

    #[test]
    fn outcome() {
        let built = Outcome::SucceededWithoutSymbols(vec![Assembly::new("winter", b"MZ".to_vec())]);
        assert!(built.is_success());
        assert_eq!(built.assemblies().len(), 1);

        let failed = Outcome::Failed("CS1002: ; expected".to_owned());
        assert!(!failed.is_success());
        assert!(failed.assemblies().is_empty());
    }

    #[test]
    fn missing_program_fails() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = CommandCompiler::new(Tool {
            program: dir.path().join("no-such-compiler"),
            args: vec![],
        });

        let outcome = compiler.compile(&Request {
            name: "winter",
            sources: &[],
            platform: Platform::Linux,
            defines: defines(Platform::Linux, false),
            debug: false,
            output_dir: &dir.path().join("out"),
        });

        assert!(matches!(outcome, Outcome::Failed(_)));
    }
}
