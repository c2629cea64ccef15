// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::io;

use capsule::Platform;
use chrono::Local;
use clap::Parser;
use crossterm::style::Stylize;
use forge::{
    bundle::CommandBundler,
    collect::DirectoryEnumerator,
    compile::CommandCompiler,
    env, install, manifest,
    post::AssetPack,
    profile::{self, Id},
    timing, util, Env, Orchestrator, Request, Settings,
};
use thiserror::Error;

const MANIFEST: &str = "manifest.json";

#[derive(Debug, Parser)]
#[command(about = "Build DLC capsules from profiles")]
pub struct Command {
    #[arg(help = "Profiles to build, every stored profile when omitted")]
    profiles: Vec<Id>,
    #[arg(
        short,
        long = "platform",
        help = "Only build for this platform, can be passed multiple times"
    )]
    platforms: Vec<Platform>,
    #[arg(long, default_value = "false", help = "Also build disabled platform profiles")]
    include_disabled: bool,
    #[arg(long, default_value = "false", help = "Compile scripts with debug symbols")]
    debug: bool,
    #[arg(
        long,
        default_value = "false",
        help = "Copy capsules that ship with the game to their destination"
    )]
    install: bool,
}

pub fn handle(command: Command, env: &Env, settings: &Settings) -> Result<(), Error> {
    let Command {
        profiles: ids,
        platforms,
        include_disabled,
        debug,
        install: ship,
    } = command;

    let mut manager = profile::Manager::new(env);

    let profiles = if ids.is_empty() {
        manager
            .profiles
            .iter()
            .map(|(id, profile)| (id.clone(), profile.clone()))
            .collect::<Vec<_>>()
    } else {
        ids.iter()
            .map(|id| Ok((id.clone(), manager.get(id)?.clone())))
            .collect::<Result<Vec<_>, profile::Error>>()?
    };

    if profiles.is_empty() {
        return Err(Error::NoProfiles);
    }

    let bundler = settings.bundler.clone().ok_or(Error::NoBundler)?;
    let output_dir = env.output_dir(settings)?;
    util::ensure_dir_exists(&output_dir)?;

    let mut orchestrator = Orchestrator::new(
        DirectoryEnumerator::new(settings.asset_types.clone()),
        CommandBundler::new(bundler),
    )
    .with_post_step(AssetPack::new(output_dir.join("asset-packs")))
    .with_engine_version(settings.engine_version.clone().unwrap_or_default());

    if let Some(compiler) = settings.compiler.clone() {
        orchestrator = orchestrator.with_compiler(CommandCompiler::new(compiler));
    }
    if let Some(product) = &settings.product {
        orchestrator = orchestrator.with_policy(product.policy());
    }

    let request = Request {
        profiles,
        platforms,
        include_disabled,
        output_dir: output_dir.clone(),
        work_dir: env.work_dir(),
        debug,
    };

    let result = orchestrator.run(&request);

    println!();
    for task in result.tasks() {
        if task.success {
            println!("{} {} ({}) {:?}", "Built".green(), task.unique_key.as_str().bold(), task.platform, task.output);
        } else {
            println!(
                "{} {} ({}): {}",
                "Failed".red(),
                task.unique_key.as_str().bold(),
                task.platform,
                task.error.as_deref().unwrap_or_default()
            );
        }
    }
    println!();

    timing::print_table(result.tasks());

    let manifest = result.manifest();
    if !manifest.is_empty() {
        manifest.write(&output_dir.join(MANIFEST))?;
    }

    let updated = manager.apply(result.profile_updates())?;
    log::debug!("Updated {updated} profile(s)");

    if ship && !result.is_failed_batch() {
        for path in install::install(&result)? {
            println!("{} {path:?}", "Installed".green());
        }
    }

    if result.is_failed_batch() {
        return Err(Error::NothingBuilt);
    }

    println!(
        "Build finished at {}",
        Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    );

    if !result.all_successful() {
        return Err(Error::Failed(result.failed().count()));
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("no profiles have been configured yet")]
    NoProfiles,
    #[error("no bundler configured, set `bundler` in forge.yaml")]
    NoBundler,
    #[error("no capsule was built")]
    NothingBuilt,
    #[error("{0} build(s) failed")]
    Failed(usize),
    #[error("profile")]
    Profile(#[from] profile::Error),
    #[error("write manifest")]
    Manifest(#[from] manifest::Error),
    #[error("install")]
    Install(#[from] install::Error),
    #[error("env")]
    Env(#[from] env::Error),
    #[error("io")]
    Io(#[from] io::Error),
}
