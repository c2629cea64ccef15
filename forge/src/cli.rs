// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0
use std::path::PathBuf;

use capsule::registry;
use clap::{Args, Parser};
use forge::{context, env, Env, Settings};
use thiserror::Error;

mod build;
mod inspect;
mod profile;
mod version;

#[derive(Debug, Parser)]
#[command(name = "forge", about = "Build and inspect DLC capsules")]
pub struct Command {
    #[command(flatten)]
    pub global: Global,
    #[command(subcommand)]
    pub subcommand: Option<Subcommand>,
}

#[derive(Debug, Args)]
pub struct Global {
    #[arg(
        short,
        long = "verbose",
        help = "Prints additional information about what forge is doing",
        default_value = "false",
        global = true
    )]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Directory built capsules are written to")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    Build(build::Command),
    Inspect(inspect::Command),
    Profile(profile::Command),
    Version(version::Command),
}

pub fn process() -> Result<(), Error> {
    let Command { global, subcommand } = Command::parse();

    let level = if global.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let env = Env::new(global.cache_dir, global.config_dir, global.output_dir)?;
    let settings = env.config.load::<Settings>().unwrap_or_default();

    register_asset_types(&settings);

    if global.verbose {
        match subcommand {
            Some(Subcommand::Version(_)) => (),
            _ => version::print(),
        }
        println!("{:?}", env.config);
        println!("cache directory: {:?}", env.cache_dir);
    }

    match subcommand {
        Some(Subcommand::Build(command)) => build::handle(command, &env, &settings)?,
        Some(Subcommand::Inspect(command)) => inspect::handle(command, &settings)?,
        Some(Subcommand::Profile(command)) => profile::handle(command, &env)?,
        Some(Subcommand::Version(command)) => version::handle(command),
        None => (),
    }

    Ok(())
}

fn register_asset_types(settings: &Settings) {
    registry::register(|registry| {
        registry.register_asset_type(context::SCENE_TYPE);
        registry.register_asset_type(context::FALLBACK_TYPE);
        for type_name in settings.asset_types.values() {
            registry.register_asset_type(type_name);
        }
    });
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("build")]
    Build(#[from] build::Error),
    #[error("inspect")]
    Inspect(#[from] inspect::Error),
    #[error("profile")]
    Profile(#[from] profile::Error),
    #[error("env")]
    Env(#[from] env::Error),
}
