// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::Parser;
use crossterm::style::Stylize;
use itertools::Itertools;
use thiserror::Error;

use forge::{profile, Env, Profile};

#[derive(Debug, Parser)]
#[command(about = "Manage DLC profiles")]
pub struct Command {
    #[command(subcommand)]
    subcommand: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    #[command(about = "List profiles")]
    List,
    #[command(about = "Show a profile and its platforms")]
    Show {
        #[arg(help = "profile id")]
        profile: profile::Id,
    },
}

pub fn handle(command: Command, env: &Env) -> Result<(), Error> {
    let manager = profile::Manager::new(env);

    match command.subcommand {
        Subcommand::List => list(&manager),
        Subcommand::Show { profile } => show(manager.get(&profile)?),
    }

    Ok(())
}

pub fn list(manager: &profile::Manager<'_>) {
    if manager.profiles.is_empty() {
        println!("No profiles have been configured yet");
        return;
    }

    for (id, profile) in manager.profiles.iter() {
        let platforms = profile
            .platforms
            .iter()
            .filter(|platform| platform.settings().enabled)
            .map(|platform| platform.platform())
            .join(", ");

        println!("{id}: {} {} [{platforms}]", profile.name, profile.version);
    }
}

pub fn show(profile: &Profile) {
    println!("{} {}", profile.name.as_str().bold(), profile.version);
    println!("  guid:         {}", profile.guid);
    println!("  content root: {:?}", profile.content_root);
    println!("  signing:      {}", profile.signing);
    if !profile.developer.is_empty() {
        println!("  developer:    {}", profile.developer);
    }
    if !profile.publisher.is_empty() {
        println!("  publisher:    {}", profile.publisher);
    }

    if let Some(last_build) = &profile.last_build {
        let outcome = if last_build.success {
            "succeeded".green()
        } else {
            "failed".red()
        };
        println!(
            "  last build:   {} {outcome} ({})",
            last_build.time,
            last_build.platforms.iter().join(", ")
        );
    }

    for platform in &profile.platforms {
        let settings = platform.settings();
        let state = if settings.enabled { "" } else { " (disabled)" };

        println!(" - {}{state}: {}", platform.platform(), settings.file_name());
        if let Some(destination) = &settings.ship_with_game {
            println!("     ships with the game to {destination:?}");
        }
        if let Some(pack) = platform.android().and_then(|android| android.asset_pack.as_deref()) {
            println!("     asset pack {pack}");
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("profile")]
    Profile(#[from] profile::Error),
}
