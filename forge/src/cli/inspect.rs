// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{
    io::{self, Read, Seek},
    path::{Path, PathBuf},
};

use capsule::{
    content::{BundleMetadata, ContentBundle, IconSet, Metadata, ScriptAssembly},
    read,
    schedule::{self, Scheduler},
    signing::{Hash, Signature, SigningPolicy},
    Container, Content, Header, HeaderDecodeError, Kind, OpenOptions, Platform,
};
use clap::Parser;
use crossterm::style::Stylize;
use forge::Settings;
use fs_err::File;
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(about = "Print the header and content table of a capsule")]
pub struct Command {
    #[arg(help = "Path to the capsule")]
    path: PathBuf,
    #[arg(
        long,
        default_value = "false",
        help = "Verify the signature against the configured product"
    )]
    verify: bool,
    #[arg(long, default_value = "false", help = "Decode every content section")]
    load: bool,
    #[arg(long, help = "Warn when not built for this platform")]
    platform: Option<Platform>,
}

/// Accepts whatever signature a capsule carries
struct Carried(Option<Signature>);

impl SigningPolicy for Carried {
    fn product_hash(&self) -> Hash {
        self.0.map(|signature| signature.product).unwrap_or_default()
    }

    fn version_hash(&self) -> Hash {
        self.0.and_then(|signature| signature.version).unwrap_or_default()
    }
}

pub fn handle(command: Command, settings: &Settings) -> Result<(), Error> {
    let Command {
        path,
        verify,
        load,
        platform,
    } = command;

    let mut file = File::open(&path)?;

    let policy: Box<dyn SigningPolicy> = if verify {
        let product = settings.product.as_ref().ok_or(Error::NoProduct)?;
        Box::new(product.policy())
    } else {
        let header = Header::decode(&mut file).map_err(Error::Header)?;
        let carried = Signature::decode(&mut file, header.flags)?;
        file.rewind()?;
        Box::new(Carried(carried))
    };

    let options = OpenOptions {
        platform,
        policy: Some(policy.as_ref()),
        ..Default::default()
    };
    let mut container = capsule::open(file, &options)?;

    print_summary(&path, &container, verify);

    if load {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(load_all(&mut container))?;
    }

    Ok(())
}

fn print_summary<R>(path: &Path, container: &Container<R>, verified: bool) {
    let header = &container.header;

    println!("{} {path:?}", "Capsule".bold());
    println!("  format version: {}", header.version);
    println!("  platform:       {}", header.platform);
    println!("  flags:          {}", header.flags);
    println!("  size:           {} bytes", container.len());
    if let Some(mismatch) = &container.platform_mismatch {
        println!("  {}", mismatch.to_string().yellow());
    }

    match &container.signature {
        Some(signature) => {
            let state = if verified { "verified".green() } else { "unverified".yellow() };
            println!("  product hash:   {} ({state})", hex::encode(signature.product));
            if let Some(version) = signature.version {
                println!("  version hash:   {}", hex::encode(version));
            }
        }
        None => println!("  unsigned"),
    }

    if let Some(table) = container.table() {
        println!();
        println!("  {:<22} {:>12} {:>12}", "Content", "Start", "Size");
        for entry in table.iter() {
            println!("  {:<22} {:>12} {:>12}", entry.kind.to_string(), entry.start, entry.size);
        }
    }
}

async fn load<R, C>(container: &mut Container<R>, scheduler: &Scheduler, kind: Kind) -> Result<Option<C>, read::Error>
where
    R: Read + Seek,
    C: Content + Default,
{
    if !container.has_content(kind) {
        return Ok(None);
    }

    let (progress, handle) = schedule::progress();
    let mut content = C::default();
    container.load_async(scheduler, kind, &mut content, progress).await?;
    log::debug!("{kind}: {:?}", handle.status());

    Ok(Some(content))
}

async fn load_all<R: Read + Seek>(container: &mut Container<R>) -> Result<(), read::Error> {
    let scheduler = Scheduler::default();

    println!();

    if let Some(metadata) = load::<_, Metadata>(container, &scheduler, Kind::Metadata).await? {
        println!("  {} {} {}", metadata.name.as_str().bold(), metadata.version, metadata.guid);
        println!("  unique key:     {}", metadata.unique_key);
        println!("  built:          {}", metadata.build_time);
        println!("  toolkit:        {}", metadata.toolkit_version);
        if !metadata.engine_version.is_empty() {
            println!("  engine:         {}", metadata.engine_version);
        }
        if metadata.shipped_with_game {
            println!("  ships with the game");
        }
    }

    if let Some(icons) = load::<_, IconSet>(container, &scheduler, Kind::IconSet).await? {
        for (slot, icon) in &icons.standard {
            match icon.image() {
                Ok(image) => println!("  icon {slot}: {}x{}", image.width(), image.height()),
                Err(e) => println!("  icon {slot}: {}", e.to_string().red()),
            }
        }
        for name in icons.custom.keys() {
            println!("  icon {name}");
        }
    }

    if let Some(scripts) = load::<_, ScriptAssembly>(container, &scheduler, Kind::ScriptAssembly).await? {
        for assembly in scripts.assemblies() {
            let symbols = if assembly.symbols.is_some() { ", symbols" } else { "" };
            println!("  assembly {} ({} bytes{symbols})", assembly.name, assembly.image.len());
        }
    }

    for (listing_kind, bundle_kind) in [
        (Kind::SharedAssetMetadata, Kind::SharedAssetBundle),
        (Kind::SceneAssetMetadata, Kind::SceneAssetBundle),
    ] {
        if let Some(listing) = load::<_, BundleMetadata>(container, &scheduler, listing_kind).await? {
            for asset in &listing.assets {
                println!("  {} [{}]", asset.relative_path, asset.type_name);
            }
        }
        if let Some(bundle) = load::<_, ContentBundle>(container, &scheduler, bundle_kind).await? {
            let len = bundle.data().map(|data| data.len()).unwrap_or_default();
            println!("  {bundle_kind}: {len} bytes ({})", bundle.state());
        }
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("no product configured to verify against, set `product` in forge.yaml")]
    NoProduct,
    #[error("decode header")]
    Header(#[source] HeaderDecodeError),
    #[error("open capsule")]
    Open(#[from] read::Error),
    #[error("io")]
    Io(#[from] io::Error),
}
