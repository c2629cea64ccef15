// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! A single (profile, platform) build
//!
//! A context moves through [`Stage`]s strictly in order. Any failing step
//! moves it to [`Stage::Failed`] and the orchestrator skips the remaining
//! steps. Consuming the context with [`Context::into_task`] yields the one
//! [`Task`] it contributes to the build result.

use std::{
    io,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use capsule::{
    content::{Asset, BundleMetadata, ContentBundle, Icon, IconSet, Metadata, ScriptAssembly, Slot},
    signing::{Mode, Signature, SigningPolicy},
    write, Flags, Kind, Version, Writer,
};
use chrono::{DateTime, Utc};
use fs_err as fs;
use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    bundle::{bundle_name, BundleGroup, BundleKind},
    collect::{self, AssetEnumerator, AssetRef, Collection},
    compile::{self, Outcome, ScriptCompiler},
    platform::PlatformProfile,
    post::{self, PostStep},
    profile::{self, Profile},
    result::Task,
    settings::Settings,
    util,
};

/// Length of a GUID in its canonical hyphenated form
const GUID_LENGTH: usize = 36;

/// Type recorded for scenes
pub const SCENE_TYPE: &str = "SceneAsset";
/// Type recorded for shared assets of no known type
pub const FALLBACK_TYPE: &str = "Object";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    Created,
    Validated,
    AssetsCollected,
    Compiled,
    Bundled,
    ContentAssembled,
    Written,
    Succeeded,
    Failed,
}

pub struct Context<'a> {
    pub id: &'a profile::Id,
    pub profile: &'a Profile,
    pub platform: &'a PlatformProfile,
    stage: Stage,
    output: PathBuf,
    /// Per platform scratch space shared with other contexts
    work_dir: PathBuf,
    collection: Collection,
    scripts: Option<ScriptAssembly>,
    bundle_dir: Option<PathBuf>,
    capsule: Option<Vec<u8>>,
    error: Option<String>,
    started: DateTime<Utc>,
    /// Set while the clock runs
    resumed: Option<Instant>,
    elapsed: Duration,
}

impl<'a> Context<'a> {
    pub fn new(
        id: &'a profile::Id,
        profile: &'a Profile,
        platform: &'a PlatformProfile,
        output_dir: &Path,
        work_dir: &Path,
    ) -> Self {
        let output = output_dir
            .join(platform.platform().to_string())
            .join(platform.settings().file_name());

        Self {
            id,
            profile,
            platform,
            stage: Stage::Created,
            output,
            work_dir: work_dir.to_owned(),
            collection: Collection::default(),
            scripts: None,
            bundle_dir: None,
            capsule: None,
            error: None,
            started: Utc::now(),
            resumed: Some(Instant::now()),
            elapsed: Duration::ZERO,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_failed(&self) -> bool {
        self.stage == Stage::Failed
    }

    /// Where the capsule is written
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Stops the clock while the context waits on other contexts
    pub fn pause(&mut self) {
        if let Some(resumed) = self.resumed.take() {
            self.elapsed += resumed.elapsed();
        }
    }

    pub fn resume(&mut self) {
        self.resumed.get_or_insert_with(Instant::now);
    }

    fn ensure(&self, stage: Stage) -> Result<(), Error> {
        if self.stage != stage {
            return Err(Error::Stage {
                expected: stage,
                found: self.stage,
            });
        }
        Ok(())
    }

    fn advance(&mut self, from: Stage, to: Stage) -> Result<(), Error> {
        self.ensure(from)?;
        debug!("{} ({}): {to}", self.id, self.platform.platform());
        self.stage = to;
        Ok(())
    }

    /// Run every check, logging each that fails
    pub fn validate(&mut self) -> Result<(), Error> {
        let id = self.id;
        let platform = self.platform.platform();
        let settings = self.platform.settings();

        let checks = [
            (!self.profile.name.trim().is_empty(), "name is empty".to_owned()),
            (
                self.profile.guid.len() == GUID_LENGTH,
                format!("guid {:?} is not {GUID_LENGTH} characters", self.profile.guid),
            ),
            (
                self.profile.content_root.is_dir(),
                format!("content root {:?} does not exist", self.profile.content_root),
            ),
            (
                self.profile.version.parse::<Version>().is_ok(),
                format!("version {:?} is invalid", self.profile.version),
            ),
            (!settings.unique_key.trim().is_empty(), "unique key is empty".to_owned()),
        ];

        let failures = checks
            .into_iter()
            .filter(|(passed, _)| !passed)
            .map(|(_, reason)| reason)
            .collect::<Vec<_>>();

        for reason in &failures {
            warn!("{id} ({platform}): {reason}");
        }

        if !failures.is_empty() {
            return Err(Error::Validation(failures));
        }

        self.advance(Stage::Created, Stage::Validated)
    }

    /// Gather the assets for this platform, returns how many were kept
    pub fn collect_assets(&mut self, enumerator: &dyn AssetEnumerator) -> Result<usize, Error> {
        self.ensure(Stage::Validated)?;

        let platform = self.platform.platform();
        let scripting = platform.supports_scripting() && self.platform.settings().scripting;
        let excludes = collect::exclude_folders(platform);

        let assets = enumerator
            .enumerate(&self.profile.content_root, &excludes)
            .map_err(Error::Enumerate)?;
        let collection = Collection::new(assets, scripting);

        if collection.is_empty() {
            return Err(Error::NoAssets(self.profile.content_root.clone()));
        }

        debug!(
            "{} ({platform}): {} scenes, {} scripts, {} shared assets",
            self.id,
            collection.scenes.len(),
            collection.scripts.len(),
            collection.shared.len()
        );

        let count = collection.len();
        self.collection = collection;
        self.advance(Stage::Validated, Stage::AssetsCollected)?;

        Ok(count)
    }

    pub fn compile(&mut self, compiler: Option<&dyn ScriptCompiler>, debug: bool) -> Result<(), Error> {
        self.ensure(Stage::AssetsCollected)?;

        if !self.collection.scripts.is_empty() {
            let compiler = compiler.ok_or(Error::NoCompiler)?;
            let settings = self.platform.settings();
            let platform = self.platform.platform();
            let output_dir = self.work_dir.join("scripts").join(&settings.unique_key);

            let outcome = compiler.compile(&compile::Request {
                name: &settings.unique_key,
                sources: &self.collection.scripts,
                platform,
                defines: compile::defines(platform, settings.strict),
                debug,
                output_dir: &output_dir,
            });

            match outcome {
                Outcome::Failed(reason) => return Err(Error::Compile(reason)),
                outcome => self.scripts = Some(ScriptAssembly::new(outcome.assemblies().to_vec())),
            }
        }

        self.advance(Stage::AssetsCollected, Stage::Compiled)
    }

    /// Bundles the bundler must produce for this context
    pub fn bundle_groups(&self) -> Vec<BundleGroup> {
        let platform = self.platform.platform();
        let compress = self.platform.settings().compression;

        let group = |kind, assets: &[AssetRef]| BundleGroup {
            name: bundle_name(&self.profile.name, platform, kind),
            assets: assets.iter().map(|asset| asset.path.clone()).collect(),
            compress,
        };

        let mut groups = vec![];
        if !self.collection.shared.is_empty() {
            groups.push(group(BundleKind::SharedAssets, &self.collection.shared));
        }
        if !self.collection.scenes.is_empty() {
            groups.push(group(BundleKind::SceneAssets, &self.collection.scenes));
        }
        groups
    }

    /// Check every expected bundle was produced in `bundle_dir`
    pub fn check_bundles(&mut self, bundle_dir: &Path) -> Result<(), Error> {
        self.ensure(Stage::Compiled)?;

        for group in self.bundle_groups() {
            if !bundle_dir.join(&group.name).is_file() {
                return Err(Error::MissingBundle(group.name));
            }
        }

        self.bundle_dir = Some(bundle_dir.to_owned());
        self.advance(Stage::Compiled, Stage::Bundled)
    }

    fn metadata(&self, engine_version: &str, content_flags: Flags) -> Result<Metadata, Error> {
        let settings = self.platform.settings();

        Ok(Metadata {
            name: self.profile.name.clone(),
            unique_key: settings.unique_key.clone(),
            version: self.profile.version.parse()?,
            guid: self.profile.guid.clone(),
            description: self.profile.description.clone(),
            developer: self.profile.developer.clone(),
            publisher: self.profile.publisher.clone(),
            toolkit_version: Settings::toolkit_version(),
            engine_version: engine_version.to_owned(),
            content_flags: content_flags | settings.preload_flags(),
            build_time: Utc::now(),
            shipped_with_game: settings.ship_with_game.is_some(),
            custom: None,
        })
    }

    fn icons(&self) -> Result<IconSet, Error> {
        let icons = &self.profile.icons;
        let load = |path: &PathBuf| {
            let path = self.profile.content_root.join(path);
            Icon::from_file(&path).map_err(|source| Error::Icon { path, source })
        };

        let mut set = IconSet::default();
        for (slot, path) in [
            (Slot::Small, &icons.small),
            (Slot::Medium, &icons.medium),
            (Slot::Large, &icons.large),
            (Slot::ExtraLarge, &icons.extra_large),
        ] {
            if let Some(path) = path {
                set.standard.insert(slot, load(path)?);
            }
        }
        for (name, path) in &icons.custom {
            set.custom.insert(name.clone(), load(path)?);
        }

        Ok(set)
    }

    fn listing(&self, assets: &[AssetRef], fallback: &str) -> BundleMetadata {
        let mut listing = BundleMetadata::new(self.profile.content_root.to_string_lossy());
        listing.assets = assets
            .iter()
            .map(|asset| {
                Asset::new(
                    asset.path.to_string_lossy(),
                    asset.relative_str(),
                    asset.type_name.as_deref().unwrap_or(fallback),
                )
            })
            .collect();
        listing
    }

    /// Assemble the capsule in memory
    pub fn build_content(&mut self, engine_version: &str, policy: Option<&dyn SigningPolicy>) -> Result<(), Error> {
        self.ensure(Stage::Bundled)?;

        let platform = self.platform.platform();
        let settings = self.platform.settings();
        let bundle_dir = self.bundle_dir.clone().unwrap_or_default();

        let signature = match (self.profile.signing, policy) {
            (Mode::Unsigned, _) => None,
            (mode, Some(policy)) => Signature::new(mode, policy),
            (_, None) => return Err(Error::MissingSigningPolicy),
        };

        let mut buffer = vec![];
        let mut writer = Writer::new(&mut buffer, platform)
            .with_signature(signature)
            .with_preload(settings.preload_flags());

        let scripts = self.scripts.as_ref().filter(|scripts| !scripts.is_empty());
        let shared = (!self.collection.shared.is_empty()).then(|| {
            (
                self.listing(&self.collection.shared, FALLBACK_TYPE),
                ContentBundle::from_file(bundle_dir.join(bundle_name(
                    &self.profile.name,
                    platform,
                    BundleKind::SharedAssets,
                ))),
            )
        });
        let scenes = (!self.collection.scenes.is_empty()).then(|| {
            (
                self.listing(&self.collection.scenes, SCENE_TYPE),
                ContentBundle::from_file(bundle_dir.join(bundle_name(
                    &self.profile.name,
                    platform,
                    BundleKind::SceneAssets,
                ))),
            )
        });

        // Metadata leads the table, so its flags are fixed by what follows it
        let mut content_flags = Flags::empty();
        content_flags.set(Flags::SCRIPTS, scripts.is_some());
        content_flags.set(Flags::SHARED_ASSETS, shared.is_some());
        content_flags.set(Flags::SCENES, scenes.is_some());

        writer.add_content(Kind::Metadata, &self.metadata(engine_version, content_flags)?)?;
        writer.add_content(Kind::IconSet, &self.icons()?)?;

        if let Some(scripts) = scripts {
            writer.add_content(Kind::ScriptAssembly, scripts)?;
        }
        if let Some((listing, bundle)) = &shared {
            writer.add_content(Kind::SharedAssetMetadata, listing)?;
            writer.add_content(Kind::SharedAssetBundle, bundle)?;
        }
        if let Some((listing, bundle)) = &scenes {
            writer.add_content(Kind::SceneAssetMetadata, listing)?;
            writer.add_content(Kind::SceneAssetBundle, bundle)?;
        }

        let flags = writer.flags();
        let table = writer.finalize()?;
        debug!(
            "{} ({platform}): assembled {} bytes, {} entries, flags {flags}",
            self.id,
            buffer.len(),
            table.len()
        );

        self.capsule = Some(buffer);
        self.advance(Stage::Bundled, Stage::ContentAssembled)
    }

    /// Commit the assembled capsule to [`Context::output_path`]
    pub fn write_to_disk(&mut self) -> Result<(), Error> {
        let capsule = self.capsule.take().ok_or(Error::Stage {
            expected: Stage::ContentAssembled,
            found: self.stage,
        })?;

        if let Some(parent) = self.output.parent() {
            util::ensure_dir_exists(parent).map_err(Error::Write)?;
        }
        fs::write(&self.output, capsule).map_err(Error::Write)?;

        self.advance(Stage::ContentAssembled, Stage::Written)
    }

    pub fn post_process(&mut self, steps: &[Box<dyn PostStep>]) -> Result<(), Error> {
        for step in steps.iter().filter(|step| step.applies_to(self.platform)) {
            debug!("{} ({}): running {}", self.id, self.platform.platform(), step.name());
            step.run(self.platform, &self.output)?;
        }
        Ok(())
    }

    pub fn succeed(&mut self) -> Result<(), Error> {
        self.advance(Stage::Written, Stage::Succeeded)?;
        info!("Built {} ({}) to {:?}", self.id, self.platform.platform(), self.output);
        Ok(())
    }

    pub fn fail(&mut self, reason: impl ToString) {
        let reason = reason.to_string();
        warn!("{} ({}) failed: {reason}", self.id, self.platform.platform());
        self.stage = Stage::Failed;
        self.capsule = None;
        self.error = Some(reason);
    }

    pub fn into_task(mut self) -> Task {
        self.pause();

        let settings = self.platform.settings();
        let success = self.stage == Stage::Succeeded;
        let error = match (success, self.error) {
            (true, _) => None,
            (false, Some(error)) => Some(error),
            (false, None) => Some(format!("stopped at {}", self.stage)),
        };
        let relative = |assets: &[AssetRef]| assets.iter().map(AssetRef::relative_str).collect();

        Task {
            profile: self.id.clone(),
            name: self.profile.name.clone(),
            unique_key: settings.unique_key.clone(),
            platform: self.platform.platform(),
            output: self.output,
            success,
            error,
            started: self.started,
            elapsed: self.elapsed,
            iap_name: settings.iap_name.clone(),
            ship_with_game: settings.ship_with_game.clone(),
            streaming: settings.streaming,
            asset_paths: relative(&self.collection.shared),
            scene_paths: relative(&self.collection.scenes),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),
    #[error("expected stage {expected}, context is {found}")]
    Stage { expected: Stage, found: Stage },
    #[error("enumerate assets")]
    Enumerate(#[source] io::Error),
    #[error("no assets found below {0:?}")]
    NoAssets(PathBuf),
    #[error("scripts found but no compiler is configured")]
    NoCompiler,
    #[error("compilation failed: {0}")]
    Compile(String),
    #[error("bundle {0} was not produced")]
    MissingBundle(String),
    #[error("signed profile but no product is configured")]
    MissingSigningPolicy,
    #[error("version")]
    Version(#[from] capsule::VersionError),
    #[error("read icon {path:?}")]
    Icon {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("assemble capsule")]
    Assemble(#[from] write::Error),
    #[error("write capsule")]
    Write(#[source] io::Error),
    #[error("post step")]
    Post(#[from] post::Error),
}

#[cfg(test)]
mod test {
    use capsule::{read_bytes, OpenOptions, Platform};

    use super::*;
    use crate::{
        collect::DirectoryEnumerator,
        platform::{self, PlatformProfile},
    };

    /// Reports success without producing anything
    struct EmptyCompiler;

    impl ScriptCompiler for EmptyCompiler {
        fn compile(&self, _: &compile::Request<'_>) -> Outcome {
            Outcome::SucceededWithoutSymbols(vec![])
        }
    }

    fn profile(root: &Path) -> Profile {
        let mut profile: Profile = serde_yaml::from_str(
            "
guid: 0f8fad5b-d9cb-469f-a165-70867728950e
name: Winter Pack
version: '1.2'
content-root: .
",
        )
        .unwrap();
        profile.content_root = root.to_owned();
        profile
    }

    #[test]
    fn validation_reports_every_failure() {
        let dir = tempfile::tempdir().unwrap();
        let id = profile::Id::new("winter");
        let mut profile = profile(&dir.path().join("missing"));
        profile.guid = "short".to_owned();
        let platform = PlatformProfile::new(Platform::Linux, platform::Settings::new(""));

        let mut context = Context::new(&id, &profile, &platform, dir.path(), dir.path());

        let Err(Error::Validation(failures)) = context.validate() else {
            panic!("validation should fail");
        };
        assert_eq!(failures.len(), 3);
        assert!(failures[0].starts_with("guid \"short\""));
        assert!(failures[1].starts_with("content root"));
        assert_eq!(failures[2], "unique key is empty");
        assert_eq!(context.stage(), Stage::Created);
    }

    #[test]
    fn stages_are_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let id = profile::Id::new("winter");
        let profile = profile(dir.path());
        let platform = PlatformProfile::new(Platform::Linux, platform::Settings::new("winter"));

        let mut context = Context::new(&id, &profile, &platform, dir.path(), dir.path());

        assert!(matches!(
            context.compile(None, false),
            Err(Error::Stage {
                expected: Stage::AssetsCollected,
                found: Stage::Created
            })
        ));
        assert!(matches!(context.write_to_disk(), Err(Error::Stage { .. })));
    }

    #[test]
    fn scene_and_shared_asset() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("content");
        fs::create_dir_all(root.join("Scenes")).unwrap();
        fs::write(root.join("Scenes/lodge.unity"), "scene").unwrap();
        fs::write(root.join("snow.mat"), "material").unwrap();
        fs::write(root.join("Door.cs"), "class Door {}").unwrap();

        let id = profile::Id::new("winter");
        let profile = profile(&root);
        let platform = PlatformProfile::new(Platform::Windows, platform::Settings::new("winter"));

        let mut context = Context::new(&id, &profile, &platform, &dir.path().join("out"), dir.path());
        context.validate().unwrap();
        assert_eq!(context.collect_assets(&DirectoryEnumerator::default()).unwrap(), 2);
        context.compile(None, false).unwrap();

        let groups = context.bundle_groups();
        assert_eq!(groups.len(), 2);

        let bundle_dir = dir.path().join("bundles");
        fs::create_dir_all(&bundle_dir).unwrap();
        assert!(matches!(
            context.check_bundles(&bundle_dir),
            Err(Error::MissingBundle(_))
        ));
        for group in &groups {
            fs::write(bundle_dir.join(&group.name), &group.name).unwrap();
        }
        context.check_bundles(&bundle_dir).unwrap();

        context.build_content("2022.3", None).unwrap();
        context.write_to_disk().unwrap();
        context.post_process(&[]).unwrap();
        context.succeed().unwrap();

        let output = context.output_path().to_owned();
        assert_eq!(output, dir.path().join("out/windows/winter.dlc"));

        let task = context.into_task();
        assert!(task.success);
        assert_eq!(task.asset_paths, ["snow.mat"]);
        assert_eq!(task.scene_paths, ["Scenes/lodge.unity"]);

        let bytes = fs::read(&output).unwrap();
        let container = read_bytes(&bytes, &OpenOptions::default()).unwrap();
        let table = container.table().unwrap();
        assert_eq!(table.len(), 6);
        assert!(!table.contains(Kind::ScriptAssembly));
        assert_eq!(container.header.flags, Flags::SCENES | Flags::SHARED_ASSETS);
    }

    #[test]
    fn signed_profile_needs_policy() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("snow.mat"), "material").unwrap();

        let id = profile::Id::new("winter");
        let mut profile = profile(dir.path());
        profile.signing = Mode::Product;
        let platform = PlatformProfile::new(Platform::Linux, platform::Settings::new("winter"));

        let mut context = Context::new(&id, &profile, &platform, &dir.path().join("out"), dir.path());
        context.validate().unwrap();
        context.collect_assets(&DirectoryEnumerator::default()).unwrap();
        context.compile(None, false).unwrap();

        let bundle_dir = dir.path().join("bundles");
        fs::create_dir_all(&bundle_dir).unwrap();
        for group in context.bundle_groups() {
            fs::write(bundle_dir.join(&group.name), "blob").unwrap();
        }
        context.check_bundles(&bundle_dir).unwrap();

        assert!(matches!(
            context.build_content("", None),
            Err(Error::MissingSigningPolicy)
        ));

        context.fail("no product");
        let task = context.into_task();
        assert!(!task.success);
        assert_eq!(task.error.as_deref(), Some("no product"));
        assert!(!task.output.exists());
    }

    #[test]
    fn metadata_flags_follow_written_content() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("content");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("snow.mat"), "material").unwrap();
        fs::write(root.join("Door.cs"), "class Door {}").unwrap();

        let id = profile::Id::new("winter");
        let profile = profile(&root);
        let mut settings = platform::Settings::new("winter");
        settings.scripting = true;
        let platform = PlatformProfile::new(Platform::Linux, settings);

        let mut context = Context::new(&id, &profile, &platform, &dir.path().join("out"), dir.path());
        context.validate().unwrap();
        assert_eq!(context.collect_assets(&DirectoryEnumerator::default()).unwrap(), 2);
        context.compile(Some(&EmptyCompiler), false).unwrap();

        let bundle_dir = dir.path().join("bundles");
        fs::create_dir_all(&bundle_dir).unwrap();
        for group in context.bundle_groups() {
            fs::write(bundle_dir.join(&group.name), "blob").unwrap();
        }
        context.check_bundles(&bundle_dir).unwrap();
        context.build_content("", None).unwrap();
        context.write_to_disk().unwrap();

        let bytes = fs::read(context.output_path()).unwrap();
        let mut container = read_bytes(&bytes, &OpenOptions::default()).unwrap();
        assert!(!container.has_content(Kind::ScriptAssembly));
        assert_eq!(container.header.flags, Flags::SHARED_ASSETS);

        let mut metadata = Metadata::default();
        container.load(Kind::Metadata, &mut metadata).unwrap();
        assert_eq!(metadata.content_flags, Flags::SHARED_ASSETS);
    }
}
