// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Batch builds of many profiles across many platforms
//!
//! A batch runs in passes per platform:
//!
//! 1. every context is validated, collects its assets and compiles scripts
//! 2. the bundler runs once with the groups of every surviving context
//! 3. contexts missing a bundle are dropped
//! 4. surviving contexts assemble, write and post-process their capsule
//!
//! A failure, including a panic, only ever fails the context it happened in.

use std::{
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
};

use capsule::{signing::SigningPolicy, Platform};
use chrono::Utc;
use fs_err as fs;
use log::{debug, error, info, warn};

use crate::{
    bundle::AssetBundler,
    collect::AssetEnumerator,
    compile::ScriptCompiler,
    context::{self, Context},
    hooks::{panic_message, Hook, Hooks},
    platform::PlatformProfile,
    post::PostStep,
    profile::{self, Profile},
    result::BuildResult,
    util,
};

/// What to build
#[derive(Debug, Clone)]
pub struct Request {
    /// Built in this order within each platform
    pub profiles: Vec<(profile::Id, Profile)>,
    /// Only build these platforms, every platform when empty
    pub platforms: Vec<Platform>,
    /// Also build platform profiles that are disabled
    pub include_disabled: bool,
    pub output_dir: PathBuf,
    /// Scratch space removed after a successful batch
    pub work_dir: PathBuf,
    /// Compile scripts with debug symbols
    pub debug: bool,
}

struct Member<'a> {
    id: &'a profile::Id,
    profile: &'a Profile,
    platform: &'a PlatformProfile,
}

impl Request {
    fn wants(&self, platform: &PlatformProfile) -> bool {
        (platform.settings().enabled || self.include_disabled)
            && (self.platforms.is_empty() || self.platforms.contains(&platform.platform()))
    }

    /// Members grouped by platform, platforms in first seen order
    fn groups(&self) -> Vec<(Platform, Vec<Member<'_>>)> {
        let mut groups: Vec<(Platform, Vec<Member<'_>>)> = vec![];

        for (id, profile) in &self.profiles {
            let eligible = profile
                .platforms
                .iter()
                .filter(|platform| self.wants(platform))
                .collect::<Vec<_>>();

            if eligible.is_empty() {
                info!("Skipping {id}, no platform to build");
                continue;
            }

            for platform in eligible {
                let member = Member { id, profile, platform };

                match groups.iter_mut().find(|(p, _)| *p == platform.platform()) {
                    Some((_, members)) => members.push(member),
                    None => groups.push((platform.platform(), vec![member])),
                }
            }
        }

        groups
    }
}

/// Runs build requests against a set of collaborators
pub struct Orchestrator {
    enumerator: Box<dyn AssetEnumerator>,
    bundler: Box<dyn AssetBundler>,
    compiler: Option<Box<dyn ScriptCompiler>>,
    post_steps: Vec<Box<dyn PostStep>>,
    hooks: Hooks,
    policy: Option<Box<dyn SigningPolicy>>,
    engine_version: String,
}

impl Orchestrator {
    pub fn new(enumerator: impl AssetEnumerator + 'static, bundler: impl AssetBundler + 'static) -> Self {
        Self {
            enumerator: Box::new(enumerator),
            bundler: Box::new(bundler),
            compiler: None,
            post_steps: vec![],
            hooks: Hooks::default(),
            policy: None,
            engine_version: String::default(),
        }
    }

    pub fn with_compiler(self, compiler: impl ScriptCompiler + 'static) -> Self {
        Self {
            compiler: Some(Box::new(compiler)),
            ..self
        }
    }

    pub fn with_post_step(mut self, step: impl PostStep + 'static) -> Self {
        self.post_steps.push(Box::new(step));
        self
    }

    pub fn with_hook(mut self, name: impl ToString, hook: impl Hook + 'static) -> Self {
        self.hooks.register(name, hook);
        self
    }

    /// Policy signed profiles are signed with
    pub fn with_policy(self, policy: impl SigningPolicy + 'static) -> Self {
        Self {
            policy: Some(Box::new(policy)),
            ..self
        }
    }

    pub fn with_engine_version(self, engine_version: impl ToString) -> Self {
        Self {
            engine_version: engine_version.to_string(),
            ..self
        }
    }

    /// Build everything in `request`, never failing as a whole
    pub fn run(&self, request: &Request) -> BuildResult {
        let mut result = BuildResult::new(Utc::now());

        self.hooks.batch_start(request);

        for (id, profile) in &request.profiles {
            self.hooks.profile_start(id, profile);
        }

        for (platform, members) in request.groups() {
            info!("Building {} profile(s) for {platform}", members.len());
            self.run_platform(request, platform, members, &mut result);
        }

        if result.successful().next().is_none() {
            error!("No capsule was built");
            result.fail_batch();
        } else {
            if request.work_dir.exists() {
                if let Err(e) = fs::remove_dir_all(&request.work_dir) {
                    warn!("Failed to remove {:?}: {e}", request.work_dir);
                }
            }
            result.complete(Utc::now());
        }

        self.hooks.batch_end(&result);

        result
    }

    fn run_platform(&self, request: &Request, platform: Platform, members: Vec<Member<'_>>, result: &mut BuildResult) {
        let work_dir = request.work_dir.join(platform.to_string());

        let mut finish = |context: Context<'_>| {
            let task = context.into_task();
            self.hooks.context_end(&task);
            result.push(task);
        };

        // Validate, collect and compile
        let mut contexts = vec![];
        for Member {
            id,
            profile,
            platform: platform_profile,
        } in members
        {
            self.hooks.context_start(id, platform_profile);

            let mut context = Context::new(id, profile, platform_profile, &request.output_dir, &work_dir);
            let outcome = isolate(&mut context, |context| {
                context.validate()?;
                context.collect_assets(self.enumerator.as_ref())?;
                context.compile(self.compiler.as_deref(), request.debug)
            });
            context.pause();

            if outcome {
                contexts.push(context);
            } else {
                finish(context);
            }
        }

        // Bundle every surviving context in one go
        let groups = contexts.iter().flat_map(Context::bundle_groups).collect::<Vec<_>>();
        let bundle_dir = work_dir.join("bundles");

        if !groups.is_empty() {
            debug!("Bundling {} group(s) for {platform}", groups.len());

            let bundled = util::recreate_dir(&bundle_dir)
                .map_err(|e| e.to_string())
                .and_then(|_| {
                    panic::catch_unwind(AssertUnwindSafe(|| self.bundler.bundle(platform, &groups, &bundle_dir)))
                        .map_err(|payload| panic_message(&*payload))
                        .and_then(|bundled| bundled.map_err(|e| e.to_string()))
                });

            if let Err(e) = bundled {
                error!("Bundling for {platform} failed: {e}");
            }
        }

        // Drop contexts missing any of their bundles, then assemble the rest
        for mut context in contexts {
            context.resume();

            isolate(&mut context, |context| {
                context.check_bundles(&bundle_dir)?;
                context.build_content(&self.engine_version, self.policy.as_deref())?;
                context.write_to_disk()?;
                context.post_process(&self.post_steps)?;
                context.succeed()
            });

            finish(context);
        }
    }
}

/// Run `f` on `context`, failing the context on error or panic
fn isolate(context: &mut Context<'_>, f: impl FnOnce(&mut Context<'_>) -> Result<(), context::Error>) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| f(context))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            context.fail(error_chain(&e));
            false
        }
        Err(payload) => {
            context.fail(format!("panicked: {}", panic_message(&*payload)));
            false
        }
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut sources = vec![error.to_string()];
    let mut source = error.source();
    while let Some(error) = source.take() {
        sources.push(error.to_string());
        source = error.source();
    }
    sources.join(": ")
}
