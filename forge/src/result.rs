// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{cell::OnceCell, collections::BTreeMap, path::PathBuf, time::Duration};

use capsule::Platform;
use chrono::{DateTime, Utc};

use crate::{
    manifest::Manifest,
    profile::{self, LastBuild},
};

/// Outcome of one build context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub profile: profile::Id,
    pub name: String,
    pub unique_key: String,
    pub platform: Platform,
    pub output: PathBuf,
    pub success: bool,
    /// Why the context failed
    pub error: Option<String>,
    pub started: DateTime<Utc>,
    pub elapsed: Duration,
    pub iap_name: Option<String>,
    /// Install destination when shipping with the game
    pub ship_with_game: Option<PathBuf>,
    pub streaming: bool,
    /// Content root relative paths of packed shared assets
    pub asset_paths: Vec<String>,
    /// Content root relative paths of packed scenes
    pub scene_paths: Vec<String>,
}

/// Record of a build batch, appended to as contexts complete
#[derive(Debug)]
pub struct BuildResult {
    tasks: Vec<Task>,
    failed_batch: bool,
    pub started: DateTime<Utc>,
    pub completed: Option<DateTime<Utc>>,
    manifest: OnceCell<Manifest>,
}

impl BuildResult {
    pub fn new(started: DateTime<Utc>) -> Self {
        Self {
            tasks: vec![],
            failed_batch: false,
            started,
            completed: None,
            manifest: OnceCell::new(),
        }
    }

    pub(crate) fn push(&mut self, task: Task) {
        self.tasks.push(task);
    }

    pub(crate) fn fail_batch(&mut self) {
        self.failed_batch = true;
    }

    pub(crate) fn complete(&mut self, time: DateTime<Utc>) {
        self.completed = Some(time);
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn successful(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|task| task.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|task| !task.success)
    }

    /// No context of the batch succeeded
    pub fn is_failed_batch(&self) -> bool {
        self.failed_batch
    }

    /// At least one task ran and every task succeeded
    pub fn all_successful(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|task| task.success)
    }

    /// Sum of the elapsed time of every task
    pub fn elapsed(&self) -> Duration {
        self.tasks.iter().map(|task| task.elapsed).sum()
    }

    /// Manifest of the successful outputs, built on first access
    pub fn manifest(&self) -> &Manifest {
        self.manifest.get_or_init(|| Manifest::new(self.successful()))
    }

    /// Bookkeeping to store on each profile that took part in the batch
    pub fn profile_updates(&self) -> Vec<profile::Update> {
        let time = self.completed.unwrap_or(self.started);

        let mut per_profile = BTreeMap::<&profile::Id, LastBuild>::new();
        for task in &self.tasks {
            let last_build = per_profile.entry(&task.profile).or_insert_with(|| LastBuild {
                time,
                success: true,
                platforms: vec![],
            });
            last_build.success &= task.success;
            if task.success {
                last_build.platforms.push(task.platform);
            }
        }

        per_profile
            .into_iter()
            .map(|(id, last_build)| profile::Update::LastBuild {
                id: id.clone(),
                last_build,
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub(crate) fn task(profile: &str, platform: Platform, success: bool) -> Task {
        Task {
            profile: profile::Id::new(profile),
            name: profile.to_owned(),
            unique_key: profile.to_owned(),
            platform,
            output: PathBuf::from(format!("/nonexistent/{platform}/{profile}.dlc")),
            success,
            error: (!success).then(|| "failed".to_owned()),
            started: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            elapsed: Duration::from_secs(2),
            iap_name: None,
            ship_with_game: None,
            streaming: false,
            asset_paths: vec![],
            scene_paths: vec![],
        }
    }

    #[test]
    fn empty_is_not_successful() {
        let result = BuildResult::new(Utc::now());
        assert!(!result.all_successful());
        assert!(result.profile_updates().is_empty());
    }

    #[test]
    fn updates_per_profile() {
        let mut result = BuildResult::new(Utc::now());
        result.push(task("winter", Platform::Windows, true));
        result.push(task("winter", Platform::Linux, false));
        result.push(task("summer", Platform::Linux, true));

        assert!(!result.all_successful());
        assert_eq!(result.successful().count(), 2);
        assert_eq!(result.elapsed(), Duration::from_secs(6));

        let updates = result.profile_updates();
        assert_eq!(updates.len(), 2);

        let profile::Update::LastBuild { id, last_build } = &updates[1];
        assert_eq!(id.as_str(), "winter");
        assert!(!last_build.success);
        assert_eq!(last_build.platforms, [Platform::Windows]);
    }
}
