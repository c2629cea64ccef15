// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Listing of built capsules consumed by game packaging

use std::{io::Write, path::Path};

use capsule::Platform;
use chrono::{DateTime, Utc};
use fs_err::{self as fs, File};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::result::Task;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub unique_key: String,
    pub name: String,
    pub platform: Platform,
    pub output_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iap_name: Option<String>,
    pub ship_with_game: bool,
    pub is_streaming_content: bool,
    pub size_on_disk: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_write_time: Option<DateTime<Utc>>,
    pub asset_paths: Vec<String>,
    pub scene_paths: Vec<String>,
}

impl Entry {
    fn new(task: &Task) -> Self {
        let (size_on_disk, last_write_time) = match fs::metadata(&task.output) {
            Ok(meta) => (meta.len(), meta.modified().ok().map(DateTime::<Utc>::from)),
            Err(error) => {
                warn!("No output for {} ({}): {error}", task.unique_key, task.platform);
                (0, None)
            }
        };

        Self {
            unique_key: task.unique_key.clone(),
            name: task.name.clone(),
            platform: task.platform,
            output_path: task.output.to_string_lossy().into_owned(),
            iap_name: task.iap_name.clone(),
            ship_with_game: task.ship_with_game.is_some(),
            is_streaming_content: task.streaming,
            size_on_disk,
            last_write_time,
            asset_paths: task.asset_paths.clone(),
            scene_paths: task.scene_paths.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: Vec<Entry>,
}

impl Manifest {
    pub fn new<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        Self {
            entries: tasks.into_iter().filter(|task| task.success).map(Entry::new).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write(&self, path: &Path) -> Result<(), Error> {
        let mut file = File::create(path)?;

        let mut serializer =
            serde_json::Serializer::with_formatter(&mut file, serde_json::ser::PrettyFormatter::with_indent(b"\t"));
        self.serialize(&mut serializer)?;

        writeln!(&mut file)?;

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] std::io::Error),
    #[error("json")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::result::test::task;

    #[test]
    fn successful_outputs_only() {
        let dir = tempfile::tempdir().unwrap();

        let mut built = task("winter", Platform::Linux, true);
        built.output = dir.path().join("winter.dlc");
        built.iap_name = Some("com.example.winter".to_owned());
        built.scene_paths = vec!["Scenes/lodge.unity".to_owned()];
        fs::write(&built.output, [0; 42]).unwrap();

        let failed = task("summer", Platform::Linux, false);

        let manifest = Manifest::new([&built, &failed]);
        assert_eq!(manifest.entries.len(), 1);

        let entry = &manifest.entries[0];
        assert_eq!(entry.size_on_disk, 42);
        assert!(entry.last_write_time.is_some());
        assert!(!entry.ship_with_game);

        let path = dir.path().join("manifest.json");
        manifest.write(&path).unwrap();

        let json = fs::read_to_string(&path).unwrap();
        assert!(json.contains("\t\"entries\""));
        assert!(json.contains("\"uniqueKey\": \"winter\""));
        assert!(json.contains("\"iapName\": \"com.example.winter\""));
        assert!(json.contains("\"isStreamingContent\": false"));

        let parsed: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, manifest);
    }
}
