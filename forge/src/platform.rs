// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Per platform build settings of a profile

use std::path::PathBuf;

use capsule::{Flags, Platform};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_extension() -> String {
    "dlc".to_owned()
}

/// Settings shared by every platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Identifies the capsule to the game, also its output file stem
    pub unique_key: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Ask the bundler to compress bundle payloads
    #[serde(default)]
    pub compression: bool,
    /// Compile scripts with `DLC_STRICT` defined
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub scripting: bool,
    #[serde(default)]
    pub preload_shared_assets: bool,
    #[serde(default)]
    pub preload_scenes: bool,
    /// Directory the built capsule is installed into when shipping with the game
    #[serde(default)]
    pub ship_with_game: Option<PathBuf>,
    /// Store product identifier when sold separately
    #[serde(default)]
    pub iap_name: Option<String>,
    #[serde(default)]
    pub streaming: bool,
}

impl Settings {
    pub fn new(unique_key: impl ToString) -> Self {
        Self {
            enabled: true,
            unique_key: unique_key.to_string(),
            extension: default_extension(),
            compression: false,
            strict: false,
            scripting: false,
            preload_shared_assets: false,
            preload_scenes: false,
            ship_with_game: None,
            iap_name: None,
            streaming: false,
        }
    }

    pub fn preload_flags(&self) -> Flags {
        let mut flags = Flags::empty();
        flags.set(Flags::PRELOAD_SHARED_ASSETS, self.preload_shared_assets);
        flags.set(Flags::PRELOAD_SCENES, self.preload_scenes);
        flags
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.unique_key, self.extension)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Delivery {
    #[default]
    InstallTime,
    FastFollow,
    OnDemand,
}

/// Android builds can additionally be wrapped in an asset pack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Android {
    #[serde(flatten)]
    pub settings: Settings,
    #[serde(default)]
    pub asset_pack: Option<String>,
    #[serde(default)]
    pub delivery: Delivery,
}

/// Build settings for one target platform, tagged by platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "kebab-case")]
pub enum PlatformProfile {
    Windows(Settings),
    WindowsEditor(Settings),
    Linux(Settings),
    LinuxEditor(Settings),
    #[serde(rename = "macos")]
    MacOs(Settings),
    #[serde(rename = "macos-editor")]
    MacOsEditor(Settings),
    Android(Android),
    #[serde(rename = "ios")]
    IOs(Settings),
    #[serde(rename = "webgl")]
    WebGl(Settings),
}

impl PlatformProfile {
    pub fn new(platform: Platform, settings: Settings) -> Self {
        match platform {
            Platform::Windows => Self::Windows(settings),
            Platform::WindowsEditor => Self::WindowsEditor(settings),
            Platform::Linux => Self::Linux(settings),
            Platform::LinuxEditor => Self::LinuxEditor(settings),
            Platform::MacOs => Self::MacOs(settings),
            Platform::MacOsEditor => Self::MacOsEditor(settings),
            Platform::Android => Self::Android(Android {
                settings,
                asset_pack: None,
                delivery: Delivery::default(),
            }),
            Platform::IOs => Self::IOs(settings),
            Platform::WebGl => Self::WebGl(settings),
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            Self::Windows(_) => Platform::Windows,
            Self::WindowsEditor(_) => Platform::WindowsEditor,
            Self::Linux(_) => Platform::Linux,
            Self::LinuxEditor(_) => Platform::LinuxEditor,
            Self::MacOs(_) => Platform::MacOs,
            Self::MacOsEditor(_) => Platform::MacOsEditor,
            Self::Android(_) => Platform::Android,
            Self::IOs(_) => Platform::IOs,
            Self::WebGl(_) => Platform::WebGl,
        }
    }

    pub fn settings(&self) -> &Settings {
        match self {
            Self::Android(android) => &android.settings,
            Self::Windows(settings)
            | Self::WindowsEditor(settings)
            | Self::Linux(settings)
            | Self::LinuxEditor(settings)
            | Self::MacOs(settings)
            | Self::MacOsEditor(settings)
            | Self::IOs(settings)
            | Self::WebGl(settings) => settings,
        }
    }

    pub fn android(&self) -> Option<&Android> {
        match self {
            Self::Android(android) => Some(android),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tagged_by_platform() {
        let profiles: Vec<PlatformProfile> = serde_yaml::from_str(
            "
- platform: linux
  unique-key: winter
- platform: android
  unique-key: winter-mobile
  enabled: false
  asset-pack: winterpack
  delivery: on-demand
",
        )
        .unwrap();

        assert_eq!(profiles[0].platform(), Platform::Linux);
        assert_eq!(profiles[0].settings().file_name(), "winter.dlc");
        assert!(profiles[0].settings().enabled);
        assert!(profiles[0].android().is_none());

        let android = profiles[1].android().unwrap();
        assert_eq!(profiles[1].platform(), Platform::Android);
        assert!(!android.settings.enabled);
        assert_eq!(android.asset_pack.as_deref(), Some("winterpack"));
        assert_eq!(android.delivery, Delivery::OnDemand);
    }

    #[test]
    fn preload() {
        let mut settings = Settings::new("key");
        settings.preload_scenes = true;
        assert_eq!(settings.preload_flags(), Flags::PRELOAD_SCENES);
    }
}
