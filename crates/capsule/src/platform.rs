// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

/// Runtime platform a capsule was built for
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
#[repr(i32)]
pub enum Platform {
    Windows = 1,
    WindowsEditor = 2,
    Linux = 3,
    LinuxEditor = 4,
    #[serde(rename = "macos")]
    #[strum(serialize = "macos")]
    MacOs = 5,
    #[serde(rename = "macos-editor")]
    #[strum(serialize = "macos-editor")]
    MacOsEditor = 6,
    Android = 7,
    #[serde(rename = "ios")]
    #[strum(serialize = "ios")]
    IOs = 8,
    #[serde(rename = "webgl")]
    #[strum(serialize = "webgl")]
    WebGl = 9,
}

/// Operating system family, editor and player builds of
/// the same family share content layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Family {
    Windows,
    Linux,
    MacOs,
    Android,
    IOs,
    WebGl,
}

impl Platform {
    pub fn from_i32(value: i32) -> Option<Self> {
        Some(match value {
            1 => Platform::Windows,
            2 => Platform::WindowsEditor,
            3 => Platform::Linux,
            4 => Platform::LinuxEditor,
            5 => Platform::MacOs,
            6 => Platform::MacOsEditor,
            7 => Platform::Android,
            8 => Platform::IOs,
            9 => Platform::WebGl,
            _ => return None,
        })
    }

    pub fn family(&self) -> Family {
        match self {
            Platform::Windows | Platform::WindowsEditor => Family::Windows,
            Platform::Linux | Platform::LinuxEditor => Family::Linux,
            Platform::MacOs | Platform::MacOsEditor => Family::MacOs,
            Platform::Android => Family::Android,
            Platform::IOs => Family::IOs,
            Platform::WebGl => Family::WebGl,
        }
    }

    pub fn is_editor(&self) -> bool {
        matches!(
            self,
            Platform::WindowsEditor | Platform::LinuxEditor | Platform::MacOsEditor
        )
    }

    /// Player platform used when packaging content for this platform
    pub fn player(&self) -> Self {
        match self {
            Platform::WindowsEditor => Platform::Windows,
            Platform::LinuxEditor => Platform::Linux,
            Platform::MacOsEditor => Platform::MacOs,
            other => *other,
        }
    }

    /// Content folder name reserved for this platform's family. Files
    /// under a folder with this name only ship for this family.
    pub fn folder_name(&self) -> &'static str {
        match self.family() {
            Family::Windows => "Windows",
            Family::Linux => "Linux",
            Family::MacOs => "MacOS",
            Family::Android => "Android",
            Family::IOs => "iOS",
            Family::WebGl => "WebGL",
        }
    }

    /// Whether managed script assemblies can be loaded at runtime
    pub fn supports_scripting(&self) -> bool {
        !matches!(self.family(), Family::IOs | Family::WebGl)
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn discriminants_roundtrip() {
        for platform in Platform::iter() {
            assert_eq!(Platform::from_i32(platform as i32), Some(platform));
        }
        assert_eq!(Platform::from_i32(0), None);
    }

    #[test]
    fn editor_and_player_share_family() {
        assert_eq!(Platform::WindowsEditor.family(), Platform::Windows.family());
        assert!(Platform::LinuxEditor.is_editor());
        assert_eq!(Platform::MacOsEditor.player(), Platform::MacOs);
        assert_eq!(Platform::MacOs.to_string(), "macos");
    }

    #[test]
    fn parse_by_name() {
        for platform in Platform::iter() {
            assert_eq!(platform.to_string().parse::<Platform>(), Ok(platform));
        }
        assert_eq!("macos-editor".parse::<Platform>(), Ok(Platform::MacOsEditor));
        assert_eq!("windows-editor".parse::<Platform>(), Ok(Platform::WindowsEditor));
        assert!("playstation".parse::<Platform>().is_err());
    }
}
