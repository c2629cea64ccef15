// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0
pub use self::env::Env;
pub use self::profile::Profile;
pub use self::request::{Orchestrator, Request};
pub use self::result::{BuildResult, Task};
pub use self::settings::Settings;

pub mod bundle;
pub mod collect;
pub mod compile;
pub mod context;
pub mod env;
pub mod hooks;
pub mod install;
pub mod manifest;
pub mod platform;
pub mod post;
pub mod profile;
pub mod request;
pub mod result;
pub mod settings;
pub mod timing;
pub mod util;
