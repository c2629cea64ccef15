// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Reading and writing of DLC capsules
//!
//! A capsule is a single file multiplexing typed content sections behind a
//! fixed header, an optional signing block and a content table.

pub mod codec;
pub mod content;
pub(crate) mod ext;
mod header;
mod platform;
pub mod read;
pub mod registry;
pub mod schedule;
pub mod signing;
mod table;
pub mod write;

pub use self::codec::{Version, VersionError};
pub use self::content::Content;
pub use self::header::{DecodeError as HeaderDecodeError, Flags, Header, CAPSULE_MAGIC, FORMAT_VERSION};
pub use self::platform::{Family, Platform};
pub use self::read::{open, read_bytes, Container, OpenOptions};
pub use self::table::{DecodeError as TableDecodeError, Entry, Kind, Table};
pub use self::write::Writer;
