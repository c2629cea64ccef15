// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{
    io,
    path::{Path, PathBuf},
};

use fs_err as fs;
use nix::unistd::{linkat, LinkatFlags};

pub fn ensure_dir_exists(path: &Path) -> io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

pub fn recreate_dir(path: &Path) -> io::Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;
    Ok(())
}

/// Recursively list files below `dir` in a stable order, skipping any
/// directory for which `skip_dir` returns true
pub fn enumerate_files(dir: &Path, skip_dir: &dyn Fn(&Path) -> bool) -> io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut paths = vec![];

    for entry in entries {
        let path = entry.path();
        let meta = entry.metadata()?;

        if meta.is_dir() {
            if !skip_dir(&path) {
                paths.extend(enumerate_files(&path, skip_dir)?);
            }
        } else if meta.is_file() {
            paths.push(path);
        }
    }

    Ok(paths)
}

pub fn hardlink_or_copy(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_file(to)?;
    }

    // Attempt hard link
    let link_result = linkat(None, from, None, to, LinkatFlags::NoSymlinkFollow);

    // Copy instead
    if link_result.is_err() {
        fs::copy(from, to)?;
    }

    Ok(())
}

pub fn is_root() -> bool {
    use nix::unistd::Uid;

    Uid::effective().is_root()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn enumerate_skips_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/Editor")).unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("a/c.txt"), "").unwrap();
        fs::write(dir.path().join("a/Editor/d.txt"), "").unwrap();

        let files = enumerate_files(dir.path(), &|path| path.ends_with("Editor")).unwrap();
        assert_eq!(files, [dir.path().join("a/c.txt"), dir.path().join("b.txt")]);
    }

    #[test]
    fn link_or_copy_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("from");
        let to = dir.path().join("to");
        fs::write(&from, "new").unwrap();
        fs::write(&to, "old").unwrap();

        hardlink_or_copy(&from, &to).unwrap();
        assert_eq!(fs::read_to_string(&to).unwrap(), "new");
    }
}
