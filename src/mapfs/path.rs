/*
 * Copyright 2025 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! The path resolver.
//!
//! Paths handed to the filesystem are absolute, rooted at the filesystem's
//! own root directory, and do not end with a trailing `/` (except the root
//! itself). The walk is read-only.

use crate::error::FsError;
use crate::inode::ROOT_INO;
use crate::ops::MapFs;

/// The maximum length of a path, terminating NUL included.
pub const PATH_MAX: usize = 4096;

impl MapFs {
    /// Resolves `path` to the inode index of its terminal component.
    ///
    /// Errors: [`FsError::NameTooLong`] when the path exceeds [`PATH_MAX`],
    /// [`FsError::NotDir`] when a non-terminal component is not a directory,
    /// [`FsError::NotFound`] when a component is missing.
    pub(crate) fn resolve(&self, path: &str) -> Result<u32, FsError> {
        if path.len() >= PATH_MAX {
            return Err(FsError::NameTooLong);
        }
        let mut ino = ROOT_INO;
        for name in path.split('/').filter(|c| !c.is_empty()) {
            let cur = self.inode(ino);
            if !cur.is_directory() {
                return Err(FsError::NotDir);
            }
            ino = self.dir_lookup(&cur, name).ok_or(FsError::NotFound)?;
        }
        Ok(ino)
    }

    /// Resolves the parent directory of `path`, returning its inode index
    /// along with the path's last component.
    pub(crate) fn resolve_parent<'p>(&self, path: &'p str) -> Result<(u32, &'p str), FsError> {
        if path.len() >= PATH_MAX {
            return Err(FsError::NameTooLong);
        }
        let (dir, name) = path.rsplit_once('/').ok_or(FsError::NotFound)?;
        if name.is_empty() {
            return Err(FsError::NotFound);
        }
        let parent = self.resolve(dir)?;
        if !self.inode(parent).is_directory() {
            return Err(FsError::NotDir);
        }
        Ok((parent, name))
    }
}
