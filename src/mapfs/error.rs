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

//! Errors returned by filesystem operations.
//!
//! The kernel bridge expects negative host error codes, which [`FsError::errno`]
//! provides. Mount-time failures are reported as [`std::io::Error`] instead.

use std::ffi::c_int;
use thiserror::Error;

/// An error returned by a filesystem operation.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum FsError {
    /// The path or one of its components is too long.
    #[error("pathname too long")]
    NameTooLong,
    /// A component of the path does not exist.
    #[error("no such file or directory")]
    NotFound,
    /// A component of the path prefix is not a directory.
    #[error("not a directory")]
    NotDir,
    /// The directory to remove still has entries.
    #[error("directory not empty")]
    NotEmpty,
    /// An inode, data block or extent-list slot could not be allocated.
    #[error("no space left on device")]
    NoSpace,
    /// The directory entry consumer reported backpressure.
    #[error("out of memory")]
    NoMemory,
}

impl FsError {
    /// Returns the negative host error code matching the error.
    pub fn errno(self) -> c_int {
        match self {
            Self::NameTooLong => -libc::ENAMETOOLONG,
            Self::NotFound => -libc::ENOENT,
            Self::NotDir => -libc::ENOTDIR,
            Self::NotEmpty => -libc::ENOTEMPTY,
            Self::NoSpace => -libc::ENOSPC,
            Self::NoMemory => -libc::ENOMEM,
        }
    }
}
