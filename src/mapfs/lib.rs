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

//! mapfs is a user-space filesystem stored inside a single fixed-size image
//! file mapped into memory.
//!
//! The image is divided into five contiguous regions, sized in 4096-byte
//! blocks: the superblock, the inode bitmap, the block bitmap, the inode
//! table and the data region. An inode owns a single extent-list block naming
//! runs of contiguous data blocks; directories store dense arrays of
//! fixed-size entries in their data blocks.
//!
//! The crate exposes the mounted filesystem as [`ops::MapFs`], whose methods
//! mirror the callback surface a kernel bridge dispatches serially with
//! absolute paths (`getattr`, `readdir`, `mkdir`, `rmdir`, `create`,
//! `unlink`, `truncate`, `read`, `write`, `utimens`, `statfs`). Errors map to
//! negative host error codes through [`error::FsError::errno`]. Unmounting is
//! dropping the value: the mapping is synced and released.

use std::env::ArgsOs;
use std::path::PathBuf;
use std::process::exit;
use std::{env, fmt};

pub mod bitmap;
pub mod check;
pub mod dir;
pub mod disk;
pub mod error;
pub mod extent;
pub mod file;
pub mod format;
pub mod image;
pub mod inode;
pub mod ops;
pub mod path;
pub mod prompt;
pub mod sb;
#[cfg(test)]
mod testutil;
pub mod util;

pub use error::FsError;
pub use format::Formatter;
pub use ops::MapFs;

/// Returns the command's name along with an iterator over the command's arguments.
pub fn args() -> (String, ArgsOs) {
    let mut args = env::args_os();
    let bin = args
        .next()
        .map(PathBuf::from)
        .and_then(|p| {
            p.file_name()
                .and_then(|name| name.to_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| {
            error("mapfs", "missing binary name");
        });
    (bin, args)
}

/// Writes an error to stderr, then exits.
pub fn error<M: fmt::Display>(bin: &str, msg: M) -> ! {
    eprintln!("{bin}: error: {msg}");
    exit(1);
}
