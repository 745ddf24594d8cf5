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

//! Test support: scratch images.

use crate::format::Formatter;
use crate::ops::MapFs;
use std::fs::OpenOptions;
use tempfile::NamedTempFile;

/// Creates a formatted scratch image of `len` bytes and mounts it.
///
/// The temporary file must outlive the mount.
pub(crate) fn new_fs(len: u64) -> (NamedTempFile, MapFs) {
    let tmp = NamedTempFile::new().unwrap();
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(tmp.path())
        .unwrap();
    file.set_len(len).unwrap();
    Formatter::default().create(&mut file).unwrap();
    drop(file);
    let fs = MapFs::open(tmp.path()).unwrap();
    (tmp, fs)
}
