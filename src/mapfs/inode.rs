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

//! The inode table.
//!
//! Inodes are fixed-size records stored as a dense array in the inode table
//! region, indexed from 0. The name of a file is not stored in its inode but
//! in the directory entry pointing to it.

use crate::bitmap::Bitmap;
use crate::error::FsError;
use crate::extent::AllocLog;
use crate::ops::MapFs;
use crate::util::ceil_division;
use crate::util::get_timestamp;
use std::mem::size_of;

/// The size of an inode record in bytes.
pub const INODE_SIZE: usize = size_of::<Inode>();
/// The inode of the root directory, allocated at format time.
pub const ROOT_INO: u32 = 0;

/// A timestamp with nanosecond precision.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TimeSpec {
    /// Seconds since the Unix epoch.
    pub sec: i64,
    /// Nanoseconds.
    pub nsec: i64,
}

impl TimeSpec {
    /// Returns the current time.
    ///
    /// A clock failure is fatal.
    pub fn now() -> Self {
        let ts = get_timestamp();
        Self {
            sec: ts.as_secs() as i64,
            nsec: ts.subsec_nanos() as i64,
        }
    }
}

/// An inode represents a file or a directory in the filesystem.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Inode {
    /// Type and permissions.
    pub mode: u32,
    /// The number of hard links to this inode. For a directory: 2 plus the
    /// number of child subdirectories.
    pub links: u32,
    /// Size in bytes. For a directory: live entries times the entry size.
    pub size: u64,
    /// Seconds part of the last content modification timestamp.
    pub mtime_sec: i64,
    /// Nanoseconds part of the last content modification timestamp.
    pub mtime_nsec: i64,
    /// Byte offset, inside the data region, of the block holding the
    /// extent list. Zero when `extent_used` is zero.
    pub extent_block: u64,
    /// The number of extents in the extent list.
    pub extent_used: u32,
    /// Structure padding.
    _reserved: u32,
}

impl Inode {
    /// Creates a fresh inode record with no content.
    pub fn new(mode: u32, links: u32, mtime: TimeSpec) -> Self {
        Self {
            mode,
            links,
            size: 0,
            mtime_sec: mtime.sec,
            mtime_nsec: mtime.nsec,
            extent_block: 0,
            extent_used: 0,
            _reserved: 0,
        }
    }

    /// Tells whether the inode is a directory.
    pub fn is_directory(&self) -> bool {
        self.mode & libc::S_IFMT == libc::S_IFDIR
    }

    /// Returns the last content modification timestamp.
    pub fn mtime(&self) -> TimeSpec {
        TimeSpec {
            sec: self.mtime_sec,
            nsec: self.mtime_nsec,
        }
    }

    /// Sets the last content modification timestamp.
    pub fn set_mtime(&mut self, t: TimeSpec) {
        self.mtime_sec = t.sec;
        self.mtime_nsec = t.nsec;
    }
}

impl MapFs {
    /// Reads the inode record with index `ino`.
    pub(crate) fn inode(&self, ino: u32) -> Inode {
        let off = self.sb.inode_table_off as usize + ino as usize * INODE_SIZE;
        self.img.read_obj(off)
    }

    /// Writes the inode record with index `ino`.
    pub(crate) fn put_inode(&mut self, ino: u32, inode: &Inode) {
        let off = self.sb.inode_table_off as usize + ino as usize * INODE_SIZE;
        self.img.write_obj(off, inode);
    }

    /// Returns the inode bitmap's backing bytes.
    pub(crate) fn inode_bitmap_bytes(&self) -> &[u8] {
        let off = self.sb.inode_bitmap_off as usize;
        let len = self.sb.total_inodes as usize;
        self.img.bytes(off, ceil_division(len, 8))
    }

    /// Allocates the first free inode and records it in `log`.
    pub(crate) fn alloc_inode(&mut self, log: &mut AllocLog) -> Result<u32, FsError> {
        let off = self.sb.inode_bitmap_off as usize;
        let len = self.sb.total_inodes as usize;
        let bytes = self.img.bytes_mut(off, ceil_division(len, 8));
        let ino = Bitmap::new(bytes, len)
            .set_first_free()
            .ok_or(FsError::NoSpace)? as u32;
        self.sb.inodes_used += 1;
        self.sync_sb();
        log.track_inode(ino);
        Ok(ino)
    }

    /// Frees the inode with index `ino`.
    pub(crate) fn free_inode(&mut self, ino: u32) {
        let off = self.sb.inode_bitmap_off as usize;
        let len = self.sb.total_inodes as usize;
        let bytes = self.img.bytes_mut(off, ceil_division(len, 8));
        Bitmap::new(bytes, len).clear(ino as usize);
        self.sb.inodes_used -= 1;
        self.sync_sb();
    }

    /// Sets the modification time of inode `ino`.
    pub(crate) fn touch(&mut self, ino: u32, t: TimeSpec) {
        let mut inode = self.inode(ino);
        inode.set_mtime(t);
        self.put_inode(ino, &inode);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn record_size() {
        assert_eq!(INODE_SIZE, 48);
    }

    #[test]
    fn type_bits() {
        let t = TimeSpec::now();
        let dir = Inode::new(libc::S_IFDIR | 0o755, 2, t);
        let file = Inode::new(libc::S_IFREG | 0o644, 1, t);
        assert!(dir.is_directory());
        assert!(!file.is_directory());
        assert_eq!(dir.mtime(), t);
    }
}
