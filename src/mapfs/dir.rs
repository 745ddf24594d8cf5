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

//! The directory engine.
//!
//! A directory's data blocks form a dense array of fixed-size entries. A slot
//! whose name is the single-space sentinel is a tombstone: previously used,
//! now free. Unused slots past the live region are zeroed. The root directory
//! never appears as an entry, so an entry with inode 0 is never live.
//!
//! No `.` or `..` entries are stored; the link-count convention (2 plus the
//! number of child subdirectories) stands in for them.

use crate::error::FsError;
use crate::extent::AllocLog;
use crate::extent::Extent;
use crate::extent::EXTENTS_PER_BLOCK;
use crate::inode::Inode;
use crate::inode::TimeSpec;
use crate::ops::MapFs;
use crate::sb::BLOCK_SIZE;
use std::mem::size_of;
use std::str;

/// The size of a directory entry in bytes.
pub const DIRENT_SIZE: usize = size_of::<Dirent>();
/// The maximum length of an entry name, terminating NUL included.
pub const NAME_MAX: usize = 252;

/// A directory entry, tying a name to an inode.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Dirent {
    /// The index of the inode the entry points to.
    pub ino: u32,
    /// The entry's name, NUL-terminated.
    pub name: [u8; NAME_MAX],
}

impl Dirent {
    /// Creates a live entry named `name` pointing to inode `ino`.
    ///
    /// `name` must fit `NAME_MAX` with its terminating NUL.
    fn new(name: &str, ino: u32) -> Self {
        let mut ent = Self {
            ino,
            name: [0; NAME_MAX],
        };
        ent.name[..name.len()].copy_from_slice(name.as_bytes());
        ent
    }

    /// Creates a tombstone entry.
    fn tombstone() -> Self {
        let mut ent = Self {
            ino: 0,
            name: [0; NAME_MAX],
        };
        ent.name[0] = b' ';
        ent
    }

    /// Tells whether the entry is a tombstone.
    pub fn is_tombstone(&self) -> bool {
        self.name[0] == b' ' && self.name[1] == 0
    }

    /// Returns the entry's name.
    pub fn name_str(&self) -> &str {
        let end = self.name.iter().position(|b| *b == 0).unwrap_or(NAME_MAX);
        str::from_utf8(&self.name[..end]).unwrap_or("")
    }
}

impl MapFs {
    /// Reads the directory entry in slot `slot` of `ext`.
    pub(crate) fn dirent_at(&self, ext: Extent, slot: u64) -> Dirent {
        self.read_data_obj(ext.start + slot * DIRENT_SIZE as u64)
    }

    /// Writes the directory entry in slot `slot` of `ext`.
    fn set_dirent(&mut self, ext: Extent, slot: u64, ent: &Dirent) {
        self.write_data_obj(ext.start + slot * DIRENT_SIZE as u64, ent);
    }

    /// Calls `f` on each live entry of the directory `dir`, in slot order,
    /// until `dir.size / DIRENT_SIZE` entries have been visited or `f`
    /// returns `false`.
    ///
    /// Returns `false` when the iteration was stopped by `f`.
    pub(crate) fn dir_for_each<F: FnMut(&Dirent) -> bool>(&self, dir: &Inode, mut f: F) -> bool {
        let mut remaining = dir.size / DIRENT_SIZE as u64;
        for ext in self.extents(dir) {
            let slots = ext.count * (BLOCK_SIZE / DIRENT_SIZE) as u64;
            for slot in 0..slots {
                if remaining == 0 {
                    return true;
                }
                let ent = self.dirent_at(ext, slot);
                if ent.is_tombstone() {
                    continue;
                }
                if !f(&ent) {
                    return false;
                }
                remaining -= 1;
            }
        }
        true
    }

    /// Returns the inode pointed to by the entry named `name` in the
    /// directory `dir`, if any.
    pub(crate) fn dir_lookup(&self, dir: &Inode, name: &str) -> Option<u32> {
        let mut found = None;
        self.dir_for_each(dir, |ent| {
            if ent.name_str() == name {
                found = Some(ent.ino);
                false
            } else {
                true
            }
        });
        found
    }

    /// Inserts an entry named `name` pointing to `child_ino` into the
    /// directory `parent_ino`, then bumps its size and refreshes its
    /// modification time.
    ///
    /// The entry reuses the first tombstone, or the first slot past the live
    /// entries; when every slot is taken, a fresh one-block extent is
    /// appended. Allocations are recorded in `log`; the parent record is only
    /// persisted on success.
    pub(crate) fn dir_insert(
        &mut self,
        parent_ino: u32,
        name: &str,
        child_ino: u32,
        log: &mut AllocLog,
    ) -> Result<(), FsError> {
        if name.len() >= NAME_MAX {
            return Err(FsError::NameTooLong);
        }
        let mut parent = self.inode(parent_ino);
        if parent.extent_used == 0 {
            parent.extent_block = self.alloc_block(log)? * BLOCK_SIZE as u64;
            let blk = self.alloc_block(log)?;
            let ext = Extent {
                start: blk * BLOCK_SIZE as u64,
                count: 1,
            };
            self.set_extent_at(parent.extent_block, 0, ext);
            parent.extent_used = 1;
        }

        let ent = Dirent::new(name, child_ino);
        let mut remaining = parent.size / DIRENT_SIZE as u64;
        let mut placed = false;
        'scan: for ext in self.extents(&parent) {
            let slots = ext.count * (BLOCK_SIZE / DIRENT_SIZE) as u64;
            for slot in 0..slots {
                if self.dirent_at(ext, slot).is_tombstone() || remaining == 0 {
                    self.set_dirent(ext, slot, &ent);
                    placed = true;
                    break 'scan;
                }
                remaining -= 1;
            }
        }
        if !placed {
            if parent.extent_used == EXTENTS_PER_BLOCK {
                return Err(FsError::NoSpace);
            }
            let blk = self.alloc_block(log)?;
            let ext = Extent {
                start: blk * BLOCK_SIZE as u64,
                count: 1,
            };
            self.set_extent_at(parent.extent_block, parent.extent_used, ext);
            parent.extent_used += 1;
            self.set_dirent(ext, 0, &ent);
        }

        parent.size += DIRENT_SIZE as u64;
        parent.set_mtime(TimeSpec::now());
        self.put_inode(parent_ino, &parent);
        Ok(())
    }

    /// Removes the entry pointing to `child_ino` from the directory
    /// `parent_ino`.
    ///
    /// The slot is tombstoned, the parent's size shrinks by one entry and its
    /// modification time is refreshed; the link count drops only when the
    /// removed child is a directory. Extents left without any live entry are
    /// freed and compacted by swapping in the last extent; when the list
    /// empties, the extent-list block is freed too.
    pub(crate) fn dir_remove(&mut self, parent_ino: u32, child_ino: u32, child_is_dir: bool) {
        let mut parent = self.inode(parent_ino);

        'scan: for ext in self.extents(&parent) {
            let slots = ext.count * (BLOCK_SIZE / DIRENT_SIZE) as u64;
            for slot in 0..slots {
                let ent = self.dirent_at(ext, slot);
                if ent.ino == child_ino && !ent.is_tombstone() {
                    self.set_dirent(ext, slot, &Dirent::tombstone());
                    break 'scan;
                }
            }
        }
        parent.size -= DIRENT_SIZE as u64;
        if child_is_dir {
            parent.links -= 1;
        }
        parent.set_mtime(TimeSpec::now());

        // Reclaim extents whose every slot is dead. The last extent is
        // swapped into the freed position, which must then be re-examined.
        let mut i = 0;
        while i < parent.extent_used {
            let ext = self.extent_at(parent.extent_block, i);
            if self.dirent_sum(ext) == 0 {
                let start = ext.start;
                let count = ext.count;
                self.free_block_run(start / BLOCK_SIZE as u64, count);
                let last = self.extent_at(parent.extent_block, parent.extent_used - 1);
                self.set_extent_at(parent.extent_block, i, last);
                parent.extent_used -= 1;
            } else {
                i += 1;
            }
        }
        if parent.extent_used == 0 {
            self.free_block_run(parent.extent_block / BLOCK_SIZE as u64, 1);
            parent.extent_block = 0;
        }
        self.put_inode(parent_ino, &parent);
    }

    /// Returns the number of live entries in the slots of `ext`.
    fn dirent_sum(&self, ext: Extent) -> u64 {
        let slots = ext.count * (BLOCK_SIZE / DIRENT_SIZE) as u64;
        (0..slots)
            .filter(|slot| {
                let ino = self.dirent_at(ext, *slot).ino;
                ino != 0
            })
            .count() as u64
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn record_size() {
        assert_eq!(DIRENT_SIZE, 256);
    }

    #[test]
    fn entry_names() {
        let ent = Dirent::new("hello", 4);
        let ino = ent.ino;
        assert_eq!(ent.name_str(), "hello");
        assert_eq!(ino, 4);
        assert!(!ent.is_tombstone());
        assert!(Dirent::tombstone().is_tombstone());
        // A name starting with a space is not a tombstone.
        assert!(!Dirent::new(" x", 1).is_tombstone());
    }
}
