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

//! The extent engine.
//!
//! An inode's data is the in-order concatenation of its extents, runs of
//! contiguous data blocks. The extent list itself occupies a single dedicated
//! block, which bounds the number of extents an inode can hold.
//!
//! Allocation enumerates the free runs of the block bitmap and consumes the
//! smallest sufficient runs first, so small fragments are drained before
//! large runs are broken up. Each consumed run appends one entry to the
//! inode's extent list.

use crate::bitmap;
use crate::bitmap::Bitmap;
use crate::error::FsError;
use crate::inode::Inode;
use crate::ops::MapFs;
use crate::sb::BLOCK_SIZE;
use crate::util::ceil_division;
use log::debug;
use std::mem::size_of;

/// The size of an extent record in bytes.
pub const EXTENT_SIZE: usize = size_of::<Extent>();
/// The maximum number of extents in an inode's extent list.
pub const EXTENTS_PER_BLOCK: u32 = (BLOCK_SIZE / EXTENT_SIZE) as u32;

/// A run of contiguous data blocks.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Extent {
    /// Byte offset, inside the data region, of the run's first block.
    pub start: u64,
    /// The number of blocks in the run.
    pub count: u64,
}

/// A log of the allocations performed by a mutating operation.
///
/// Mutating paths may detect out-of-space after bits have already been
/// flipped. Every allocation is recorded here so the operation can undo its
/// changes before returning, keeping the on-disk invariants intact.
#[derive(Default)]
pub(crate) struct AllocLog {
    /// Allocated inode indexes.
    inodes: Vec<u32>,
    /// Allocated data-block runs, as `(block index, count)` pairs.
    block_runs: Vec<(u64, u64)>,
}

impl AllocLog {
    /// Records the allocation of inode `ino`.
    pub fn track_inode(&mut self, ino: u32) {
        self.inodes.push(ino);
    }

    /// Records the allocation of `count` data blocks starting at block index
    /// `start`.
    pub fn track_blocks(&mut self, start: u64, count: u64) {
        self.block_runs.push((start, count));
    }

    /// Releases every allocation recorded in the log.
    pub fn rollback(self, fs: &mut MapFs) {
        for (start, count) in self.block_runs {
            fs.free_block_run(start, count);
        }
        for ino in self.inodes {
            fs.free_inode(ino);
        }
    }
}

impl MapFs {
    /// Returns the block bitmap's backing bytes.
    pub(crate) fn block_bitmap_bytes(&self) -> &[u8] {
        let off = self.sb.block_bitmap_off as usize;
        let len = self.sb.data_blocks as usize;
        self.img.bytes(off, ceil_division(len, 8))
    }

    /// Returns a mutable view over the block bitmap.
    fn block_bitmap(&mut self) -> Bitmap<'_> {
        let off = self.sb.block_bitmap_off as usize;
        let len = self.sb.data_blocks as usize;
        Bitmap::new(self.img.bytes_mut(off, ceil_division(len, 8)), len)
    }

    /// Reads the `i`th extent of the extent list stored at data offset
    /// `list`.
    pub(crate) fn extent_at(&self, list: u64, i: u32) -> Extent {
        self.read_data_obj(list + i as u64 * EXTENT_SIZE as u64)
    }

    /// Writes the `i`th extent of the extent list stored at data offset
    /// `list`.
    pub(crate) fn set_extent_at(&mut self, list: u64, i: u32, ext: Extent) {
        self.write_data_obj(list + i as u64 * EXTENT_SIZE as u64, &ext);
    }

    /// Returns the extents of `inode`, in file order.
    pub(crate) fn extents(&self, inode: &Inode) -> Vec<Extent> {
        let list = inode.extent_block;
        (0..inode.extent_used)
            .map(|i| self.extent_at(list, i))
            .collect()
    }

    /// Returns the free runs of the block bitmap.
    pub(crate) fn free_runs(&self) -> Vec<(u64, u64)> {
        bitmap::free_runs(self.block_bitmap_bytes(), self.sb.data_blocks as usize)
    }

    /// Allocates a single zeroed data block and records it in `log`.
    ///
    /// Returns the block's index inside the data region.
    pub(crate) fn alloc_block(&mut self, log: &mut AllocLog) -> Result<u64, FsError> {
        let blk = self
            .block_bitmap()
            .set_first_free()
            .ok_or(FsError::NoSpace)? as u64;
        self.sb.blocks_used += 1;
        self.sync_sb();
        self.data_zero(blk * BLOCK_SIZE as u64, BLOCK_SIZE);
        log.track_blocks(blk, 1);
        Ok(blk)
    }

    /// Frees `count` data blocks starting at block index `start`.
    pub(crate) fn free_block_run(&mut self, start: u64, count: u64) {
        self.block_bitmap()
            .clear_range(start as usize, count as usize);
        self.sb.blocks_used -= count as u32;
        self.sync_sb();
    }

    /// Appends `needed` data blocks to `inode`, one extent per consumed free
    /// run, best-fit first. Blocks are zeroed as they are allocated.
    ///
    /// The first append to an inode without extents also allocates its
    /// extent-list block. The caller persists the updated record and rolls
    /// `log` back on error; when the free space does not suffice in the
    /// first place, no bit is changed.
    pub(crate) fn alloc_into(
        &mut self,
        inode: &mut Inode,
        mut needed: u64,
        log: &mut AllocLog,
    ) -> Result<(), FsError> {
        if inode.extent_used == 0 {
            inode.extent_block = self.alloc_block(log)? * BLOCK_SIZE as u64;
        }
        let mut runs = self.free_runs();
        let total: u64 = runs.iter().map(|(_, count)| count).sum();
        if total < needed {
            return Err(FsError::NoSpace);
        }
        runs.sort_unstable_by_key(|(_, count)| *count);

        for (start, count) in runs {
            if needed == 0 {
                break;
            }
            if inode.extent_used == EXTENTS_PER_BLOCK {
                return Err(FsError::NoSpace);
            }
            let take = count.min(needed);
            self.block_bitmap().set_range(start as usize, take as usize);
            self.sb.blocks_used += take as u32;
            self.sync_sb();
            let ext = Extent {
                start: start * BLOCK_SIZE as u64,
                count: take,
            };
            self.data_zero(ext.start, (take as usize) * BLOCK_SIZE);
            self.set_extent_at(inode.extent_block, inode.extent_used, ext);
            inode.extent_used += 1;
            log.track_blocks(start, take);
            needed -= take;
            debug!("allocated run of {take} block(s) at block {start}");
        }
        Ok(())
    }

    /// Frees every data block owned by `inode`, including the extent-list
    /// block, and resets its content fields.
    pub(crate) fn release_inode_data(&mut self, inode: &mut Inode) {
        for ext in self.extents(inode) {
            let start = ext.start;
            let count = ext.count;
            self.free_block_run(start / BLOCK_SIZE as u64, count);
        }
        if inode.extent_used > 0 {
            self.free_block_run(inode.extent_block / BLOCK_SIZE as u64, 1);
        }
        inode.extent_block = 0;
        inode.extent_used = 0;
        inode.size = 0;
    }
}
