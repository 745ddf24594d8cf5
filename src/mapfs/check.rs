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

//! Consistency checking.
//!
//! [`check`] walks the whole filesystem from the root and verifies the
//! invariants every operation is supposed to preserve: allocation counters
//! match the bitmap popcounts, every allocated inode and data block is
//! reachable from the root and nothing is allocated twice, directory sizes
//! count their live entries and directory link counts follow the
//! 2-plus-subdirectories convention.
//!
//! The checker is read-only. It backs the `fsck.mapfs` tool and the test
//! suite.

use crate::bitmap;
use crate::dir::DIRENT_SIZE;
use crate::inode::ROOT_INO;
use crate::ops::MapFs;
use crate::sb::BLOCK_SIZE;
use crate::util::ceil_division;
use std::collections::HashSet;

/// The outcome of a consistency check.
pub struct CheckReport {
    /// Human-readable descriptions of every inconsistency found.
    pub errors: Vec<String>,
    /// The number of allocated inodes, per the superblock.
    pub inodes_used: u32,
    /// The number of allocated data blocks, per the superblock.
    pub blocks_used: u32,
}

impl CheckReport {
    /// Tells whether no inconsistency was found.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Verifies the consistency of the mounted filesystem `fs`.
pub fn check(fs: &MapFs) -> CheckReport {
    let sb = fs.sb;
    let total_inodes = sb.total_inodes;
    let data_blocks = sb.data_blocks as u64;
    let inodes_used = sb.inodes_used;
    let blocks_used = sb.blocks_used;
    let mut errors = Vec::new();

    let inode_pop = bitmap::popcount(fs.inode_bitmap_bytes(), total_inodes as usize);
    if inode_pop != inodes_used as u64 {
        errors.push(format!(
            "inode bitmap has {inode_pop} bits set but the superblock counts {inodes_used}"
        ));
    }
    let block_pop = bitmap::popcount(fs.block_bitmap_bytes(), data_blocks as usize);
    if block_pop != blocks_used as u64 {
        errors.push(format!(
            "block bitmap has {block_pop} bits set but the superblock counts {blocks_used}"
        ));
    }

    // Walk the tree, claiming every owned data block along the way.
    let mut owned: HashSet<u64> = HashSet::new();
    let mut seen: HashSet<u32> = HashSet::new();
    let mut queue = vec![ROOT_INO];
    while let Some(ino) = queue.pop() {
        if ino >= total_inodes {
            errors.push(format!("entry references inode {ino} out of bounds"));
            continue;
        }
        if !seen.insert(ino) {
            errors.push(format!("inode {ino} is referenced more than once"));
            continue;
        }
        if !bitmap::test(fs.inode_bitmap_bytes(), ino as usize) {
            errors.push(format!("reachable inode {ino} is not allocated"));
            continue;
        }
        let inode = fs.inode(ino);
        let size = inode.size;
        let extent_used = inode.extent_used;
        if extent_used == 0 {
            let extent_block = inode.extent_block;
            if size != 0 || extent_block != 0 {
                errors.push(format!("inode {ino} has no extents but a non-zero size"));
            }
        } else {
            claim(
                &mut owned,
                &mut errors,
                fs,
                ino,
                inode.extent_block / BLOCK_SIZE as u64,
                1,
            );
            for ext in fs.extents(&inode) {
                claim(
                    &mut owned,
                    &mut errors,
                    fs,
                    ino,
                    ext.start / BLOCK_SIZE as u64,
                    ext.count,
                );
            }
        }

        if inode.is_directory() {
            let mut live = 0u64;
            let mut subdirs = 0u32;
            for ext in fs.extents(&inode) {
                let slots = ext.count * (BLOCK_SIZE / DIRENT_SIZE) as u64;
                for slot in 0..slots {
                    let ent = fs.dirent_at(ext, slot);
                    let child = ent.ino;
                    if child == 0 {
                        continue;
                    }
                    live += 1;
                    if child < total_inodes && fs.inode(child).is_directory() {
                        subdirs += 1;
                    }
                    queue.push(child);
                }
            }
            if live * DIRENT_SIZE as u64 != size {
                errors.push(format!(
                    "directory inode {ino} has size {size} but {live} live entries"
                ));
            }
            let links = inode.links;
            if links != 2 + subdirs {
                errors.push(format!(
                    "directory inode {ino} has {links} links but {subdirs} subdirectories"
                ));
            }
        } else {
            let extents_blocks: u64 = fs.extents(&inode).iter().map(|e| e.count).sum();
            if ceil_division(size, BLOCK_SIZE as u64) > extents_blocks {
                errors.push(format!(
                    "file inode {ino} has size {size} but only {extents_blocks} blocks"
                ));
            }
        }
    }

    for ino in 0..total_inodes {
        if bitmap::test(fs.inode_bitmap_bytes(), ino as usize) && !seen.contains(&ino) {
            errors.push(format!("allocated inode {ino} is not reachable from the root"));
        }
    }
    for blk in 0..data_blocks {
        let allocated = bitmap::test(fs.block_bitmap_bytes(), blk as usize);
        if allocated && !owned.contains(&blk) {
            errors.push(format!("allocated block {blk} has no owner"));
        }
    }

    CheckReport {
        errors,
        inodes_used,
        blocks_used,
    }
}

/// Claims `count` blocks starting at index `start` for inode `ino`.
fn claim(
    owned: &mut HashSet<u64>,
    errors: &mut Vec<String>,
    fs: &MapFs,
    ino: u32,
    start: u64,
    count: u64,
) {
    let data_blocks = fs.sb.data_blocks as u64;
    for blk in start..start + count {
        if blk >= data_blocks {
            errors.push(format!("inode {ino} references block {blk} out of bounds"));
            continue;
        }
        if !owned.insert(blk) {
            errors.push(format!("block {blk} is owned more than once"));
        }
        if !bitmap::test(fs.block_bitmap_bytes(), blk as usize) {
            errors.push(format!("inode {ino} uses block {blk} which is not allocated"));
        }
    }
}
