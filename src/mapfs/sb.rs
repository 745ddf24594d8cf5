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

//! The superblock describes the image's region layout and carries the
//! allocation counters.
//!
//! The image is partitioned at format time into five contiguous regions,
//! aligned and sized in blocks: the superblock itself (block 0), the inode
//! bitmap, the block bitmap, the inode table and the data region. The block
//! bitmap tracks data-region blocks only, so `blocks_used` counts blocks of
//! the data region.

use crate::inode::INODE_SIZE;
use crate::util::ceil_division;

/// The size of a block in bytes.
pub const BLOCK_SIZE: usize = 4096;
/// The filesystem's signature.
pub const MAGIC: u64 = u64::from_le_bytes(*b"mapfs1\0\0");

/// The mapfs superblock, stored at the beginning of block 0.
///
/// All fields are little-endian and fixed-width. The recorded region offsets
/// are authoritative: readers use them rather than recomputing the layout.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Superblock {
    /// The filesystem's signature.
    pub magic: u64,
    /// The size of a block in bytes.
    pub block_size: u32,
    /// The total number of blocks in the image.
    pub total_blocks: u32,
    /// The total number of inodes in the inode table.
    pub total_inodes: u32,
    /// The number of allocated inodes.
    pub inodes_used: u32,
    /// The number of allocated data-region blocks.
    pub blocks_used: u32,
    /// The number of blocks in the data region.
    pub data_blocks: u32,
    /// The byte offset of the inode bitmap.
    pub inode_bitmap_off: u64,
    /// The byte offset of the block bitmap.
    pub block_bitmap_off: u64,
    /// The byte offset of the inode table.
    pub inode_table_off: u64,
    /// The byte offset of the data region.
    pub data_off: u64,
    /// The filesystem's id.
    pub volume_id: [u8; 16],
}

impl Superblock {
    /// Computes the region layout for an image of `total_blocks` blocks
    /// holding `total_inodes` inodes, with allocation counters zeroed.
    ///
    /// Returns `None` when the metadata does not leave at least one data
    /// block.
    pub fn new(total_blocks: u64, total_inodes: u32, volume_id: [u8; 16]) -> Option<Self> {
        if total_inodes == 0 {
            return None;
        }
        let blk = BLOCK_SIZE as u64;
        let inode_bitmap_blocks = ceil_division(total_inodes as u64, blk * 8);
        let block_bitmap_blocks = ceil_division(total_blocks, blk * 8);
        let inode_table_blocks = ceil_division(total_inodes as u64 * INODE_SIZE as u64, blk);
        let metadata_blocks = 1 + inode_bitmap_blocks + block_bitmap_blocks + inode_table_blocks;
        if metadata_blocks + 1 > total_blocks {
            return None;
        }

        Some(Self {
            magic: MAGIC,
            block_size: BLOCK_SIZE as u32,
            total_blocks: total_blocks as u32,
            total_inodes,
            inodes_used: 0,
            blocks_used: 0,
            data_blocks: (total_blocks - metadata_blocks) as u32,
            inode_bitmap_off: blk,
            block_bitmap_off: (1 + inode_bitmap_blocks) * blk,
            inode_table_off: (1 + inode_bitmap_blocks + block_bitmap_blocks) * blk,
            data_off: metadata_blocks * blk,
            volume_id,
        })
    }

    /// Tells whether the superblock is consistent with an image of
    /// `image_len` bytes.
    pub fn is_valid(&self, image_len: usize) -> bool {
        let blk = BLOCK_SIZE as u64;
        let magic = self.magic;
        let block_size = self.block_size;
        let total_blocks = self.total_blocks as u64;
        let total_inodes = self.total_inodes as u64;
        let inodes_used = self.inodes_used as u64;
        let blocks_used = self.blocks_used as u64;
        let data_blocks = self.data_blocks as u64;
        let inode_bitmap_off = self.inode_bitmap_off;
        let block_bitmap_off = self.block_bitmap_off;
        let inode_table_off = self.inode_table_off;
        let data_off = self.data_off;

        magic == MAGIC
            && block_size as usize == BLOCK_SIZE
            && total_blocks * blk == image_len as u64
            && total_inodes >= 1
            && data_blocks >= 1
            && inodes_used <= total_inodes
            && blocks_used <= data_blocks
            && inode_bitmap_off == blk
            && block_bitmap_off >= inode_bitmap_off + ceil_division(total_inodes, blk * 8) * blk
            && inode_table_off >= block_bitmap_off + ceil_division(total_blocks, blk * 8) * blk
            && data_off >= inode_table_off + total_inodes * INODE_SIZE as u64
            && data_off % blk == 0
            && data_off + data_blocks * blk <= image_len as u64
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn record_size() {
        assert_eq!(size_of::<Superblock>(), 80);
    }

    #[test]
    fn layout_1mib() {
        // 256 blocks, one inode per block: 1 superblock + 1 + 1 bitmap
        // blocks + 3 inode-table blocks leaves 250 data blocks.
        let sb = Superblock::new(256, 256, [0; 16]).unwrap();
        let data_blocks = sb.data_blocks;
        let inode_bitmap_off = sb.inode_bitmap_off;
        let block_bitmap_off = sb.block_bitmap_off;
        let inode_table_off = sb.inode_table_off;
        let data_off = sb.data_off;
        assert_eq!(data_blocks, 250);
        assert_eq!(inode_bitmap_off, 4096);
        assert_eq!(block_bitmap_off, 2 * 4096);
        assert_eq!(inode_table_off, 3 * 4096);
        assert_eq!(data_off, 6 * 4096);
        assert!(sb.is_valid(1024 * 1024));
    }

    #[test]
    fn too_small() {
        assert!(Superblock::new(4, 4096, [0; 16]).is_none());
        assert!(Superblock::new(0, 1, [0; 16]).is_none());
        assert!(Superblock::new(16, 0, [0; 16]).is_none());
    }

    #[test]
    fn invalid_superblock() {
        let mut sb = Superblock::new(256, 256, [0; 16]).unwrap();
        assert!(!sb.is_valid(2 * 1024 * 1024));
        sb.magic = 0;
        assert!(!sb.is_valid(1024 * 1024));
    }
}
