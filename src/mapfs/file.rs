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

//! The file data engine: mapping file offsets to extents, copying bytes in
//! and out, and resizing.
//!
//! Growth is the authoritative zero-filler: it zeroes the trailing partial
//! block of the previously-last extent before the size field moves, and
//! every freshly allocated block is zeroed at allocation time. Shrinking
//! leaves the partial byte region past the new size untouched.

use crate::error::FsError;
use crate::extent::AllocLog;
use crate::inode::Inode;
use crate::inode::TimeSpec;
use crate::ops::MapFs;
use crate::sb::BLOCK_SIZE;
use crate::util::ceil_division;

impl MapFs {
    /// Translates a file offset into `(extent index, byte offset within the
    /// extent)`.
    ///
    /// Returns `None` when the extent list does not cover `offset`.
    pub(crate) fn locate(&self, inode: &Inode, offset: u64) -> Option<(u32, u64)> {
        let mut remaining = offset as i64 + 1;
        for (i, ext) in self.extents(inode).into_iter().enumerate() {
            let len = (ext.count * BLOCK_SIZE as u64) as i64;
            remaining -= len;
            if remaining <= 0 {
                return Some((i as u32, (remaining + len - 1) as u64));
            }
        }
        None
    }

    /// Copies bytes from `inode`'s data at `offset` into `buf`, stopping at
    /// the logical end of file. The caller guarantees the requested range
    /// lies within a single block.
    ///
    /// Returns the number of bytes copied; bytes of `buf` past the copy are
    /// left unchanged.
    pub(crate) fn copy_from_file(&self, inode: &Inode, offset: u64, buf: &mut [u8]) -> usize {
        let size = inode.size;
        if offset >= size {
            return 0;
        }
        let (i, byte) = self
            .locate(inode, offset)
            .expect("extent list covers file size");
        let ext = self.extent_at(inode.extent_block, i);
        let cap = (ext.count * BLOCK_SIZE as u64 - byte) as usize;
        let n = buf.len().min((size - offset) as usize).min(cap);
        buf[..n].copy_from_slice(self.data_bytes(ext.start + byte, n));
        n
    }

    /// Copies `buf` into `inode`'s data at `offset`. The range must already
    /// be covered by the inode's extents.
    ///
    /// A copy crossing an extent boundary is split into a head copy and a
    /// tail copy, each located through the file-relative offset.
    pub(crate) fn copy_to_file(&mut self, inode: &Inode, offset: u64, buf: &[u8]) {
        let (i, byte) = self
            .locate(inode, offset)
            .expect("extent list covers file size");
        let ext = self.extent_at(inode.extent_block, i);
        let cap = (ext.count * BLOCK_SIZE as u64 - byte) as usize;
        let head = buf.len().min(cap);
        self.data_bytes_mut(ext.start + byte, head)
            .copy_from_slice(&buf[..head]);
        if head < buf.len() {
            let (i, byte) = self
                .locate(inode, offset + head as u64)
                .expect("extent list covers file size");
            let ext = self.extent_at(inode.extent_block, i);
            self.data_bytes_mut(ext.start + byte, buf.len() - head)
                .copy_from_slice(&buf[head..]);
        }
    }

    /// Resizes the file `ino` to `new_size` bytes, allocating or freeing
    /// whole blocks as needed and refreshing the modification time.
    ///
    /// Shrinking to zero releases every extent and the extent-list block but
    /// keeps the inode itself.
    pub(crate) fn truncate_inode(&mut self, ino: u32, new_size: u64) -> Result<(), FsError> {
        let blk = BLOCK_SIZE as u64;
        let mut inode = self.inode(ino);
        let old_size = inode.size;

        if new_size == 0 {
            self.release_inode_data(&mut inode);
            inode.set_mtime(TimeSpec::now());
            self.put_inode(ino, &inode);
            return Ok(());
        }

        let cur_blocks = ceil_division(old_size, blk);
        let new_blocks = ceil_division(new_size, blk);
        if new_blocks == cur_blocks {
            if new_size > old_size {
                // Regrowing over a region a previous shrink may have left
                // dirty: zero it.
                self.zero_after(&inode, old_size, new_size - old_size);
            }
        } else if new_blocks > cur_blocks {
            let mut log = AllocLog::default();
            if old_size % blk != 0 {
                self.zero_after(&inode, old_size, blk - old_size % blk);
            }
            if let Err(e) = self.alloc_into(&mut inode, new_blocks - cur_blocks, &mut log) {
                // The on-disk record was not touched yet; releasing the
                // logged bits restores the pre-call state.
                log.rollback(self);
                return Err(e);
            }
        } else {
            let mut drop_blocks = cur_blocks - new_blocks;
            while drop_blocks > 0 {
                let i = inode.extent_used - 1;
                let mut ext = self.extent_at(inode.extent_block, i);
                let count = ext.count;
                let take = count.min(drop_blocks);
                self.free_block_run(ext.start / blk + count - take, take);
                if take == count {
                    inode.extent_used -= 1;
                } else {
                    ext.count = count - take;
                    self.set_extent_at(inode.extent_block, i, ext);
                }
                drop_blocks -= take;
            }
            if inode.extent_used == 0 {
                self.free_block_run(inode.extent_block / blk, 1);
                inode.extent_block = 0;
            }
        }

        inode.size = new_size;
        inode.set_mtime(TimeSpec::now());
        self.put_inode(ino, &inode);
        Ok(())
    }

    /// Zeroes `len` bytes of `inode`'s data starting right at file offset
    /// `end`, which must be non-zero and lie within the allocated extents.
    /// The range must not cross a block boundary.
    fn zero_after(&mut self, inode: &Inode, end: u64, len: u64) {
        if len == 0 || inode.extent_used == 0 {
            return;
        }
        let (i, byte) = self
            .locate(inode, end - 1)
            .expect("extent list covers file size");
        let ext = self.extent_at(inode.extent_block, i);
        self.data_zero(ext.start + byte + 1, len as usize);
    }
}

#[cfg(test)]
mod test {
    use crate::check::check;
    use crate::error::FsError;
    use crate::ops::MapFs;
    use crate::testutil::new_fs;

    /// Reads the whole file block by block, checking every byte is zero.
    fn assert_all_zero(fs: &MapFs, path: &str, size: u64) {
        let mut off = 0;
        let mut buf = [0xffu8; 4096];
        while off < size {
            let want = 4096.min((size - off) as usize);
            let n = fs.read(path, &mut buf[..want], off).unwrap();
            assert_eq!(n, want);
            assert!(buf[..n].iter().all(|b| *b == 0), "dirty byte past {off}");
            off += n as u64;
        }
    }

    #[test]
    fn truncate_grow_zero_fills() {
        let (_tmp, mut fs) = new_fs(1024 * 1024);
        let baseline = fs.statfs().free_blocks;
        fs.create("/f", 0o644).unwrap();
        fs.truncate("/f", 10000).unwrap();

        assert_eq!(fs.getattr("/f").unwrap().size, 10000);
        assert_all_zero(&fs, "/f", 10000);
        // ceil(10000 / 4096) data blocks plus the extent-list block.
        assert_eq!(fs.statfs().free_blocks, baseline - 4);
        assert!(check(&fs).is_clean());
    }

    #[test]
    fn truncate_shrink_frees_blocks() {
        let (_tmp, mut fs) = new_fs(1024 * 1024);
        let baseline = fs.statfs().free_blocks;
        fs.create("/f", 0o644).unwrap();
        fs.truncate("/f", 10 * 4096).unwrap();
        fs.truncate("/f", 4096 + 1).unwrap();

        assert_eq!(fs.getattr("/f").unwrap().size, 4097);
        assert_eq!(fs.statfs().free_blocks, baseline - 3);
        assert!(check(&fs).is_clean());
    }

    #[test]
    fn truncate_to_zero_releases_everything() {
        let (_tmp, mut fs) = new_fs(1024 * 1024);
        fs.create("/f", 0o644).unwrap();
        let baseline = fs.statfs().free_blocks;
        fs.write("/f", b"payload", 0).unwrap();
        fs.truncate("/f", 0).unwrap();

        // The file survives with size 0 and no blocks.
        let st = fs.getattr("/f").unwrap();
        assert_eq!(st.size, 0);
        assert_eq!(fs.statfs().free_blocks, baseline);
        assert!(check(&fs).is_clean());

        fs.write("/f", b"back", 0).unwrap();
        let mut buf = [0u8; 4];
        fs.read("/f", &mut buf, 0).unwrap();
        assert_eq!(&buf, b"back");
    }

    #[test]
    fn regrow_zeroes_stale_bytes() {
        let (_tmp, mut fs) = new_fs(1024 * 1024);
        fs.create("/f", 0o644).unwrap();
        fs.write("/f", b"xyz", 4090).unwrap();
        // Shrink below the write, then grow back over it within the block.
        fs.truncate("/f", 4091).unwrap();
        fs.truncate("/f", 4093).unwrap();

        let mut buf = [0xffu8; 5];
        assert_eq!(fs.read("/f", &mut buf, 4088).unwrap(), 5);
        assert_eq!(&buf, b"\0\0x\0\0");
        assert!(check(&fs).is_clean());
    }

    #[test]
    fn regrow_across_blocks_zero_fills() {
        let (_tmp, mut fs) = new_fs(1024 * 1024);
        fs.create("/f", 0o644).unwrap();
        fs.write("/f", b"tail", 4092).unwrap();
        fs.truncate("/f", 4090).unwrap();
        fs.truncate("/f", 3 * 4096).unwrap();

        assert_eq!(fs.getattr("/f").unwrap().size, 3 * 4096);
        let mut buf = [0xffu8; 8];
        assert_eq!(fs.read("/f", &mut buf, 4088).unwrap(), 8);
        assert_eq!(buf, [0u8; 8]);
        assert!(check(&fs).is_clean());
    }

    #[test]
    fn fragmented_file_spans_extents() {
        let (_tmp, mut fs) = new_fs(4 * 1024 * 1024);
        fs.create("/a", 0o644).unwrap();
        fs.truncate("/a", 4096).unwrap();
        fs.create("/b", 0o644).unwrap();
        fs.truncate("/b", 4096).unwrap();
        // Punch a two-block hole below /b's blocks.
        fs.unlink("/a").unwrap();

        fs.create("/c", 0o644).unwrap();
        fs.truncate("/c", 3 * 4096).unwrap();
        assert!(check(&fs).is_clean());

        // A write straddling the first block boundary crosses extents.
        fs.write("/c", b"boundary", 4092).unwrap();
        let mut head = [0u8; 4];
        let mut tail = [0u8; 4];
        assert_eq!(fs.read("/c", &mut head, 4092).unwrap(), 4);
        assert_eq!(fs.read("/c", &mut tail, 4096).unwrap(), 4);
        assert_eq!(&head, b"boun");
        assert_eq!(&tail, b"dary");
        assert!(check(&fs).is_clean());
    }

    #[test]
    fn extent_list_exhaustion_rolls_back() {
        let (_tmp, mut fs) = new_fs(8 * 1024 * 1024);
        // Checkerboard the data region: allocate one-block files, then
        // unlink every other one so no long free run remains.
        let mut files = Vec::new();
        loop {
            let path = format!("/f{}", files.len());
            if fs.create(&path, 0o644).is_err() || fs.truncate(&path, 4096).is_err() {
                let _ = fs.unlink(&path);
                break;
            }
            files.push(path);
        }
        for path in files.iter().step_by(2) {
            fs.unlink(path).unwrap();
        }
        assert!(check(&fs).is_clean());

        // More blocks are free than one extent list can ever name, so the
        // allocation must fail and leave no trace.
        let free = fs.statfs().free_blocks;
        assert!(free > 513);
        fs.create("/huge", 0o644).unwrap();
        let before = fs.statfs();
        assert_eq!(
            fs.truncate("/huge", (free - 1) * 4096),
            Err(FsError::NoSpace)
        );
        assert_eq!(fs.statfs(), before);
        assert_eq!(fs.getattr("/huge").unwrap().size, 0);
        assert!(check(&fs).is_clean());
    }

    #[test]
    fn write_hole_reads_back_zero() {
        let (_tmp, mut fs) = new_fs(1024 * 1024);
        fs.create("/f", 0o644).unwrap();
        fs.write("/f", b"end", 8000).unwrap();
        assert_eq!(fs.getattr("/f").unwrap().size, 8003);

        let mut buf = [0xffu8; 4096];
        assert_eq!(fs.read("/f", &mut buf, 0).unwrap(), 4096);
        assert!(buf.iter().all(|b| *b == 0));
        let n = fs.read("/f", &mut buf, 4096).unwrap();
        assert_eq!(n, 8003 - 4096);
        assert!(buf[..8000 - 4096].iter().all(|b| *b == 0));
        assert_eq!(&buf[8000 - 4096..n], b"end");
        assert!(check(&fs).is_clean());
    }
}
