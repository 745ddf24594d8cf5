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

//! Filesystem creation.
//!
//! The formatter lays out the regions for a blank image: zeroed bitmaps and
//! inode table, a root directory on inode 0 and the superblock written last.
//! Data blocks are not touched; they are zeroed when allocated.

use crate::disk::get_device_size;
use crate::inode::Inode;
use crate::inode::TimeSpec;
use crate::sb::Superblock;
use crate::sb::BLOCK_SIZE;
use crate::sb::MAGIC;
use crate::util::reinterpret;
use log::debug;
use std::fs::File;
use std::io;
use std::io::Error;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use uuid::Uuid;

/// Creates a mapfs filesystem on a device or image file.
#[derive(Default)]
pub struct Formatter {
    /// The length of the filesystem in bytes. Detected from the device when
    /// absent.
    pub len: Option<u64>,
    /// The number of inodes. Defaults to one per block.
    pub inodes: Option<u32>,
    /// The filesystem's id. Randomized when absent.
    pub volume_id: Option<[u8; 16]>,
}

impl Formatter {
    /// Tells whether a mapfs filesystem is present on the given device `dev`.
    pub fn is_present(dev: &mut File) -> io::Result<bool> {
        dev.seek(SeekFrom::Start(0))?;
        let mut magic = [0u8; 8];
        match dev.read_exact(&mut magic) {
            Ok(()) => Ok(u64::from_le_bytes(magic) == MAGIC),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Creates the filesystem on the given device `dev` and returns the
    /// superblock written to it.
    pub fn create(&self, dev: &mut File) -> io::Result<Superblock> {
        let len = match self.len {
            Some(len) => len,
            None => get_device_size(dev)?,
        };
        if len == 0 || len % BLOCK_SIZE as u64 != 0 {
            return Err(Error::new(
                io::ErrorKind::InvalidInput,
                "device size must be a non-zero multiple of the block size",
            ));
        }
        let total_blocks = len / BLOCK_SIZE as u64;
        let total_inodes = self.inodes.unwrap_or(total_blocks.min(u32::MAX as u64) as u32);
        let volume_id = self
            .volume_id
            .unwrap_or_else(|| Uuid::new_v4().into_bytes());

        let mut sb = Superblock::new(total_blocks, total_inodes, volume_id).ok_or_else(|| {
            Error::new(
                io::ErrorKind::InvalidInput,
                "device too small to hold the filesystem's metadata",
            )
        })?;
        // The root directory consumes the first inode.
        sb.inodes_used = 1;

        let inode_bitmap_off = sb.inode_bitmap_off;
        let block_bitmap_off = sb.block_bitmap_off;
        let inode_table_off = sb.inode_table_off;
        let data_off = sb.data_off;
        fill_bitmap(
            dev,
            inode_bitmap_off,
            (block_bitmap_off - inode_bitmap_off) as usize,
            1,
        )?;
        fill_bitmap(
            dev,
            block_bitmap_off,
            (inode_table_off - block_bitmap_off) as usize,
            0,
        )?;
        write_zeros(dev, inode_table_off, (data_off - inode_table_off) as usize)?;

        let root = Inode::new(libc::S_IFDIR | 0o777, 2, TimeSpec::now());
        dev.seek(SeekFrom::Start(inode_table_off))?;
        dev.write_all(reinterpret(&root))?;

        dev.seek(SeekFrom::Start(0))?;
        dev.write_all(reinterpret(&sb))?;

        debug!("formatted filesystem: {total_blocks} blocks, {total_inodes} inodes");
        Ok(sb)
    }
}

/// Fills a bitmap region.
///
/// Arguments:
/// - `off` is the offset to the beginning of the bitmap.
/// - `size` is the size of the bitmap's region in bytes.
/// - `end` is the end of the portion to be set with 1s, MSB-first. The rest
///   is set with 0s.
fn fill_bitmap(dev: &mut File, off: u64, size: usize, end: usize) -> io::Result<()> {
    let mut slice: Vec<u8> = vec![0; size];

    let set_bytes = end / 8;
    let remaining_bits = end % 8;
    slice[..set_bytes].fill(0xff);
    if remaining_bits != 0 {
        slice[set_bytes] = 0xffu8 << (8 - remaining_bits);
    }

    dev.seek(SeekFrom::Start(off))?;
    dev.write_all(&slice)
}

/// Writes `size` zero bytes at offset `off`.
fn write_zeros(dev: &mut File, off: u64, size: usize) -> io::Result<()> {
    dev.seek(SeekFrom::Start(off))?;
    dev.write_all(&vec![0; size])
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ops::MapFs;
    use std::fs::OpenOptions;
    use tempfile::NamedTempFile;

    fn scratch_file(len: u64) -> (NamedTempFile, File) {
        let tmp = NamedTempFile::new().unwrap();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(tmp.path())
            .unwrap();
        file.set_len(len).unwrap();
        (tmp, file)
    }

    #[test]
    fn format_and_probe() {
        let (tmp, mut file) = scratch_file(1024 * 1024);
        assert!(!Formatter::is_present(&mut file).unwrap());
        Formatter::default().create(&mut file).unwrap();
        assert!(Formatter::is_present(&mut file).unwrap());

        let fs = MapFs::open(tmp.path()).unwrap();
        let st = fs.statfs();
        assert_eq!(st.total_blocks, 256);
        assert_eq!(st.free_inodes, 255);
    }

    #[test]
    fn inode_count_override() {
        let (tmp, mut file) = scratch_file(1024 * 1024);
        let fmt = Formatter {
            inodes: Some(16),
            ..Default::default()
        };
        fmt.create(&mut file).unwrap();
        let fs = MapFs::open(tmp.path()).unwrap();
        // 16 inodes fit a single table block: 3 metadata blocks are saved.
        let st = fs.statfs();
        assert_eq!(st.total_inodes, 16);
        assert_eq!(st.free_blocks, 252);
    }

    #[test]
    fn volume_id_is_kept() {
        let (tmp, mut file) = scratch_file(1024 * 1024);
        let id = [7u8; 16];
        let fmt = Formatter {
            volume_id: Some(id),
            ..Default::default()
        };
        fmt.create(&mut file).unwrap();
        let fs = MapFs::open(tmp.path()).unwrap();
        assert_eq!(fs.volume_id(), id);
    }

    #[test]
    fn rejects_bad_sizes() {
        let (_tmp, mut file) = scratch_file(1000);
        assert!(Formatter::default().create(&mut file).is_err());
        let (_tmp, mut file) = scratch_file(2 * 4096);
        assert!(Formatter::default().create(&mut file).is_err());
    }
}
