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

//! The filesystem call surface.
//!
//! [`MapFs`] owns the mapped image for the mount's lifetime and exposes the
//! operations the kernel bridge dispatches, serially, with absolute paths.
//! Operations return [`FsError`], which maps to the bridge's negative error
//! code convention through [`FsError::errno`]. Dropping the value unmounts:
//! the mapping is synced and released.
//!
//! Mutating operations that run out of space after partial changes roll those
//! changes back before returning, so the on-disk invariants hold between any
//! two calls.

use crate::dir::NAME_MAX;
use crate::error::FsError;
use crate::extent::AllocLog;
use crate::image::Image;
use crate::inode::Inode;
use crate::inode::TimeSpec;
use crate::inode::ROOT_INO;
use crate::sb::Superblock;
use log::debug;
use std::io;
use std::io::Error;
use std::path::Path;

/// Filesystem statistics, computed from the superblock.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatFs {
    /// The size of a block in bytes.
    pub block_size: u32,
    /// The total number of blocks in the image.
    pub total_blocks: u64,
    /// The number of unallocated data blocks.
    pub free_blocks: u64,
    /// The total number of inodes.
    pub total_inodes: u64,
    /// The number of unallocated inodes.
    pub free_inodes: u64,
    /// The maximum length of a file name.
    pub name_max: u32,
}

/// The attributes of a file or directory.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileStat {
    /// Type and permissions.
    pub mode: u32,
    /// The number of hard links.
    pub links: u32,
    /// Size in bytes.
    pub size: u64,
    /// The number of 512-byte sectors covered by the content.
    pub blocks: u64,
    /// Last content modification timestamp.
    pub mtime: TimeSpec,
}

/// A mounted mapfs filesystem.
pub struct MapFs {
    /// The mapped image.
    pub(crate) img: Image,
    /// The superblock. Kept in sync with the image by [`MapFs::sync_sb`].
    pub(crate) sb: Superblock,
}

impl MapFs {
    /// Mounts the image at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let img = Image::open(path)?;
        let sb: Superblock = img.read_obj(0);
        if !sb.is_valid(img.len()) {
            return Err(Error::new(
                io::ErrorKind::InvalidData,
                "not a valid mapfs image",
            ));
        }
        let total_blocks = sb.total_blocks;
        let total_inodes = sb.total_inodes;
        debug!("mounted image: {total_blocks} blocks, {total_inodes} inodes");
        Ok(Self { img, sb })
    }

    /// Writes the cached superblock back to the image.
    pub(crate) fn sync_sb(&mut self) {
        let sb = self.sb;
        self.img.write_obj(0, &sb);
    }

    /// Translates an offset inside the data region into an image offset.
    fn data_pos(&self, off: u64) -> usize {
        (self.sb.data_off + off) as usize
    }

    /// Returns `len` bytes of the data region starting at `off`.
    pub(crate) fn data_bytes(&self, off: u64, len: usize) -> &[u8] {
        self.img.bytes(self.data_pos(off), len)
    }

    /// Returns `len` mutable bytes of the data region starting at `off`.
    pub(crate) fn data_bytes_mut(&mut self, off: u64, len: usize) -> &mut [u8] {
        let pos = self.data_pos(off);
        self.img.bytes_mut(pos, len)
    }

    /// Zeroes `len` bytes of the data region starting at `off`.
    pub(crate) fn data_zero(&mut self, off: u64, len: usize) {
        self.data_bytes_mut(off, len).fill(0);
    }

    /// Reads a record from the data region at offset `off`.
    pub(crate) fn read_data_obj<T: Copy>(&self, off: u64) -> T {
        self.img.read_obj(self.data_pos(off))
    }

    /// Writes a record to the data region at offset `off`.
    pub(crate) fn write_data_obj<T>(&mut self, off: u64, obj: &T) {
        let pos = self.data_pos(off);
        self.img.write_obj(pos, obj);
    }

    /// Returns the filesystem's id.
    pub fn volume_id(&self) -> [u8; 16] {
        self.sb.volume_id
    }

    /// Returns the filesystem's statistics.
    pub fn statfs(&self) -> StatFs {
        let sb = self.sb;
        StatFs {
            block_size: sb.block_size,
            total_blocks: sb.total_blocks as u64,
            free_blocks: (sb.data_blocks - sb.blocks_used) as u64,
            total_inodes: sb.total_inodes as u64,
            free_inodes: (sb.total_inodes - sb.inodes_used) as u64,
            name_max: NAME_MAX as u32,
        }
    }

    /// Returns the attributes of the file or directory at `path`.
    pub fn getattr(&self, path: &str) -> Result<FileStat, FsError> {
        let inode = self.inode(self.resolve(path)?);
        Ok(FileStat {
            mode: inode.mode,
            links: inode.links,
            size: inode.size,
            blocks: inode.size / 512,
            mtime: inode.mtime(),
        })
    }

    /// Calls `filler` with the name of each live entry of the directory at
    /// `path`, in slot order.
    ///
    /// When `filler` returns `false` the enumeration stops and the operation
    /// fails with [`FsError::NoMemory`].
    pub fn readdir<F: FnMut(&str) -> bool>(
        &self,
        path: &str,
        mut filler: F,
    ) -> Result<(), FsError> {
        let dir = self.inode(self.resolve(path)?);
        if !dir.is_directory() {
            return Err(FsError::NotDir);
        }
        if self.dir_for_each(&dir, |ent| filler(ent.name_str())) {
            Ok(())
        } else {
            Err(FsError::NoMemory)
        }
    }

    /// Creates a directory at `path`.
    ///
    /// The parent must exist; `path` must not.
    pub fn mkdir(&mut self, path: &str, mode: u32) -> Result<(), FsError> {
        self.create_node(path, mode | libc::S_IFDIR, 2)
    }

    /// Creates a regular file at `path`.
    ///
    /// The parent must exist; `path` must not.
    pub fn create(&mut self, path: &str, mode: u32) -> Result<(), FsError> {
        self.create_node(path, mode | libc::S_IFREG, 1)
    }

    /// Removes the directory at `path`, which must be empty.
    pub fn rmdir(&mut self, path: &str) -> Result<(), FsError> {
        self.remove_node(path, true)
    }

    /// Removes the regular file at `path`, freeing its data blocks.
    pub fn unlink(&mut self, path: &str) -> Result<(), FsError> {
        self.remove_node(path, false)
    }

    /// Sets the modification time of the file at `path` and of its parent,
    /// either to `times[1]` or, when absent, to the current clock.
    pub fn utimens(&mut self, path: &str, times: Option<[TimeSpec; 2]>) -> Result<(), FsError> {
        let ino = self.resolve(path)?;
        let parent_ino = match self.resolve_parent(path) {
            Ok((parent, _)) => parent,
            Err(_) if ino == ROOT_INO => ROOT_INO,
            Err(e) => return Err(e),
        };
        let t = times.map(|t| t[1]).unwrap_or_else(TimeSpec::now);
        self.touch(ino, t);
        self.touch(parent_ino, t);
        Ok(())
    }

    /// Resizes the file at `path` to `size` bytes.
    ///
    /// Extending zero-fills the new range; shrinking frees whole blocks.
    pub fn truncate(&mut self, path: &str, size: u64) -> Result<(), FsError> {
        let ino = self.resolve(path)?;
        self.truncate_inode(ino, size)
    }

    /// Reads from the file at `path`, starting at `offset`, into `buf`. The
    /// caller guarantees the requested range lies within a single block.
    ///
    /// Returns the number of bytes read: 0 at or past the end of file, and
    /// never more than the bytes remaining before it.
    pub fn read(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize, FsError> {
        let inode = self.inode(self.resolve(path)?);
        Ok(self.copy_from_file(&inode, offset, buf))
    }

    /// Writes `buf` into the file at `path` starting at `offset`, extending
    /// the file first when the range reaches past its current size. The
    /// caller guarantees the written range lies within a single block.
    ///
    /// Returns the number of bytes written, which is `buf.len()` on success.
    pub fn write(&mut self, path: &str, buf: &[u8], offset: u64) -> Result<usize, FsError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let ino = self.resolve(path)?;
        let mut inode = self.inode(ino);
        let end = offset + buf.len() as u64;
        if end > inode.size {
            self.truncate_inode(ino, end)?;
            inode = self.inode(ino);
        }
        self.copy_to_file(&inode, offset, buf);
        self.touch(ino, TimeSpec::now());
        Ok(buf.len())
    }

    /// Allocates an inode and links it under a fresh entry of the parent
    /// directory of `path`. On error, every partial change is undone.
    fn create_node(&mut self, path: &str, mode: u32, links: u32) -> Result<(), FsError> {
        let (parent_ino, name) = self.resolve_parent(path)?;
        let parent_snapshot = self.inode(parent_ino);
        let mut log = AllocLog::default();
        match self.create_node_inner(parent_ino, name, mode, links, &mut log) {
            Ok(()) => Ok(()),
            Err(e) => {
                log.rollback(self);
                self.put_inode(parent_ino, &parent_snapshot);
                Err(e)
            }
        }
    }

    fn create_node_inner(
        &mut self,
        parent_ino: u32,
        name: &str,
        mode: u32,
        links: u32,
        log: &mut AllocLog,
    ) -> Result<(), FsError> {
        let ino = self.alloc_inode(log)?;
        self.dir_insert(parent_ino, name, ino, log)?;
        self.put_inode(ino, &Inode::new(mode, links, TimeSpec::now()));
        if mode & libc::S_IFMT == libc::S_IFDIR {
            let mut parent = self.inode(parent_ino);
            parent.links += 1;
            self.put_inode(parent_ino, &parent);
        }
        Ok(())
    }

    /// Unlinks the entry at `path` and frees its inode and data blocks.
    fn remove_node(&mut self, path: &str, dir: bool) -> Result<(), FsError> {
        let (parent_ino, name) = self.resolve_parent(path)?;
        let parent = self.inode(parent_ino);
        let child_ino = self.dir_lookup(&parent, name).ok_or(FsError::NotFound)?;
        let mut child = self.inode(child_ino);
        if dir {
            if !child.is_directory() {
                return Err(FsError::NotDir);
            }
            if child.size != 0 {
                return Err(FsError::NotEmpty);
            }
        }
        self.release_inode_data(&mut child);
        self.free_inode(child_ino);
        self.dir_remove(parent_ino, child_ino, dir);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::check::check;
    use crate::testutil::new_fs;

    #[test]
    fn statfs_fresh_image() {
        // 1 MiB: 256 blocks, 6 of metadata; one inode per block, root taken.
        let (_tmp, fs) = new_fs(1024 * 1024);
        let st = fs.statfs();
        assert_eq!(st.block_size, 4096);
        assert_eq!(st.total_blocks, 256);
        assert_eq!(st.free_blocks, 250);
        assert_eq!(st.total_inodes, 256);
        assert_eq!(st.free_inodes, 255);
        assert!(check(&fs).is_clean());
    }

    #[test]
    fn root_attributes() {
        let (_tmp, fs) = new_fs(1024 * 1024);
        let st = fs.getattr("/").unwrap();
        assert_eq!(st.mode & libc::S_IFMT, libc::S_IFDIR);
        assert_eq!(st.links, 2);
        assert_eq!(st.size, 0);
    }

    #[test]
    fn mkdir_tree_and_rmdir() {
        let (_tmp, mut fs) = new_fs(1024 * 1024);
        let baseline = fs.statfs();
        fs.mkdir("/a", 0o755).unwrap();
        fs.mkdir("/a/b", 0o755).unwrap();

        let mut names = Vec::new();
        fs.readdir("/a", |name| {
            names.push(name.to_owned());
            true
        })
        .unwrap();
        assert_eq!(names, ["b"]);
        assert_eq!(fs.getattr("/a").unwrap().links, 3);
        assert_eq!(fs.getattr("/").unwrap().links, 3);
        assert!(check(&fs).is_clean());

        assert_eq!(fs.rmdir("/a"), Err(FsError::NotEmpty));
        fs.rmdir("/a/b").unwrap();
        fs.rmdir("/a").unwrap();

        let st = fs.statfs();
        assert_eq!(st.free_blocks, baseline.free_blocks);
        assert_eq!(st.free_inodes, baseline.free_inodes);
        assert_eq!(fs.getattr("/").unwrap().links, 2);
        assert!(check(&fs).is_clean());
    }

    #[test]
    fn create_write_read() {
        let (_tmp, mut fs) = new_fs(1024 * 1024);
        fs.create("/f", 0o644).unwrap();
        assert_eq!(fs.write("/f", b"hello", 0).unwrap(), 5);

        let mut buf = [0u8; 5];
        assert_eq!(fs.read("/f", &mut buf, 0).unwrap(), 5);
        assert_eq!(&buf, b"hello");

        let st = fs.getattr("/f").unwrap();
        assert_eq!(st.mode & libc::S_IFMT, libc::S_IFREG);
        assert_eq!(st.size, 5);
        assert_eq!(st.links, 1);
        assert!(check(&fs).is_clean());
    }

    #[test]
    fn read_stops_at_eof() {
        let (_tmp, mut fs) = new_fs(1024 * 1024);
        fs.create("/f", 0o644).unwrap();
        fs.write("/f", b"abc", 0).unwrap();

        let mut buf = [0xaau8; 8];
        assert_eq!(fs.read("/f", &mut buf, 0).unwrap(), 3);
        // Bytes past the end of file are left untouched.
        assert_eq!(&buf, b"abc\xaa\xaa\xaa\xaa\xaa");
        assert_eq!(fs.read("/f", &mut buf, 3).unwrap(), 0);
        assert_eq!(fs.read("/f", &mut buf, 100).unwrap(), 0);
    }

    #[test]
    fn fill_unlink_refill() {
        let (_tmp, mut fs) = new_fs(1024 * 1024);
        let mut created = Vec::new();
        let err = loop {
            let path = format!("/f{}", created.len());
            if let Err(e) = fs.create(&path, 0o644) {
                break e;
            }
            if let Err(e) = fs.truncate(&path, 4 * 4096) {
                fs.unlink(&path).unwrap();
                break e;
            }
            created.push(path);
        };
        assert_eq!(err, FsError::NoSpace);
        assert!(!created.is_empty());
        assert!(check(&fs).is_clean());

        fs.unlink(&created[0]).unwrap();
        fs.create("/again", 0o644).unwrap();
        fs.truncate("/again", 4 * 4096).unwrap();
        assert!(check(&fs).is_clean());
    }

    #[test]
    fn tombstones_do_not_leak() {
        let (_tmp, mut fs) = new_fs(1024 * 1024);
        fs.mkdir("/d", 0o755).unwrap();
        for i in 0..200 {
            fs.create(&format!("/d/f{i}"), 0o644).unwrap();
        }
        for i in (0..200).step_by(2) {
            fs.unlink(&format!("/d/f{i}")).unwrap();
        }

        let mut names = Vec::new();
        fs.readdir("/d", |name| {
            names.push(name.to_owned());
            true
        })
        .unwrap();
        let expected: Vec<String> = (0..200).step_by(2).map(|i| format!("f{}", i + 1)).collect();
        assert_eq!(names, expected);
        assert_eq!(fs.getattr("/d").unwrap().size, 100 * 256);
        assert!(check(&fs).is_clean());
    }

    #[test]
    fn readdir_backpressure() {
        let (_tmp, mut fs) = new_fs(1024 * 1024);
        fs.mkdir("/d", 0o755).unwrap();
        fs.create("/d/a", 0o644).unwrap();
        fs.create("/d/b", 0o644).unwrap();
        let mut seen = 0;
        assert_eq!(
            fs.readdir("/d", |_| {
                seen += 1;
                false
            }),
            Err(FsError::NoMemory)
        );
        assert_eq!(seen, 1);
    }

    #[test]
    fn resolver_errors() {
        let (_tmp, mut fs) = new_fs(1024 * 1024);
        fs.create("/f", 0o644).unwrap();

        assert_eq!(fs.getattr("/nope"), Err(FsError::NotFound));
        assert_eq!(fs.getattr("/nope/deeper"), Err(FsError::NotFound));
        assert_eq!(fs.getattr("/f/x"), Err(FsError::NotDir));
        assert_eq!(fs.mkdir("/f/x", 0o755), Err(FsError::NotDir));
        assert_eq!(fs.rmdir("/f"), Err(FsError::NotDir));

        let long = format!("/{}", "a".repeat(4096));
        assert_eq!(fs.getattr(&long), Err(FsError::NameTooLong));
        let long_name = format!("/{}", "a".repeat(300));
        assert_eq!(fs.create(&long_name, 0o644), Err(FsError::NameTooLong));
        assert!(check(&fs).is_clean());
    }

    #[test]
    fn utimens_times() {
        let (_tmp, mut fs) = new_fs(1024 * 1024);
        fs.mkdir("/d", 0o755).unwrap();
        fs.create("/d/f", 0o644).unwrap();

        let t = TimeSpec {
            sec: 1_000_000,
            nsec: 42,
        };
        fs.utimens("/d/f", Some([TimeSpec::default(), t])).unwrap();
        assert_eq!(fs.getattr("/d/f").unwrap().mtime, t);
        assert_eq!(fs.getattr("/d").unwrap().mtime, t);

        fs.utimens("/d/f", None).unwrap();
        let now = fs.getattr("/d/f").unwrap().mtime;
        assert!(now.sec > t.sec);

        fs.utimens("/", Some([TimeSpec::default(), t])).unwrap();
        assert_eq!(fs.getattr("/").unwrap().mtime, t);
    }

    #[test]
    fn create_rollback_on_full_image() {
        let (_tmp, mut fs) = new_fs(1024 * 1024);
        fs.mkdir("/d", 0o755).unwrap();
        fs.create("/big", 0o644).unwrap();
        let free = fs.statfs().free_blocks;
        // One block goes to the extent list, the rest to data.
        fs.truncate("/big", (free - 1) * 4096).unwrap();
        assert_eq!(fs.statfs().free_blocks, 0);

        // Inserting into the empty directory needs two fresh blocks.
        let before = fs.statfs();
        assert_eq!(fs.create("/d/x", 0o644), Err(FsError::NoSpace));
        assert_eq!(fs.statfs(), before);
        assert_eq!(fs.getattr("/d/x"), Err(FsError::NotFound));
        assert!(check(&fs).is_clean());
    }

    #[test]
    fn write_returns_full_length() {
        let (_tmp, mut fs) = new_fs(1024 * 1024);
        fs.create("/f", 0o644).unwrap();
        assert_eq!(fs.write("/f", &[7u8; 4096], 0).unwrap(), 4096);
        assert_eq!(fs.write("/f", b"", 100).unwrap(), 0);
        let mut buf = [0u8; 4096];
        assert_eq!(fs.read("/f", &mut buf, 0).unwrap(), 4096);
        assert!(buf.iter().all(|b| *b == 7));
    }
}
