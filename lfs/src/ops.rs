//! # 文件操作层
//!
//! 按路径分发的操作表。打开句柄记录 inode 编号与一份 inode 副本，
//! 副本在每次读写前按 imap 刷新，因为写入与清理都会让 inode 搬家。

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use enumflags2::BitFlags;
use log::debug;
use vfs::{Access, DirEntryType, FileHandle, FileSystem, Stat, StatFs, TimeSpec};

use crate::addr::{block_of, block_start};
use crate::bmap;
use crate::disk::{Disk, try_zeroed};
use crate::fs::Lfs;
use crate::layout::DiskInode;
use crate::meta::{self, Path};
use crate::{BLOCK_SIZE, Error, ROOT_INUMBER, Result};

pub struct OpenFile {
    pub ino: u32,
    pub inode: Box<DiskInode>,
}

/// 从 `offset` 起读取至多 `buf.len()` 字节，遇到文件尾截止
fn read_at(disk: &Disk, inode: &DiskInode, offset: u64, buf: &mut [u8]) -> Result<usize> {
    if buf.is_empty() || offset >= inode.size {
        return Ok(0);
    }
    let end = (offset + buf.len() as u64).min(inode.size);
    let (first, last) = (block_of(offset), block_of(end - 1));
    let pos = (offset - block_start(first)) as usize;
    let len = (end - offset) as usize;

    if first == last {
        let block = bmap::read_block(disk, inode, first)?;
        buf[..len].copy_from_slice(&block.0[pos..pos + len]);
        return Ok(len);
    }

    let mut region = try_zeroed((last - first + 1) as usize * BLOCK_SIZE)?;
    bmap::read_range(disk, inode, first, last, &mut region)?;
    buf[..len].copy_from_slice(&region[pos..pos + len]);
    Ok(len)
}

impl Lfs {
    fn open_ino(&mut self, ino: u32) -> Result<FileHandle> {
        let inode = meta::read_inode(&self.disk, &self.sb, ino)?;
        let fh = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(fh, OpenFile { ino, inode });
        Ok(fh)
    }

    fn handle_ino(&self, fh: FileHandle) -> Result<u32> {
        self.handles
            .get(&fh)
            .map(|file| file.ino)
            .ok_or(Error::BadHandle)
    }

    /// 按 imap 重新读取句柄对应的 inode
    fn refresh(&mut self, fh: FileHandle) -> Result<()> {
        let ino = self.handle_ino(fh)?;
        let inode = meta::read_inode(&self.disk, &self.sb, ino)?;
        let file = self.handles.get_mut(&fh).ok_or(Error::BadHandle)?;
        file.inode = inode;
        Ok(())
    }

    /// 普通文件的句柄；目录句柄不能按字节读写
    fn file_ino(&self, fh: FileHandle) -> Result<u32> {
        match self.handle_ino(fh)? {
            ROOT_INUMBER => Err(Error::InvalidArgument),
            ino => Ok(ino),
        }
    }

    pub(crate) fn read_handle(&mut self, fh: FileHandle, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.file_ino(fh)?;
        self.refresh(fh)?;
        let file = self.handles.get(&fh).ok_or(Error::BadHandle)?;
        read_at(&self.disk, &file.inode, offset, buf)
    }

    pub(crate) fn write_handle(&mut self, fh: FileHandle, offset: u64, data: &[u8]) -> Result<usize> {
        let ino = self.file_ino(fh)?;
        let written = self.write_file(ino, offset, data)?;
        self.refresh(fh)?;
        Ok(written)
    }

    fn release_handle(&mut self, fh: FileHandle) -> Result<()> {
        self.handles
            .remove(&fh)
            .map(drop)
            .ok_or(Error::BadHandle)
    }

    fn lookup(&self, path: &str) -> Result<u32> {
        meta::lookup(&self.disk, &self.sb, path)
    }
}

fn access_bits(mask: BitFlags<Access>) -> u32 {
    mask.bits() as u32
}

impl FileSystem for Lfs {
    fn getattr(&mut self, path: &str) -> Result<Stat, vfs::Error> {
        let inode = meta::resolve(&self.disk, &self.sb, path)?;
        Ok(inode.stat())
    }

    fn access(&mut self, path: &str, mask: BitFlags<Access>) -> Result<(), vfs::Error> {
        let inode = meta::resolve(&self.disk, &self.sb, path)?;
        if !inode.owner_allows(access_bits(mask)) {
            debug!("access {path:?} {mask:?} denied");
            return Err(vfs::Error::PermissionDenied);
        }
        Ok(())
    }

    fn create(&mut self, path: &str, mode: u32) -> Result<FileHandle, vfs::Error> {
        let Path::File(name) = Path::parse(path)? else {
            return Err(vfs::Error::AlreadyExists);
        };
        let ino = self.create_file(name, mode)?;
        Ok(self.open_ino(ino)?)
    }

    fn utime(&mut self, path: &str, times: Option<(TimeSpec, TimeSpec)>) -> Result<(), vfs::Error> {
        let ino = self.lookup(path)?;
        let (atime, mtime) = times.unwrap_or_else(|| {
            let now = self.now();
            (now, now)
        });
        Ok(self.set_times(ino, atime, mtime)?)
    }

    fn truncate(&mut self, path: &str, size: u64) -> Result<(), vfs::Error> {
        let ino = self.lookup(path)?;
        if ino == ROOT_INUMBER {
            return Err(vfs::Error::InvalidArgument);
        }
        Ok(self.truncate_file(ino, size)?)
    }

    fn unlink(&mut self, path: &str) -> Result<(), vfs::Error> {
        let Path::File(name) = Path::parse(path)? else {
            return Err(vfs::Error::InvalidArgument);
        };
        if name == "." || name == ".." {
            return Err(vfs::Error::InvalidArgument);
        }
        Ok(self.remove_file(name)?)
    }

    fn open(&mut self, path: &str) -> Result<FileHandle, vfs::Error> {
        let ino = self.lookup(path)?;
        Ok(self.open_ino(ino)?)
    }

    fn read(&mut self, fh: FileHandle, offset: u64, buf: &mut [u8]) -> Result<usize, vfs::Error> {
        Ok(self.read_handle(fh, offset, buf)?)
    }

    fn write(&mut self, fh: FileHandle, offset: u64, data: &[u8]) -> Result<usize, vfs::Error> {
        Ok(self.write_handle(fh, offset, data)?)
    }

    fn release(&mut self, fh: FileHandle) -> Result<(), vfs::Error> {
        Ok(self.release_handle(fh)?)
    }

    fn opendir(&mut self, path: &str) -> Result<FileHandle, vfs::Error> {
        match Path::parse(path)? {
            Path::Root => Ok(self.open_ino(ROOT_INUMBER)?),
            Path::File(name) => {
                meta::find_entry(&self.disk, &self.sb, name)?;
                Err(vfs::Error::InvalidArgument)
            }
        }
    }

    fn readdir(&mut self, fh: FileHandle) -> Result<Vec<vfs::DirEntry>, vfs::Error> {
        if self.handle_ino(fh)? != ROOT_INUMBER {
            return Err(vfs::Error::InvalidArgument);
        }
        self.refresh(fh)?;
        let entries = meta::read_dir(&self.disk, &self.sb)?;
        Ok(entries
            .iter()
            .map(|entry| {
                let ino = entry.inode_id();
                vfs::DirEntry {
                    inode: ino as u64,
                    ty: if ino == ROOT_INUMBER {
                        DirEntryType::Directory
                    } else {
                        DirEntryType::Regular
                    },
                    name: String::from_utf8_lossy(entry.name_bytes()).into_owned(),
                }
            })
            .collect())
    }

    fn releasedir(&mut self, fh: FileHandle) -> Result<(), vfs::Error> {
        Ok(self.release_handle(fh)?)
    }

    fn statfs(&mut self) -> Result<StatFs, vfs::Error> {
        Ok(self.stat_fs())
    }

    fn destroy(&mut self) -> Result<(), vfs::Error> {
        Ok(self.checkpoint()?)
    }
}
