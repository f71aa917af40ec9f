//! # 写路径
//!
//! 任何内容变更都遵循同一模式：
//! 重建受影响的块 -> 暂存新副本 -> 整批追加 -> 提交超级块 -> 释放旧副本。
//!
//! 写入的块区间从“写入偏移与旧文件尾二者中较小者”所在的块，
//! 到写入末尾所在的块。区间内已存在的块先读出再修改；
//! 写入起点越过文件尾时，中间的空洞补零。

use alloc::vec::Vec;

use crate::addr::{LogOffset, block_of, block_start, blocks_for, indirect_of};
use crate::block::{Block, Pod};
use crate::disk::try_zeroed;
use crate::fs::Lfs;
use crate::layout::{DirEntry, DiskInode, S_IFREG};
use crate::meta;
use crate::staging::Staging;
use crate::txn::AppendTxn;
use crate::{
    BLOCK_SIZE, DIRECT_COUNT, Error, MAX_FILE_SIZE, MAX_INUMBER, ROOT_INUMBER, Result,
    SEGMENT_SIZE,
};

/// 写入的内容
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Bytes(&'a [u8]),
    /// 指定长度的零
    Zeros(usize),
}

impl Source<'_> {
    fn len(&self) -> usize {
        match self {
            Self::Bytes(bytes) => bytes.len(),
            Self::Zeros(len) => *len,
        }
    }
}

impl Staging<'_> {
    /// 把 `src` 写到文件 `ino` 的 `offset` 处，返回实际写入的字节数
    pub fn write(&mut self, ino: u32, offset: u64, src: Source<'_>) -> Result<usize> {
        let len = src.len();
        if len == 0 {
            return Ok(0);
        }
        if offset >= MAX_FILE_SIZE {
            return Err(Error::FileTooLarge);
        }
        // 部分越界的写入截断到上限
        let len = len.min((MAX_FILE_SIZE - offset) as usize);
        let end = offset + len as u64;

        let (old_size, old_blocks) = {
            let file = self.file(ino)?;
            (file.inode.size, file.inode.block_count())
        };
        let start_block = block_of(offset.min(old_size));
        let end_block = block_of(end - 1);
        let base = block_start(start_block);

        let mut region = try_zeroed((end_block - start_block + 1) as usize * BLOCK_SIZE)?;
        let disk = self.disk();
        for (block, chunk) in (start_block..old_blocks.min(end_block + 1))
            .zip(region.chunks_exact_mut(BLOCK_SIZE))
        {
            let at = self.block_location(ino, block)?;
            disk.read_into(at, chunk).map_err(|err| match err {
                Error::ShortRead | Error::Device => Error::ShortBlock(block),
                err => err,
            })?;
        }

        if offset > old_size {
            region[(old_size - base) as usize..(offset - base) as usize].fill(0);
        }
        let pos = (offset - base) as usize;
        match src {
            Source::Bytes(bytes) => region[pos..pos + len].copy_from_slice(&bytes[..len]),
            Source::Zeros(_) => region[pos..pos + len].fill(0),
        }

        for (block, chunk) in (start_block..=end_block).zip(region.chunks_exact(BLOCK_SIZE)) {
            let old = if block < old_blocks {
                Some(self.block_location(ino, block)?)
            } else {
                None
            };
            self.stage_data(ino, block, old, Block::from_bytes(chunk))?;
        }

        let now = self.now;
        let file = self.file(ino)?;
        if end > old_size {
            file.inode.size = end;
            file.inode.blocks = end_block as u64 + 1;
        }
        file.inode.mtime = now;
        file.inode.ctime = now;
        file.dirty = true;

        Ok(len)
    }

    /// 缩小文件并释放新尾部之后的块
    pub fn shrink(&mut self, ino: u32, size: u64) -> Result<()> {
        let old_blocks = self.file(ino)?.inode.block_count();
        let keep = blocks_for(size);
        self.release_blocks(ino, keep, old_blocks)?;

        let now = self.now;
        let file = self.file(ino)?;
        for slot in file
            .inode
            .direct
            .iter_mut()
            .take(old_blocks as usize)
            .skip(keep as usize)
        {
            *slot = LogOffset::NULL;
        }
        file.inode.size = size;
        file.inode.blocks = keep as u64;
        file.inode.mtime = now;
        file.inode.ctime = now;
        file.dirty = true;

        Ok(())
    }

    /// 删除文件：释放其全部数据块、间接块与 inode 块
    pub fn remove(&mut self, ino: u32) -> Result<()> {
        let blocks = self.file(ino)?.inode.block_count();
        self.release_blocks(ino, 0, blocks)?;
        self.forget_file(ino)
    }

    pub fn set_times(
        &mut self,
        ino: u32,
        atime: vfs::TimeSpec,
        mtime: vfs::TimeSpec,
    ) -> Result<()> {
        let now = self.now;
        let file = self.file(ino)?;
        file.inode.atime = atime;
        file.inode.mtime = mtime;
        file.inode.ctime = now;
        file.dirty = true;
        Ok(())
    }

    /// 释放逻辑块 `[keep, old_blocks)`，以及不再需要的间接块
    fn release_blocks(&mut self, ino: u32, keep: u32, old_blocks: u32) -> Result<()> {
        for block in keep..old_blocks {
            let at = self.block_location(ino, block)?;
            self.txn.retire(at)?;
        }

        if old_blocks as usize <= DIRECT_COUNT {
            return self.unmap_from(ino, keep);
        }
        let last = indirect_of(old_blocks - 1).unwrap_or(0);
        let first_dead = match keep.checked_sub(1).and_then(indirect_of) {
            Some(outer) => outer + 1,
            None => 0,
        };
        for outer in first_dead..=last {
            if let Some(old) = self.drop_indirect(ino, outer)? {
                self.txn.retire(old)?;
            }
        }
        if keep as usize <= DIRECT_COUNT {
            if let Some(old) = self.drop_double(ino)? {
                self.txn.retire(old)?;
            }
        }

        self.unmap_from(ino, keep)
    }
}

impl Lfs {
    fn staging(&self) -> Staging<'_> {
        Staging::new(self, AppendTxn::new(self.segments.tail()))
    }

    pub(crate) fn write_file(&mut self, ino: u32, offset: u64, data: &[u8]) -> Result<usize> {
        let mut staging = self.staging();
        let written = staging.write(ino, offset, Source::Bytes(data))?;
        if written == 0 {
            return Ok(0);
        }
        let (txn, sb) = staging.seal()?;
        self.commit(txn, sb, true)?;
        log::debug!("inode {ino}: wrote {written} bytes at {offset}");
        Ok(written)
    }

    /// 缩小时一次提交；增长时按段大小分批写零
    pub(crate) fn truncate_file(&mut self, ino: u32, size: u64) -> Result<()> {
        if size > MAX_FILE_SIZE {
            return Err(Error::FileTooLarge);
        }
        let current = meta::read_inode(&self.disk, &self.sb, ino)?.size;

        if size < current {
            let mut staging = self.staging();
            staging.shrink(ino, size)?;
            let (txn, sb) = staging.seal()?;
            self.commit(txn, sb, true)?;
        } else {
            let mut at = current;
            while at < size {
                let chunk = (size - at).min(SEGMENT_SIZE as u64) as usize;
                let mut staging = self.staging();
                staging.write(ino, at, Source::Zeros(chunk))?;
                let (txn, sb) = staging.seal()?;
                self.commit(txn, sb, true)?;
                at += chunk as u64;
            }
        }

        log::debug!("inode {ino}: truncated from {current} to {size}");
        Ok(())
    }

    pub(crate) fn set_times(
        &mut self,
        ino: u32,
        atime: vfs::TimeSpec,
        mtime: vfs::TimeSpec,
    ) -> Result<()> {
        let mut staging = self.staging();
        staging.set_times(ino, atime, mtime)?;
        let (txn, sb) = staging.seal()?;
        self.commit(txn, sb, true)
    }

    /// 在根目录中新建文件：目录项、inode 与 imap 在同一事务中提交
    pub(crate) fn create_file(&mut self, name: &str, mode: u32) -> Result<u32> {
        if name == "." || name == ".." {
            return Err(Error::AlreadyExists);
        }
        match meta::find_entry(&self.disk, &self.sb, name) {
            Ok(_) => return Err(Error::AlreadyExists),
            Err(Error::NotFound) => {}
            Err(err) => return Err(err),
        }
        let ino = self.sb.max_inumber + 1;
        if ino >= MAX_INUMBER {
            return Err(Error::TooManyFiles);
        }

        let mut staging = self.staging();
        let (dir_size, uid, gid) = {
            let root = &staging.file(ROOT_INUMBER)?.inode;
            (root.size, root.uid, root.gid)
        };
        let entry = DirEntry::new(name, ino);
        staging.write(ROOT_INUMBER, dir_size, Source::Bytes(entry.as_bytes()))?;

        let mut inode = DiskInode::zeroed();
        inode.init(ino, S_IFREG | (mode & 0o7777), uid, gid, staging.now);
        staging.insert_file(inode);
        staging.sb.max_inumber = ino;
        staging.sb.file_count += 1;
        let (txn, sb) = staging.seal()?;
        self.commit(txn, sb, true)?;

        log::debug!("created {name:?} as inode {ino}");
        Ok(ino)
    }

    /// 删除根目录中的文件：用最后一项覆盖被删项，目录缩短一项，
    /// 并释放文件占用的全部块
    pub(crate) fn remove_file(&mut self, name: &str) -> Result<()> {
        let entries: Vec<DirEntry> = meta::read_dir(&self.disk, &self.sb)?;
        let index = entries
            .iter()
            .position(|entry| entry.name_bytes() == name.as_bytes())
            .ok_or(Error::NotFound)?;
        let ino = entries[index].inode_id();
        if ino == ROOT_INUMBER {
            return Err(Error::InvalidArgument);
        }
        let last = entries.len() - 1;

        let mut staging = self.staging();
        staging.shrink(ROOT_INUMBER, (last * DirEntry::SIZE) as u64)?;
        if index != last {
            let offset = (index * DirEntry::SIZE) as u64;
            staging.write(ROOT_INUMBER, offset, Source::Bytes(entries[last].as_bytes()))?;
        }
        staging.remove(ino)?;
        staging.sb.file_count = staging.sb.file_count.saturating_sub(1);
        let (txn, sb) = staging.seal()?;
        self.commit(txn, sb, true)?;

        log::debug!("removed {name:?} (inode {ino})");
        Ok(())
    }
}
