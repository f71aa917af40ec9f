//! # 元数据解析
//!
//! 超级块 -> imap 页 -> inode 块，以及在根目录中按名字线性查找 inode 编号。
//! 除打开句柄持有的 inode 副本外不做任何缓存。

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::addr::LogOffset;
use crate::block::Pod;
use crate::bmap;
use crate::disk::Disk;
use crate::layout::{DirEntry, DiskInode, InodeMap, SuperBlock};
use crate::{
    BLOCK_SIZE, Error, IMAP_GROUPS, MAX_BLOCK_COUNT, MAX_INUMBER, NAME_MAX_LEN, ROOT_INUMBER,
    Result,
};

/// 扁平命名空间中的路径
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Path<'a> {
    Root,
    /// 根目录下的文件名，不含 `/`
    File(&'a str),
}

impl<'a> Path<'a> {
    pub fn parse(path: &'a str) -> Result<Self> {
        let name = path.strip_prefix('/').unwrap_or(path);
        if name.is_empty() {
            return Ok(Self::Root);
        }
        if name.contains('/') {
            return Err(Error::NotFound);
        }
        if name.len() > NAME_MAX_LEN {
            return Err(Error::NameTooLong);
        }
        Ok(Self::File(name))
    }
}

/// 读取第 `group` 组的 imap 页，组尚未分配时返回 `None`
pub fn read_imap(
    disk: &Disk,
    sb: &SuperBlock,
    group: usize,
) -> Result<Option<(LogOffset, Box<InodeMap>)>> {
    if group >= IMAP_GROUPS {
        return Err(Error::NotFound);
    }
    let at = sb.imaps[group];
    if at.is_null() {
        return Ok(None);
    }
    Ok(Some((at, disk.read(at)?)))
}

/// 读出 inode，确认它确实是 `ino`，且块数与大小自洽
pub fn read_inode_at(disk: &Disk, at: LogOffset, ino: u32) -> Result<Box<DiskInode>> {
    let inode: Box<DiskInode> = disk.read(at)?;
    if inode.ino != ino {
        log::error!("inode block at {at:?} holds inode {}, expected {ino}", inode.ino);
        return Err(Error::Corrupted);
    }
    if inode.blocks > MAX_BLOCK_COUNT as u64
        || inode.blocks != inode.size.div_ceil(BLOCK_SIZE as u64)
    {
        log::error!(
            "inode {ino} at {at:?}: {} bytes in {} blocks",
            inode.size,
            inode.blocks
        );
        return Err(Error::Corrupted);
    }
    Ok(inode)
}

pub fn read_inode(disk: &Disk, sb: &SuperBlock, ino: u32) -> Result<Box<DiskInode>> {
    if ino >= MAX_INUMBER {
        return Err(Error::NotFound);
    }
    let (_, imap) = read_imap(disk, sb, InodeMap::group_of(ino))?.ok_or(Error::NotFound)?;
    let at = imap.get(ino);
    if at.is_null() {
        return Err(Error::NotFound);
    }
    read_inode_at(disk, at, ino)
}

/// 根目录的全部目录项
pub fn read_dir(disk: &Disk, sb: &SuperBlock) -> Result<Vec<DirEntry>> {
    let root = read_inode(disk, sb, ROOT_INUMBER)?;
    let bytes = bmap::read_all(disk, &root)?;
    Ok(bytes
        .chunks_exact(DirEntry::SIZE)
        .map(|chunk| *DirEntry::read_from(chunk))
        .collect())
}

/// 在根目录中线性查找 `name`，返回它在目录中的下标与 inode 编号
pub fn find_entry(disk: &Disk, sb: &SuperBlock, name: &str) -> Result<(usize, u32)> {
    read_dir(disk, sb)?
        .iter()
        .enumerate()
        .find(|(_, entry)| entry.name_bytes() == name.as_bytes())
        .map(|(index, entry)| (index, entry.inode_id()))
        .ok_or(Error::NotFound)
}

/// 路径 -> inode 编号
pub fn lookup(disk: &Disk, sb: &SuperBlock, path: &str) -> Result<u32> {
    match Path::parse(path)? {
        Path::Root => Ok(ROOT_INUMBER),
        Path::File(name) => find_entry(disk, sb, name).map(|(_, ino)| ino),
    }
}

/// 路径 -> inode
pub fn resolve(disk: &Disk, sb: &SuperBlock, path: &str) -> Result<Box<DiskInode>> {
    let ino = lookup(disk, sb, path)?;
    read_inode(disk, sb, ino)
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use block_dev::RamDisk;
    use vfs::TimeSpec;

    use super::*;
    use crate::BLOCKS_PER_SEGMENT;
    use crate::block::Pod;
    use crate::addr::Geometry;
    use crate::block::Block;
    use crate::layout::S_IFREG;

    fn disk() -> Disk {
        let geometry = Geometry { segments: 3, prologue: 1 };
        let dev = Arc::new(RamDisk::new(BLOCK_SIZE, geometry.segments * BLOCKS_PER_SEGMENT));
        Disk::new(dev, geometry)
    }

    fn store(disk: &Disk, at: LogOffset, size: u64, blocks: u64) {
        let mut inode = DiskInode::zeroed();
        inode.init(5, S_IFREG | 0o644, 0, 0, TimeSpec::default());
        inode.size = size;
        inode.blocks = blocks;
        disk.write(at, &Block::from_pod(&*inode)).unwrap();
    }

    #[test]
    fn inode_counts_must_agree() {
        let disk = disk();
        let at = LogOffset::segment_start(1);

        store(&disk, at, 5000, 2);
        assert_eq!(read_inode_at(&disk, at, 5).unwrap().block_count(), 2);
        assert_eq!(read_inode_at(&disk, at, 6).err(), Some(Error::Corrupted));

        store(&disk, at, 5000, 3);
        assert_eq!(read_inode_at(&disk, at, 5).err(), Some(Error::Corrupted));

        let blocks = 300_000;
        store(&disk, at, blocks * BLOCK_SIZE as u64, blocks);
        assert_eq!(read_inode_at(&disk, at, 5).err(), Some(Error::Corrupted));
    }

    #[test]
    fn paths() {
        assert_eq!(Path::parse("/"), Ok(Path::Root));
        assert_eq!(Path::parse("/a"), Ok(Path::File("a")));
        assert_eq!(Path::parse("b"), Ok(Path::File("b")));
        assert_eq!(Path::parse("/a/b"), Err(Error::NotFound));
        assert_eq!(
            Path::parse(&alloc::format!("/{}", "x".repeat(NAME_MAX_LEN + 1))),
            Err(Error::NameTooLong)
        );
    }
}
