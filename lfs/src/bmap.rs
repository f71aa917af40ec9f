//! # 块地址翻译
//!
//! 逻辑块号 -> 日志偏移：
//! - 小于直接索引个数的块直接查 inode
//! - 其余块先读二级间接块，再读对应的一级间接块
//!
//! 区间读取对连续的块复用已读的间接块，每个间接块每次调用至多读一次。

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::addr::{BlockIndex, LogOffset, block_start};
use crate::block::Block;
use crate::disk::{Disk, try_zeroed};
use crate::layout::{DiskInode, IndirectBlock};
use crate::{BLOCK_SIZE, Error, Result};

/// 第 `block` 个逻辑块的日志偏移
pub fn block_offset(disk: &Disk, inode: &DiskInode, block: u32) -> Result<LogOffset> {
    if block >= inode.block_count() {
        return Err(Error::BlockOutOfRange(block));
    }

    match BlockIndex::of(block) {
        BlockIndex::Direct(i) => Ok(inode.direct[i]),
        BlockIndex::Indirect { outer, inner } => {
            let double: Box<IndirectBlock> = disk.read(inode.double_indirect)?;
            let indirect: Box<IndirectBlock> = disk.read(double.entries[outer])?;
            Ok(indirect.entries[inner])
        }
    }
}

/// 读取 `[start, end]` 区间内的逻辑块到 `buf`，`buf` 的长度必须恰好容纳这些块
///
/// 数据块读取失败时返回 [`Error::ShortBlock`] 指明出错的块，
/// 间接块读取失败时返回通常的短读错误。
pub fn read_range(
    disk: &Disk,
    inode: &DiskInode,
    start: u32,
    end: u32,
    buf: &mut [u8],
) -> Result<()> {
    if start > end {
        return Ok(());
    }
    if end >= inode.block_count() {
        return Err(Error::BlockOutOfRange(end));
    }
    debug_assert_eq!(buf.len(), (end - start + 1) as usize * BLOCK_SIZE);

    let mut double: Option<Box<IndirectBlock>> = None;
    let mut indirect: Option<(usize, Box<IndirectBlock>)> = None;

    for (block, chunk) in (start..=end).zip(buf.chunks_exact_mut(BLOCK_SIZE)) {
        let offset = match BlockIndex::of(block) {
            BlockIndex::Direct(i) => inode.direct[i],
            BlockIndex::Indirect { outer, inner } => {
                let dind = match double.take() {
                    Some(dind) => dind,
                    None => disk.read(inode.double_indirect)?,
                };
                let page = match indirect.take() {
                    Some((index, page)) if index == outer => page,
                    _ => disk.read(dind.entries[outer])?,
                };
                let offset = page.entries[inner];
                double = Some(dind);
                indirect = Some((outer, page));
                offset
            }
        };

        disk.read_into(offset, chunk).map_err(|err| match err {
            Error::ShortRead | Error::Device => Error::ShortBlock(block),
            err => err,
        })?;
    }

    Ok(())
}

/// 读取单个逻辑块
pub fn read_block(disk: &Disk, inode: &DiskInode, block: u32) -> Result<Box<Block>> {
    let offset = block_offset(disk, inode, block)?;
    disk.read(offset)
}

/// 读取文件的全部内容，按文件大小截断
pub fn read_all(disk: &Disk, inode: &DiskInode) -> Result<Vec<u8>> {
    let blocks = inode.block_count();
    let mut bytes = try_zeroed(blocks as usize * BLOCK_SIZE)?;
    if blocks > 0 {
        read_range(disk, inode, 0, blocks - 1, &mut bytes)?;
    }
    bytes.truncate(inode.size.min(block_start(blocks)) as usize);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use alloc::vec;

    use block_dev::RamDisk;

    use super::*;
    use crate::BLOCKS_PER_SEGMENT;
    use crate::addr::Geometry;
    use crate::block::Pod;

    /// 12 个块的文件：0..10 走直接索引，10 与 11 走二级间接索引
    fn twelve_blocks() -> (Disk, Box<DiskInode>) {
        let geometry = Geometry { segments: 3, prologue: 1 };
        let dev = Arc::new(RamDisk::new(BLOCK_SIZE, geometry.segments * BLOCKS_PER_SEGMENT));
        let disk = Disk::new(dev, geometry);

        let mut inode = DiskInode::zeroed();
        inode.size = 12 * BLOCK_SIZE as u64;
        inode.blocks = 12;
        for block in 0..12 {
            let at = LogOffset::from_parts(2, 20 + block);
            disk.write(at, &Block::from_bytes(&[block as u8 + 1; BLOCK_SIZE])).unwrap();
            if block < 10 {
                inode.direct[block] = at;
            }
        }

        let mut indirect = IndirectBlock::zeroed();
        indirect.entries[0] = LogOffset::from_parts(2, 30);
        indirect.entries[1] = LogOffset::from_parts(2, 31);
        let mut double = IndirectBlock::zeroed();
        double.entries[0] = LogOffset::from_parts(1, 7);
        disk.write(double.entries[0], &Block::from_pod(&*indirect)).unwrap();
        inode.double_indirect = LogOffset::from_parts(1, 3);
        disk.write(inode.double_indirect, &Block::from_pod(&*double)).unwrap();

        (disk, inode)
    }

    #[test]
    fn single_blocks_across_the_boundary() {
        let (disk, inode) = twelve_blocks();
        assert_eq!(block_offset(&disk, &inode, 9), Ok(LogOffset::from_parts(2, 29)));
        assert_eq!(block_offset(&disk, &inode, 10), Ok(LogOffset::from_parts(2, 30)));
        assert_eq!(block_offset(&disk, &inode, 11), Ok(LogOffset::from_parts(2, 31)));
        assert_eq!(block_offset(&disk, &inode, 12), Err(Error::BlockOutOfRange(12)));
        assert_eq!(read_block(&disk, &inode, 10).unwrap().0, [11; BLOCK_SIZE]);
    }

    #[test]
    fn range_across_the_boundary() {
        let (disk, inode) = twelve_blocks();
        let mut buf = vec![0; 4 * BLOCK_SIZE];
        read_range(&disk, &inode, 8, 11, &mut buf).unwrap();
        for (i, chunk) in buf.chunks_exact(BLOCK_SIZE).enumerate() {
            assert!(chunk.iter().all(|&b| b == 9 + i as u8), "block {}", 8 + i);
        }
        assert_eq!(read_all(&disk, &inode).unwrap().len(), 12 * BLOCK_SIZE);
    }
}
