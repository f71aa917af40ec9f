//! # 恢复扫描
//!
//! 上次会话未正常卸载、或检查点不可用时，从超级块出发遍历整张指针图，
//! 重建段摘要表：
//!
//! 超级块 -> imap 页 -> inode -> 直接块 / 二级间接块 -> 一级间接块 -> 数据块
//!
//! 超级块只在一次提交完整落盘后才被重写，
//! 因此从它可达的结构就是最后一次完成的提交所留下的全部内容；
//! 尾部之后残留的半截写入不被引用，自然视为空闲。

use alloc::boxed::Box;

use log::{error, info, warn};
use vfs::TimeSpec;

use crate::addr::{LogOffset, first_block_of_indirect, indirect_of};
use crate::disk::Disk;
use crate::fs::Lfs;
use crate::layout::{DiskInode, IndirectBlock, InodeMap, SuperBlock};
use crate::segment::{Owner, SegmentTable};
use crate::{DIRECT_COUNT, Error, IMAP_ENTRIES, Result, meta};

/// 重建的结果
pub struct Rebuilt {
    pub table: SegmentTable,
    /// 可达的 inode 个数
    pub files: u32,
    /// 可达的最大 inode 编号
    pub max_inumber: u32,
}

fn claim(disk: &Disk, table: &mut SegmentTable, at: LogOffset, owner: Owner, now: TimeSpec) -> Result<()> {
    if !disk.geometry().contains(at) {
        error!("{owner:?} points to {at:?}, outside the data area");
        return Err(Error::Corrupted);
    }
    table.claim(at, owner, now)
}

/// 从 `sb` 可达的全部块重建段摘要表
pub fn rebuild(disk: &Disk, sb: &SuperBlock, now: TimeSpec) -> Result<Rebuilt> {
    let mut table = SegmentTable::new(*disk.geometry(), now);
    let mut files = 0;
    let mut max_inumber = 0;

    for (group, &imap_at) in sb.imaps.iter().enumerate() {
        if imap_at.is_null() {
            continue;
        }
        claim(disk, &mut table, imap_at, Owner::Imap { group: group as u32 }, now)?;
        let imap: Box<InodeMap> = disk.read(imap_at)?;

        for (index, &inode_at) in imap.inodes.iter().enumerate() {
            if inode_at.is_null() {
                continue;
            }
            let ino = (group * IMAP_ENTRIES + index) as u32;
            claim(disk, &mut table, inode_at, Owner::Inode { ino }, now)?;
            let inode = meta::read_inode_at(disk, inode_at, ino)?;
            claim_file(disk, &mut table, &inode, now)?;

            files += 1;
            max_inumber = max_inumber.max(ino);
        }
    }

    let tail = if disk.geometry().contains(sb.tail) && !table.is_live(sb.tail) {
        sb.tail
    } else {
        warn!("recorded tail {:?} is unusable, searching for a free slot", sb.tail);
        table.next_free(sb.tail.max(disk.geometry().data_start()), &[])?
    };
    table.set_tail(tail);

    Ok(Rebuilt {
        table,
        files,
        max_inumber,
    })
}

/// 登记文件的数据块与间接块，只走到 inode 记录的块数为止
fn claim_file(disk: &Disk, table: &mut SegmentTable, inode: &DiskInode, now: TimeSpec) -> Result<()> {
    let ino = inode.ino;
    let blocks = inode.block_count();

    for (block, &at) in inode.direct.iter().enumerate().take(blocks as usize) {
        let block = block as u32;
        claim(disk, table, at, Owner::Data { ino, block }, now)?;
    }
    if blocks as usize <= DIRECT_COUNT {
        return Ok(());
    }

    claim(disk, table, inode.double_indirect, Owner::DoubleIndirect { ino }, now)?;
    let double: Box<IndirectBlock> = disk.read(inode.double_indirect)?;
    let last = indirect_of(blocks - 1).unwrap_or(0);

    for outer in 0..=last {
        let page_at = double.entries[outer];
        claim(disk, table, page_at, Owner::Indirect { ino, index: outer as u32 }, now)?;
        let page: Box<IndirectBlock> = disk.read(page_at)?;

        let first = first_block_of_indirect(outer);
        for (inner, &at) in page.entries.iter().enumerate() {
            let block = first + inner as u32;
            if block >= blocks {
                break;
            }
            claim(disk, table, at, Owner::Data { ino, block }, now)?;
        }
    }

    Ok(())
}

impl Lfs {
    /// 用指针图重建一张段摘要表，与内存中的表逐槽位比较
    pub fn verify(&self) -> Result<()> {
        let rebuilt = rebuild(&self.disk, &self.sb, self.clock.now())?;

        if let Some((at, ours, graph)) = self.segments.first_mismatch(&rebuilt.table) {
            error!("{at:?} is recorded as {ours:?}, but the pointer graph says {graph:?}");
            return Err(Error::Corrupted);
        }
        if self.segments.live_bytes() != rebuilt.table.live_bytes()
            || self.segments.clean_count() != rebuilt.table.clean_count()
        {
            error!(
                "live bytes {} / clean segments {} disagree with the pointer graph ({} / {})",
                self.segments.live_bytes(),
                self.segments.clean_count(),
                rebuilt.table.live_bytes(),
                rebuilt.table.clean_count()
            );
            return Err(Error::Corrupted);
        }
        if rebuilt.files != self.sb.file_count || rebuilt.max_inumber > self.sb.max_inumber {
            error!(
                "superblock counts {} files up to inode {}, the pointer graph has {} up to {}",
                self.sb.file_count, self.sb.max_inumber, rebuilt.files, rebuilt.max_inumber
            );
            return Err(Error::Corrupted);
        }

        info!(
            "verified {} files, {} live bytes",
            rebuilt.files,
            rebuilt.table.live_bytes()
        );
        Ok(())
    }
}
