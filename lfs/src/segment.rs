//! # 段摘要表
//!
//! 每个块槽位记录一个 [`Owner`]，每段记录存活字节数与最后写入时间。
//! 这张表是“某块是否仍被引用”的唯一依据：
//!
//! - 分配器在这里寻找下一个空闲槽位
//! - 清理器在这里挑选段、找到存活块的主人
//!
//! 表必须与指针图严格一致：被引用的块必须登记，已登记的块必须被引用。

use alloc::vec;
use alloc::vec::Vec;

use vfs::TimeSpec;

use crate::addr::{Geometry, LogOffset};
use crate::layout::{RawOwner, RawSegmentSummary};
use crate::{BLOCK_SIZE, BLOCKS_PER_SEGMENT, Error, Result, SEGMENT_SIZE};

/// 块槽位的归属
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Owner {
    #[default]
    Free,
    /// 序言段，永远存活且不参与清理
    Prologue,
    Imap { group: u32 },
    Inode { ino: u32 },
    DoubleIndirect { ino: u32 },
    /// 文件的第 `index` 个一级间接块
    Indirect { ino: u32, index: u32 },
    /// 文件的第 `block` 个逻辑块
    Data { ino: u32, block: u32 },
}

impl Owner {
    #[inline]
    pub fn is_free(self) -> bool {
        self == Self::Free
    }
}

impl From<Owner> for RawOwner {
    fn from(owner: Owner) -> Self {
        match owner {
            Owner::Free => Self::new(Self::FREE, 0, 0),
            Owner::Prologue => Self::new(Self::PROLOGUE, 0, 0),
            Owner::Imap { group } => Self::new(Self::IMAP, 0, group),
            Owner::Inode { ino } => Self::new(Self::INODE, ino, 0),
            Owner::DoubleIndirect { ino } => Self::new(Self::DOUBLE_INDIRECT, ino, 0),
            Owner::Indirect { ino, index } => Self::new(Self::INDIRECT, ino, index),
            Owner::Data { ino, block } => Self::new(Self::DATA, ino, block),
        }
    }
}

impl TryFrom<RawOwner> for Owner {
    type Error = Error;

    fn try_from(raw: RawOwner) -> Result<Self> {
        let RawOwner {
            kind, ino, index, ..
        } = raw;
        Ok(match kind {
            RawOwner::FREE => Self::Free,
            RawOwner::PROLOGUE => Self::Prologue,
            RawOwner::IMAP => Self::Imap { group: index },
            RawOwner::INODE => Self::Inode { ino },
            RawOwner::DOUBLE_INDIRECT => Self::DoubleIndirect { ino },
            RawOwner::INDIRECT => Self::Indirect { ino, index },
            RawOwner::DATA => Self::Data { ino, block: index },
            _ => {
                log::error!("unknown ownership kind {kind}");
                return Err(Error::Corrupted);
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSummary {
    pub live_bytes: u64,
    pub last_write: TimeSpec,
    owners: Vec<Owner>,
}

impl SegmentSummary {
    fn new(owner: Owner, now: TimeSpec) -> Self {
        let live_bytes = if owner.is_free() { 0 } else { SEGMENT_SIZE as u64 };
        Self {
            live_bytes,
            last_write: now,
            owners: vec![owner; BLOCKS_PER_SEGMENT],
        }
    }

    #[inline]
    pub fn owners(&self) -> &[Owner] {
        &self.owners
    }

    #[inline]
    pub fn is_clean(&self) -> bool {
        self.live_bytes == 0
    }

    /// 存活字节占段大小的比例
    #[inline]
    pub fn utilization(&self) -> f64 {
        self.live_bytes as f64 / SEGMENT_SIZE as f64
    }
}

#[derive(Debug, Clone)]
pub struct SegmentTable {
    geometry: Geometry,
    summaries: Vec<SegmentSummary>,
    /// 存活字节为零的数据段个数
    clean: usize,
    tail: LogOffset,
}

impl SegmentTable {
    /// 全新日志：序言段全部存活，数据段全部空闲
    pub fn new(geometry: Geometry, now: TimeSpec) -> Self {
        let summaries = (0..geometry.segments)
            .map(|seg| {
                let owner = if seg < geometry.prologue {
                    Owner::Prologue
                } else {
                    Owner::Free
                };
                SegmentSummary::new(owner, now)
            })
            .collect();

        Self {
            geometry,
            summaries,
            clean: geometry.data_segments().len(),
            tail: geometry.data_start(),
        }
    }

    /// 从检查点中的段摘要记录恢复
    pub fn from_raw(geometry: Geometry, tail: LogOffset, raws: &[RawSegmentSummary]) -> Result<Self> {
        if raws.len() != geometry.segments {
            return Err(Error::Corrupted);
        }

        let mut summaries = Vec::with_capacity(raws.len());
        for (seg, raw) in raws.iter().enumerate() {
            let owners = raw
                .owners
                .iter()
                .map(|&owner| Owner::try_from(owner))
                .collect::<Result<Vec<_>>>()?;
            let live = owners.iter().filter(|owner| !owner.is_free()).count();
            let in_prologue = seg < geometry.prologue;
            if (live * BLOCK_SIZE) as u64 != raw.live_bytes
                || in_prologue != owners.iter().all(|&owner| owner == Owner::Prologue)
            {
                log::error!("segment {seg}: summary disagrees with its own entries");
                return Err(Error::Corrupted);
            }
            summaries.push(SegmentSummary {
                live_bytes: raw.live_bytes,
                last_write: raw.last_write,
                owners,
            });
        }

        let clean = geometry
            .data_segments()
            .filter(|&seg| summaries[seg].is_clean())
            .count();
        let table = Self {
            geometry,
            summaries,
            clean,
            tail,
        };
        if !geometry.contains(tail) || table.is_live(tail) {
            log::error!("checkpoint tail {tail:?} is not a free data slot");
            return Err(Error::Corrupted);
        }

        Ok(table)
    }

    pub fn to_raw(&self) -> impl Iterator<Item = RawSegmentSummary> + '_ {
        self.summaries.iter().map(|summary| {
            let mut owners = [RawOwner::from(Owner::Free); BLOCKS_PER_SEGMENT];
            for (raw, &owner) in owners.iter_mut().zip(&summary.owners) {
                *raw = owner.into();
            }
            RawSegmentSummary {
                live_bytes: summary.live_bytes,
                last_write: summary.last_write,
                owners,
            }
        })
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    pub fn tail(&self) -> LogOffset {
        self.tail
    }

    #[inline]
    pub fn set_tail(&mut self, tail: LogOffset) {
        debug_assert!(!self.is_live(tail));
        self.tail = tail;
    }

    #[inline]
    pub fn clean_count(&self) -> usize {
        self.clean
    }

    #[inline]
    pub fn summary(&self, segment: usize) -> &SegmentSummary {
        &self.summaries[segment]
    }

    /// 数据段中存活字节的总和
    pub fn live_bytes(&self) -> u64 {
        self.geometry
            .data_segments()
            .map(|seg| self.summaries[seg].live_bytes)
            .sum()
    }

    /// 数据段中空闲槽位的个数
    pub fn free_blocks(&self) -> u64 {
        self.geometry.data_blocks() as u64 - self.live_bytes() / BLOCK_SIZE as u64
    }

    #[inline]
    pub fn owner(&self, offset: LogOffset) -> Owner {
        self.summaries[offset.segment()].owners[offset.slot()]
    }

    #[inline]
    pub fn is_live(&self, offset: LogOffset) -> bool {
        !self.owner(offset).is_free()
    }

    /// 沿日志方向寻找 `from` 之后第一个空闲且不在 `avoid` 段中的槽位
    pub fn next_free(&self, from: LogOffset, avoid: &[usize]) -> Result<LogOffset> {
        let mut offset = from;
        for _ in 0..self.geometry.data_blocks() {
            offset = self.geometry.step(offset);
            if !self.is_live(offset) && !avoid.contains(&offset.segment()) {
                return Ok(offset);
            }
        }
        Err(Error::NoSpace)
    }

    /// 从 `from` 所在段开始（含）环绕查找一个完全空闲的数据段
    pub fn find_clean_segment(&self, from: LogOffset) -> Option<usize> {
        let data = self.geometry.data_segments();
        if data.is_empty() {
            return None;
        }
        let first = from.segment().clamp(data.start, data.end - 1);
        (first..data.end)
            .chain(data.start..first)
            .find(|&seg| self.summaries[seg].is_clean())
    }

    /// 登记一个新写入的块
    pub fn claim(&mut self, offset: LogOffset, owner: Owner, now: TimeSpec) -> Result<()> {
        debug_assert!(!owner.is_free());
        let summary = &mut self.summaries[offset.segment()];
        let slot = &mut summary.owners[offset.slot()];
        if !slot.is_free() {
            log::error!("{offset:?} is already owned by {slot:?}, cannot claim for {owner:?}");
            return Err(Error::Corrupted);
        }

        *slot = owner;
        if summary.live_bytes == 0 {
            self.clean -= 1;
        }
        summary.live_bytes += BLOCK_SIZE as u64;
        summary.last_write = now;
        Ok(())
    }

    /// 释放一个已被取代的块，返回它原来的归属
    pub fn release(&mut self, offset: LogOffset) -> Result<Owner> {
        let summary = &mut self.summaries[offset.segment()];
        let slot = &mut summary.owners[offset.slot()];
        if slot.is_free() || *slot == Owner::Prologue {
            log::error!("releasing {offset:?} which is {slot:?}");
            return Err(Error::Corrupted);
        }

        let owner = core::mem::take(slot);
        summary.live_bytes -= BLOCK_SIZE as u64;
        if summary.live_bytes == 0 {
            self.clean += 1;
        }
        Ok(owner)
    }

    /// 逐槽位比较两张表，返回第一处不一致
    pub fn first_mismatch(&self, other: &Self) -> Option<(LogOffset, Owner, Owner)> {
        self.geometry.data_segments().find_map(|seg| {
            let (ours, theirs) = (&self.summaries[seg], &other.summaries[seg]);
            (0..BLOCKS_PER_SEGMENT).find_map(|slot| {
                let (a, b) = (ours.owners[slot], theirs.owners[slot]);
                (a != b).then(|| (LogOffset::from_parts(seg, slot), a, b))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SegmentTable {
        SegmentTable::new(Geometry { segments: 6, prologue: 2 }, TimeSpec::default())
    }

    #[test]
    fn claim_and_release_track_clean_segments() {
        let mut table = table();
        assert_eq!(table.clean_count(), 4);

        let at = LogOffset::from_parts(3, 5);
        table.claim(at, Owner::Inode { ino: 7 }, TimeSpec::new(9, 0)).unwrap();
        assert_eq!(table.clean_count(), 3);
        assert_eq!(table.summary(3).live_bytes, BLOCK_SIZE as u64);
        assert_eq!(table.summary(3).last_write, TimeSpec::new(9, 0));
        assert_eq!(
            table.claim(at, Owner::Inode { ino: 8 }, TimeSpec::default()),
            Err(Error::Corrupted)
        );

        assert_eq!(table.release(at), Ok(Owner::Inode { ino: 7 }));
        assert_eq!(table.clean_count(), 4);
        assert_eq!(table.release(at), Err(Error::Corrupted));
    }

    #[test]
    fn next_free_skips_live_and_wraps() {
        let mut table = table();
        let last = LogOffset::from_parts(5, BLOCKS_PER_SEGMENT - 1);
        let first = LogOffset::segment_start(2);
        table.claim(first, Owner::Imap { group: 0 }, TimeSpec::default()).unwrap();

        let next = table.next_free(last, &[]).unwrap();
        assert_eq!(next, LogOffset::from_parts(2, 1));

        let avoided = table.next_free(last, &[2]).unwrap();
        assert_eq!(avoided, LogOffset::segment_start(3));
    }

    #[test]
    fn clean_segment_search_wraps() {
        let mut table = table();
        for seg in [4, 5] {
            table
                .claim(LogOffset::segment_start(seg), Owner::Prologue, TimeSpec::default())
                .unwrap();
        }
        assert_eq!(table.find_clean_segment(LogOffset::segment_start(4)), Some(2));
        assert_eq!(table.find_clean_segment(LogOffset::segment_start(3)), Some(3));

        let full = SegmentTable::new(Geometry { segments: 2, prologue: 2 }, TimeSpec::default());
        assert_eq!(full.find_clean_segment(LogOffset::segment_start(0)), None);
    }

    #[test]
    fn raw_owner_keeps_indirect_index() {
        let owner = Owner::Indirect { ino: 3, index: 511 };
        let raw = RawOwner::from(owner);
        assert_eq!(Owner::try_from(raw), Ok(owner));
        assert_eq!(
            Owner::try_from(RawOwner::new(99, 0, 0)),
            Err(Error::Corrupted)
        );
    }
}
