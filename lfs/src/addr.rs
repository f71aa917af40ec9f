//! # 日志寻址
//!
//! 日志被划分为段，段又划分为块。
//! 所有“字节偏移”的算术都集中在这里：
//!
//! - [`LogOffset`]：日志中某个块的起始字节偏移，可分解为 (段号, 段内槽位)
//! - [`BlockIndex`]：文件逻辑块号落在直接索引还是二级间接索引中
//!
//! 偏移 0 是超级块，其它结构不可能位于此处，因此 0 同时充当空指针。

use derive_more::{From, Into};

use crate::{BLOCK_SIZE, BLOCKS_PER_SEGMENT, DIRECT_COUNT, OFFSETS_PER_BLOCK, SEGMENT_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, From, Into)]
#[repr(transparent)]
pub struct LogOffset(u64);

impl LogOffset {
    pub const NULL: Self = Self(0);
    pub const SUPER_BLOCK: Self = Self(0);

    pub const fn from_parts(segment: usize, slot: usize) -> Self {
        Self((segment * SEGMENT_SIZE + slot * BLOCK_SIZE) as u64)
    }

    /// 第 `segment` 段的起点
    pub const fn segment_start(segment: usize) -> Self {
        Self::from_parts(segment, 0)
    }

    pub const fn from_block_id(block_id: usize) -> Self {
        Self((block_id * BLOCK_SIZE) as u64)
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    #[inline]
    pub fn segment(self) -> usize {
        self.0 as usize / SEGMENT_SIZE
    }

    /// 段内槽位
    #[inline]
    pub fn slot(self) -> usize {
        (self.0 as usize % SEGMENT_SIZE) / BLOCK_SIZE
    }

    /// 作为块设备的块编号
    #[inline]
    pub fn block_id(self) -> usize {
        self.0 as usize / BLOCK_SIZE
    }

    #[inline]
    pub fn is_aligned(self) -> bool {
        self.0 as usize % BLOCK_SIZE == 0
    }

    /// 紧随其后的块，不做回绕
    #[inline]
    pub fn next_block(self) -> Self {
        Self(self.0 + BLOCK_SIZE as u64)
    }
}

/// 文件逻辑块号的寻址方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockIndex {
    /// 直接索引中的下标
    Direct(usize),
    /// 二级间接：`outer` 是二级间接块中的下标，`inner` 是一级间接块中的下标
    Indirect { outer: usize, inner: usize },
}

impl BlockIndex {
    pub fn of(block: u32) -> Self {
        let block = block as usize;
        if block < DIRECT_COUNT {
            Self::Direct(block)
        } else {
            let rest = block - DIRECT_COUNT;
            Self::Indirect {
                outer: rest / OFFSETS_PER_BLOCK,
                inner: rest % OFFSETS_PER_BLOCK,
            }
        }
    }
}

/// 逻辑块所在的一级间接块下标，直接索引的块返回 `None`
#[inline]
pub fn indirect_of(block: u32) -> Option<usize> {
    match BlockIndex::of(block) {
        BlockIndex::Direct(_) => None,
        BlockIndex::Indirect { outer, .. } => Some(outer),
    }
}

/// 第 `outer` 个一级间接块所管理的第一个逻辑块号
#[inline]
pub fn first_block_of_indirect(outer: usize) -> u32 {
    (DIRECT_COUNT + outer * OFFSETS_PER_BLOCK) as u32
}

/// 容纳 `size` 字节所需的块数
#[inline]
pub fn blocks_for(size: u64) -> u32 {
    size.div_ceil(BLOCK_SIZE as u64) as u32
}

/// 字节偏移所在的逻辑块号
#[inline]
pub fn block_of(offset: u64) -> u32 {
    (offset / BLOCK_SIZE as u64) as u32
}

/// 逻辑块的起始字节偏移
#[inline]
pub fn block_start(block: u32) -> u64 {
    block as u64 * BLOCK_SIZE as u64
}

/// 日志的几何形状：段数与序言段数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub segments: usize,
    /// 序言占用的段数，数据段从这里开始
    pub prologue: usize,
}

impl Geometry {
    pub fn new(segments: usize) -> Self {
        Self {
            segments,
            prologue: crate::layout::prologue_segments(segments),
        }
    }

    pub fn data_start(&self) -> LogOffset {
        LogOffset::segment_start(self.prologue)
    }

    pub fn log_size(&self) -> u64 {
        (self.segments * SEGMENT_SIZE) as u64
    }

    pub fn data_segments(&self) -> core::ops::Range<usize> {
        self.prologue..self.segments
    }

    pub fn data_blocks(&self) -> usize {
        self.data_segments().len() * BLOCKS_PER_SEGMENT
    }

    /// 指针是否落在数据区内且按块对齐
    pub fn contains(&self, offset: LogOffset) -> bool {
        offset.is_aligned() && offset >= self.data_start() && u64::from(offset) < self.log_size()
    }

    /// 环形日志中的下一个块：到达末尾后回绕到第一个数据段
    pub fn step(&self, offset: LogOffset) -> LogOffset {
        let next = offset.next_block();
        if u64::from(next) >= self.log_size() {
            self.data_start()
        } else {
            next
        }
    }

    /// 从 `from` 顺着日志方向走到 `to` 需要的块数
    pub fn distance(&self, from: LogOffset, to: LogOffset) -> usize {
        let (from, to) = (self.linear(from), self.linear(to));
        if to >= from {
            to - from
        } else {
            self.data_blocks() - from + to
        }
    }

    fn linear(&self, offset: LogOffset) -> usize {
        offset.block_id() - self.data_start().block_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompose() {
        let off = LogOffset::from_parts(3, 17);
        assert_eq!(off.segment(), 3);
        assert_eq!(off.slot(), 17);
        assert_eq!(off.block_id(), 3 * BLOCKS_PER_SEGMENT + 17);
        assert!(off.is_aligned());
        assert!(!LogOffset::from(5u64).is_aligned());
    }

    #[test]
    fn direct_indirect_boundary() {
        assert_eq!(BlockIndex::of(9), BlockIndex::Direct(9));
        assert_eq!(BlockIndex::of(10), BlockIndex::Indirect { outer: 0, inner: 0 });
        assert_eq!(
            BlockIndex::of(10 + 512 + 3),
            BlockIndex::Indirect { outer: 1, inner: 3 }
        );
        assert_eq!(first_block_of_indirect(1), 10 + 512);
    }

    #[test]
    fn step_wraps_past_prologue() {
        let geo = Geometry { segments: 8, prologue: 2 };
        let last = LogOffset::from_parts(7, BLOCKS_PER_SEGMENT - 1);
        assert_eq!(geo.step(last), LogOffset::segment_start(2));
        assert_eq!(geo.distance(last, geo.data_start()), 1);
        assert_eq!(geo.distance(geo.data_start(), last), geo.data_blocks() - 1);
    }

    #[test]
    fn block_counts() {
        assert_eq!(blocks_for(0), 0);
        assert_eq!(blocks_for(1), 1);
        assert_eq!(blocks_for(BLOCK_SIZE as u64), 1);
        assert_eq!(blocks_for(BLOCK_SIZE as u64 + 1), 2);
        assert_eq!(block_of(BLOCK_SIZE as u64 * 10), 10);
    }
}
