//! 检查点：卸载时写入序言，挂载时读回
//!
//! 序言从偏移 `BLOCK_SIZE` 开始连续存放一个 [`CheckpointHeader`]
//! 与每段一条 [`RawSegmentSummary`]。

use vfs::TimeSpec;

use crate::addr::LogOffset;
use crate::block::Pod;
use crate::{BLOCK_SIZE, BLOCKS_PER_SEGMENT, MAGIC, SEGMENT_SIZE};

#[derive(Debug, Clone)]
#[repr(C)]
pub struct CheckpointHeader {
    magic: u32,
    pub segment_count: u32,
    pub tail: LogOffset,
    pub file_count: u32,
    pub max_inumber: u32,
    pub clean_segments: u32,
    _pad: u32,
}

unsafe impl Pod for CheckpointHeader {}

impl CheckpointHeader {
    pub fn new(
        segment_count: u32,
        tail: LogOffset,
        file_count: u32,
        max_inumber: u32,
        clean_segments: u32,
    ) -> Self {
        Self {
            magic: MAGIC,
            segment_count,
            tail,
            file_count,
            max_inumber,
            clean_segments,
            _pad: 0,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }
}

/// 段摘要中一个槽位的归属，磁盘编码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct RawOwner {
    pub kind: u32,
    pub ino: u32,
    pub index: u32,
    _reserved: u32,
}

unsafe impl Pod for RawOwner {}

impl RawOwner {
    pub const FREE: u32 = 0;
    pub const PROLOGUE: u32 = 1;
    pub const IMAP: u32 = 2;
    pub const INODE: u32 = 3;
    pub const DOUBLE_INDIRECT: u32 = 4;
    pub const INDIRECT: u32 = 5;
    pub const DATA: u32 = 6;

    pub const fn new(kind: u32, ino: u32, index: u32) -> Self {
        Self {
            kind,
            ino,
            index,
            _reserved: 0,
        }
    }
}

#[derive(Debug, Clone)]
#[repr(C)]
pub struct RawSegmentSummary {
    pub live_bytes: u64,
    pub last_write: TimeSpec,
    pub owners: [RawOwner; BLOCKS_PER_SEGMENT],
}

unsafe impl Pod for RawSegmentSummary {}

/// 序言占用的段数：超级块、检查点与全部段摘要，外加一个保留段
pub fn prologue_segments(segments: usize) -> usize {
    let bytes = BLOCK_SIZE
        + size_of::<CheckpointHeader>()
        + segments * size_of::<RawSegmentSummary>();
    bytes.div_ceil(SEGMENT_SIZE) + 1
}
