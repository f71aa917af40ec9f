use crate::addr::LogOffset;
use crate::block::Pod;
use crate::{BLOCK_SIZE, MAGIC, SEGMENT_SIZE};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 记录日志尾部与各 imap 页的当前位置；
/// - 每次追加提交时就地重写
#[derive(Debug, Clone)]
#[repr(C)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    pub block_size: u32,
    pub segment_size: u32,
    /// 上次会话是否已正常卸载
    state: u32,
    /// 下一次追加的候选位置
    pub tail: LogOffset,
    pub file_count: u32,
    /// 已分配的最大 inode 编号
    pub max_inumber: u32,
    /// imap 组号 -> imap 页的位置
    pub imaps: [LogOffset; Self::IMAP_SLOTS],
}

unsafe impl Pod for SuperBlock {}

impl SuperBlock {
    const HEADER_SIZE: usize = 32;
    pub const IMAP_SLOTS: usize = (BLOCK_SIZE - Self::HEADER_SIZE) / size_of::<LogOffset>();

    const CLEAN: u32 = 0x00c1_ea2e;
    const MOUNTED: u32 = 0x0000_0b5e;

    #[inline]
    pub fn init(&mut self, tail: LogOffset) {
        self.magic = MAGIC;
        self.block_size = BLOCK_SIZE as u32;
        self.segment_size = SEGMENT_SIZE as u32;
        self.state = Self::MOUNTED;
        self.tail = tail;
        self.file_count = 0;
        self.max_inumber = 0;
        self.imaps.fill(LogOffset::NULL);
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
            && self.block_size as usize == BLOCK_SIZE
            && self.segment_size as usize == SEGMENT_SIZE
            && matches!(self.state, Self::CLEAN | Self::MOUNTED)
    }

    #[inline]
    pub fn is_clean(&self) -> bool {
        self.state == Self::CLEAN
    }

    #[inline]
    pub fn set_clean(&mut self, clean: bool) {
        self.state = if clean { Self::CLEAN } else { Self::MOUNTED };
    }
}
