use crate::OFFSETS_PER_BLOCK;
use crate::addr::LogOffset;
use crate::block::Pod;

/// 间接索引块
/// - 二级：每个偏移都指向一个一级间接块
/// - 一级：每个偏移都指向一个数据块
#[derive(Debug, Clone)]
#[repr(C)]
pub struct IndirectBlock {
    pub entries: [LogOffset; OFFSETS_PER_BLOCK],
}

unsafe impl Pod for IndirectBlock {}
