#![no_std]

extern crate alloc;

/* lfs 的整体架构，自上而下 */

// 文件操作层：按路径的创建、打开、读写、截断、删除，以及打开句柄
mod ops;

// 会话层：挂载（格式化 / 从检查点或日志恢复）、卸载、统计
mod fs;

// 段清理器：按收益成本比挑选段并迁移其中的存活块
mod cleaner;

// 写路径：读-改-写重建数据块与元数据链，暂存后整批追加
mod write;
mod staging;
mod txn;

// 元数据解析：超级块 -> imap -> inode，根目录线性查找
mod meta;

// 块地址翻译：逻辑块号 -> 日志偏移
mod bmap;

// 段摘要表：每个块槽位的归属与每段的存活字节数
mod segment;

// 恢复扫描：从指针图重建段摘要表
mod recovery;

// 磁盘数据结构层
pub mod layout;

// 日志偏移与块缓冲
pub mod addr;
mod block;
mod disk;

pub mod config;
mod error;

pub use self::{
    addr::LogOffset,
    config::Config,
    error::{Error, Result},
    fs::{Lfs, LfsStats},
    segment::Owner,
};

pub const MAGIC: u32 = 0x4c46_5331;

/// 块大小，也是 I/O 与寻址的单位
pub const BLOCK_SIZE: usize = 1 << 12;
/// 段大小，清理的单位
pub const SEGMENT_SIZE: usize = 1 << 20;
pub const BLOCKS_PER_SEGMENT: usize = SEGMENT_SIZE / BLOCK_SIZE;

/// 一个块能容纳的日志偏移数
pub const OFFSETS_PER_BLOCK: usize = BLOCK_SIZE / core::mem::size_of::<LogOffset>();
/// inode 中直接索引的个数
pub const DIRECT_COUNT: usize = 10;
/// 单个文件最多的块数：直接索引 + 二级间接索引
pub const MAX_BLOCK_COUNT: usize = DIRECT_COUNT + OFFSETS_PER_BLOCK * OFFSETS_PER_BLOCK;
pub const MAX_FILE_SIZE: u64 = (BLOCK_SIZE * MAX_BLOCK_COUNT) as u64;

/// 一页 imap 管理的 inode 数
pub const IMAP_ENTRIES: usize = OFFSETS_PER_BLOCK;
/// 超级块中 imap 指针的个数
pub const IMAP_GROUPS: usize = layout::SuperBlock::IMAP_SLOTS;
pub const MAX_INUMBER: u32 = (IMAP_GROUPS * IMAP_ENTRIES) as u32;

/// 文件名的最大长度（不含结尾的 NUL）
pub const NAME_MAX_LEN: usize = layout::DirEntry::NAME_CAP - 1;

pub const ROOT_INUMBER: u32 = 0;
