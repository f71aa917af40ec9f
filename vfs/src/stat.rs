use crate::{DirEntryType, TimeSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Inode number
    pub ino: u64,
    pub kind: DirEntryType,
    /// 类型位与权限位，同 `st_mode`
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    /// File size
    pub size: u64,
    /// Occupying blocks
    pub blocks: u64,
    /// Optimal I/O block size
    pub block_size: u64,
    pub atime: TimeSpec,
    pub mtime: TimeSpec,
    pub ctime: TimeSpec,
}

/// 整个文件系统的统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub block_size: u64,
    pub blocks: u64,
    pub blocks_free: u64,
    pub files: u64,
    pub files_free: u64,
    pub name_max: u32,
}
