//! 磁盘上的 inode
//!
//! 每个 inode 独占一个块，块的剩余部分保留为零。
//! 文件的块数总是 `ceil(size / BLOCK_SIZE)`，超出块数的指针视为无效。

use vfs::{DirEntryType, Stat, TimeSpec};

use crate::addr::LogOffset;
use crate::block::Pod;
use crate::{BLOCK_SIZE, DIRECT_COUNT};

/// 目录类型位
pub const S_IFDIR: u32 = 0o040000;
/// 普通文件类型位
pub const S_IFREG: u32 = 0o100000;
const S_IFMT: u32 = 0o170000;

const FIELDS_SIZE: usize = 176;

#[derive(Debug, Clone)]
#[repr(C)]
pub struct DiskInode {
    pub ino: u32,
    /// 类型位与权限位
    pub mode: u32,
    /// 硬链接个数
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    _pad: u32,
    pub size: u64,
    /// 已分配的数据块数
    pub blocks: u64,
    pub atime: TimeSpec,
    pub mtime: TimeSpec,
    pub ctime: TimeSpec,
    /// 直接索引，存储容量：DIRECT_COUNT * BLOCK_SIZE 字节
    pub direct: [LogOffset; DIRECT_COUNT],
    /// 指向二级间接块
    pub double_indirect: LogOffset,
    _reserved: [u8; BLOCK_SIZE - FIELDS_SIZE],
}

unsafe impl Pod for DiskInode {}

impl DiskInode {
    pub fn init(&mut self, ino: u32, mode: u32, uid: u32, gid: u32, now: TimeSpec) {
        self.ino = ino;
        self.mode = mode;
        self.nlink = if mode & S_IFMT == S_IFDIR { 2 } else { 1 };
        self.uid = uid;
        self.gid = gid;
        self.size = 0;
        self.blocks = 0;
        self.atime = now;
        self.mtime = now;
        self.ctime = now;
        self.direct.fill(LogOffset::NULL);
        self.double_indirect = LogOffset::NULL;
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    /// 逻辑块数，与 `blocks` 字段相同
    #[inline]
    pub fn block_count(&self) -> u32 {
        self.blocks as u32
    }

    /// 属主是否拥有 `mask` 中的全部权限（`mask` 取 rwx 三位）
    #[inline]
    pub fn owner_allows(&self, mask: u32) -> bool {
        let owner = (self.mode >> 6) & 0o7;
        owner & mask == mask
    }

    pub fn stat(&self) -> Stat {
        Stat {
            ino: self.ino as u64,
            kind: if self.is_dir() {
                DirEntryType::Directory
            } else {
                DirEntryType::Regular
            },
            mode: self.mode,
            nlink: self.nlink,
            uid: self.uid,
            gid: self.gid,
            size: self.size,
            blocks: self.blocks,
            block_size: BLOCK_SIZE as u64,
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
        }
    }
}
