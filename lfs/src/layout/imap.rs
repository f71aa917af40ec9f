use crate::IMAP_ENTRIES;
use crate::addr::LogOffset;
use crate::block::Pod;

/// inode 映射页：一组 inode 的当前位置
#[derive(Debug, Clone)]
#[repr(C)]
pub struct InodeMap {
    pub inodes: [LogOffset; IMAP_ENTRIES],
}

unsafe impl Pod for InodeMap {}

impl InodeMap {
    /// inode 编号所属的组，即 imap 页在超级块中的下标
    #[inline]
    pub fn group_of(ino: u32) -> usize {
        ino as usize / IMAP_ENTRIES
    }

    /// inode 编号在其 imap 页中的下标
    #[inline]
    pub fn index_of(ino: u32) -> usize {
        ino as usize % IMAP_ENTRIES
    }

    #[inline]
    pub fn get(&self, ino: u32) -> LogOffset {
        self.inodes[Self::index_of(ino)]
    }

    #[inline]
    pub fn set(&mut self, ino: u32, offset: LogOffset) {
        self.inodes[Self::index_of(ino)] = offset;
    }
}
