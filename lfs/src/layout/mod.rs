//! # 磁盘数据结构层
//!
//! 除超级块外，所有结构都是写时复制的：修改总是产生新副本并追加到日志尾部。
//!
//! ```text
//! 偏移 0            超级块（唯一就地更新的块）
//! 偏移 BLOCK_SIZE   检查点头 + 每段一条段摘要记录
//! ...               序言的其余部分与一个保留段
//! 数据段            imap、inode、间接块与数据块，按追加顺序排列
//! ```

mod checkpoint;
mod dir_entry;
mod imap;
mod indirect;
mod inode;
mod super_block;

pub use self::{
    checkpoint::{CheckpointHeader, RawOwner, RawSegmentSummary, prologue_segments},
    dir_entry::DirEntry,
    imap::InodeMap,
    indirect::IndirectBlock,
    inode::{DiskInode, S_IFDIR, S_IFREG},
    super_block::SuperBlock,
};
