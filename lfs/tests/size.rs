use std::mem;

use lfs::layout::{
    CheckpointHeader, DirEntry, DiskInode, IndirectBlock, InodeMap, RawOwner, RawSegmentSummary,
    SuperBlock,
};

#[test]
fn layout() {
    assert_eq!(4096, mem::size_of::<SuperBlock>());
    assert_eq!(4096, mem::size_of::<InodeMap>());
    assert_eq!(4096, mem::size_of::<IndirectBlock>());
    assert_eq!(4096, mem::size_of::<DiskInode>());
    assert_eq!(256, mem::size_of::<DirEntry>());
    assert_eq!(32, mem::size_of::<CheckpointHeader>());
    assert_eq!(16, mem::size_of::<RawOwner>());
    assert_eq!(4120, mem::size_of::<RawSegmentSummary>());
}

#[test]
fn limits() {
    assert_eq!(lfs::BLOCKS_PER_SEGMENT, 256);
    assert_eq!(lfs::OFFSETS_PER_BLOCK, 512);
    assert_eq!(lfs::MAX_BLOCK_COUNT, 10 + 512 * 512);
    assert_eq!(lfs::IMAP_GROUPS, 508);
    assert_eq!(lfs::NAME_MAX_LEN, 251);
}
