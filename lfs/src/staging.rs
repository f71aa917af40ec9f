//! 暂存区：一次操作内被改动的元数据链
//!
//! 写入、截断、删除与清理都在这里读-改元数据：
//! imap 页、inode、二级与一级间接块各自在首次访问时载入并缓存，
//! 同一操作内绝不重复载入。[`Staging::seal`] 按
//! 间接块 -> 二级间接块 -> inode -> imap 的顺序把脏结构暂存进追加事务，
//! 每一层都先拿到下一层的新位置再序列化。

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use vfs::TimeSpec;

use crate::addr::{BlockIndex, LogOffset, first_block_of_indirect};
use crate::block::{Block, Pod};
use crate::disk::Disk;
use crate::fs::Lfs;
use crate::layout::{DiskInode, IndirectBlock, InodeMap, SuperBlock};
use crate::meta;
use crate::segment::{Owner, SegmentTable};
use crate::txn::AppendTxn;
use crate::{DIRECT_COUNT, Error, Result};

pub struct ImapSlot {
    pub old: Option<LogOffset>,
    pub map: Box<InodeMap>,
    pub dirty: bool,
}

pub struct PageSlot {
    pub old: Option<LogOffset>,
    pub page: Box<IndirectBlock>,
    pub dirty: bool,
}

impl PageSlot {
    fn fresh() -> Self {
        Self {
            old: None,
            page: IndirectBlock::zeroed(),
            dirty: false,
        }
    }

    fn load(disk: &Disk, at: LogOffset) -> Result<Self> {
        Ok(Self {
            old: Some(at),
            page: disk.read(at)?,
            dirty: false,
        })
    }
}

pub struct FileSlot {
    /// inode 在本次操作前的位置，新建的文件为 `None`
    pub old: Option<LogOffset>,
    pub inode: Box<DiskInode>,
    pub dirty: bool,
    /// 磁盘上已有指针结构覆盖的块数：载入时等于块数，释放块后随之减少，
    /// 本次操作新增的块只存在于缓存中
    mapped: u32,
    double: Option<PageSlot>,
    indirect: BTreeMap<usize, PageSlot>,
}

impl FileSlot {
    fn loaded(old: Option<LogOffset>, inode: Box<DiskInode>, dirty: bool) -> Self {
        Self {
            old,
            mapped: inode.block_count(),
            inode,
            dirty,
            double: None,
            indirect: BTreeMap::new(),
        }
    }
}

/// 载入二级间接块；`mapped` 个块都在直接索引内时得到全零的新页
fn load_double(disk: &Disk, inode: &DiskInode, mapped: u32) -> Result<PageSlot> {
    if mapped as usize <= DIRECT_COUNT {
        return Ok(PageSlot::fresh());
    }
    if inode.double_indirect.is_null() {
        log::error!("inode {} has {mapped} blocks but no double indirect block", inode.ino);
        return Err(Error::Corrupted);
    }
    PageSlot::load(disk, inode.double_indirect)
}

pub struct Staging<'a> {
    disk: &'a Disk,
    segments: &'a SegmentTable,
    pub now: TimeSpec,
    pub sb: Box<SuperBlock>,
    pub txn: AppendTxn,
    imaps: BTreeMap<usize, ImapSlot>,
    files: BTreeMap<u32, FileSlot>,
}

impl<'a> Staging<'a> {
    pub fn new(fs: &'a Lfs, txn: AppendTxn) -> Self {
        Self {
            disk: &fs.disk,
            segments: &fs.segments,
            now: fs.clock.now(),
            sb: fs.sb.clone(),
            txn,
            imaps: BTreeMap::new(),
            files: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn disk(&self) -> &'a Disk {
        self.disk
    }

    pub fn imap(&mut self, group: usize) -> Result<&mut ImapSlot> {
        if !self.imaps.contains_key(&group) {
            let slot = match meta::read_imap(self.disk, &self.sb, group)? {
                Some((at, map)) => ImapSlot {
                    old: Some(at),
                    map,
                    dirty: false,
                },
                None => ImapSlot {
                    old: None,
                    map: InodeMap::zeroed(),
                    dirty: false,
                },
            };
            self.imaps.insert(group, slot);
        }
        self.imaps.get_mut(&group).ok_or(Error::NotFound)
    }

    pub fn file(&mut self, ino: u32) -> Result<&mut FileSlot> {
        if !self.files.contains_key(&ino) {
            let at = self.imap(InodeMap::group_of(ino))?.map.get(ino);
            if at.is_null() {
                return Err(Error::NotFound);
            }
            let inode = meta::read_inode_at(self.disk, at, ino)?;
            self.files.insert(ino, FileSlot::loaded(Some(at), inode, false));
        }
        self.files.get_mut(&ino).ok_or(Error::NotFound)
    }

    /// 加入一个新建的 inode
    pub fn insert_file(&mut self, inode: Box<DiskInode>) {
        self.files.insert(inode.ino, FileSlot::loaded(None, inode, true));
    }

    /// 从 imap 中摘除文件并释放 inode 块，调用前需已释放其数据与间接块
    pub fn forget_file(&mut self, ino: u32) -> Result<()> {
        let old = self.file(ino)?.old;
        self.files.remove(&ino);
        if let Some(old) = old {
            self.txn.retire(old)?;
        }
        let imap = self.imap(InodeMap::group_of(ino))?;
        imap.map.set(ino, LogOffset::NULL);
        imap.dirty = true;
        Ok(())
    }

    pub fn double(&mut self, ino: u32) -> Result<&mut PageSlot> {
        let disk = self.disk;
        let file = self.file(ino)?;
        let slot = match file.double.take() {
            Some(slot) => slot,
            None => load_double(disk, &file.inode, file.mapped)?,
        };
        Ok(file.double.insert(slot))
    }

    /// 第 `outer` 个一级间接块；尚未分配时得到全零的新页
    pub fn indirect(&mut self, ino: u32, outer: usize) -> Result<&mut PageSlot> {
        let disk = self.disk;
        let cached = self.file(ino)?.indirect.contains_key(&outer);
        if !cached {
            let allocated = first_block_of_indirect(outer) < self.file(ino)?.mapped;
            let slot = if allocated {
                let at = self.double(ino)?.page.entries[outer];
                if at.is_null() {
                    log::error!("inode {ino}: indirect block {outer} is missing");
                    return Err(Error::Corrupted);
                }
                PageSlot::load(disk, at)?
            } else {
                PageSlot::fresh()
            };
            self.file(ino)?.indirect.insert(outer, slot);
        }
        self.file(ino)?
            .indirect
            .get_mut(&outer)
            .ok_or(Error::NotFound)
    }

    /// 丢弃缓存中的一级间接块，返回它在本次操作前的位置
    pub fn drop_indirect(&mut self, ino: u32, outer: usize) -> Result<Option<LogOffset>> {
        let old = self.indirect(ino, outer)?.old;
        self.file(ino)?.indirect.remove(&outer);
        Ok(old)
    }

    /// 丢弃二级间接块并清空 inode 中的指针，返回它在本次操作前的位置
    pub fn drop_double(&mut self, ino: u32) -> Result<Option<LogOffset>> {
        let old = self.double(ino)?.old;
        let file = self.file(ino)?;
        file.double = None;
        file.inode.double_indirect = LogOffset::NULL;
        file.dirty = true;
        Ok(old)
    }

    /// 块 `keep` 及之后的块已被释放
    pub fn unmap_from(&mut self, ino: u32, keep: u32) -> Result<()> {
        let file = self.file(ino)?;
        file.mapped = file.mapped.min(keep);
        Ok(())
    }

    /// 第 `block` 个逻辑块当前所在的位置
    pub fn block_location(&mut self, ino: u32, block: u32) -> Result<LogOffset> {
        let at = match BlockIndex::of(block) {
            BlockIndex::Direct(i) => self.file(ino)?.inode.direct[i],
            BlockIndex::Indirect { outer, inner } => self.indirect(ino, outer)?.page.entries[inner],
        };
        if at.is_null() {
            log::error!("inode {ino}: block {block} has no location");
            return Err(Error::Corrupted);
        }
        Ok(at)
    }

    pub fn set_block_location(&mut self, ino: u32, block: u32, at: LogOffset) -> Result<()> {
        match BlockIndex::of(block) {
            BlockIndex::Direct(i) => {
                let file = self.file(ino)?;
                file.inode.direct[i] = at;
                file.dirty = true;
            }
            BlockIndex::Indirect { outer, inner } => {
                let page = self.indirect(ino, outer)?;
                page.page.entries[inner] = at;
                page.dirty = true;
            }
        }
        Ok(())
    }

    /// 暂存一个数据块并让文件指向它
    pub fn stage_data(
        &mut self,
        ino: u32,
        block: u32,
        old: Option<LogOffset>,
        payload: Box<Block>,
    ) -> Result<LogOffset> {
        let at = self
            .txn
            .stage(self.segments, Owner::Data { ino, block }, old, payload)?;
        self.set_block_location(ino, block, at)?;
        Ok(at)
    }

    /// 把所有脏结构暂存进事务，返回事务与更新后的超级块
    pub fn seal(mut self) -> Result<(AppendTxn, Box<SuperBlock>)> {
        let files = core::mem::take(&mut self.files);
        let mut relocated = Vec::new();

        for (ino, mut file) in files {
            for (outer, page) in file.indirect {
                if !page.dirty {
                    continue;
                }
                let at = self.txn.stage(
                    self.segments,
                    Owner::Indirect {
                        ino,
                        index: outer as u32,
                    },
                    page.old,
                    Block::from_pod(&*page.page),
                )?;
                let mut double = match file.double.take() {
                    Some(double) => double,
                    None => load_double(self.disk, &file.inode, file.mapped)?,
                };
                double.page.entries[outer] = at;
                double.dirty = true;
                file.double = Some(double);
            }

            if let Some(double) = file.double.filter(|double| double.dirty) {
                let at = self.txn.stage(
                    self.segments,
                    Owner::DoubleIndirect { ino },
                    double.old,
                    Block::from_pod(&*double.page),
                )?;
                file.inode.double_indirect = at;
                file.dirty = true;
            }

            if file.dirty {
                let at = self.txn.stage(
                    self.segments,
                    Owner::Inode { ino },
                    file.old,
                    Block::from_pod(&*file.inode),
                )?;
                relocated.push((ino, at));
            }
        }

        for (ino, at) in relocated {
            let imap = self.imap(InodeMap::group_of(ino))?;
            imap.map.set(ino, at);
            imap.dirty = true;
        }

        let imaps = core::mem::take(&mut self.imaps);
        for (group, imap) in imaps {
            if !imap.dirty {
                continue;
            }
            let at = self.txn.stage(
                self.segments,
                Owner::Imap {
                    group: group as u32,
                },
                imap.old,
                Block::from_pod(&*imap.map),
            )?;
            self.sb.imaps[group] = at;
        }

        Ok((self.txn, self.sb))
    }
}
