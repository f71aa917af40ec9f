//! # 会话层
//!
//! - 挂载：空设备先格式化；否则校验超级块，正常卸载过的日志从检查点载入段摘要表，
//!   否则从指针图重建。之后把超级块标记为“已挂载”。
//! - 卸载：把段摘要表写入序言作为检查点，再把超级块标记为“已卸载”。

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use log::{error, info, warn};
use vfs::{Clock, FileHandle, StatFs, TimeSpec};

use crate::addr::{Geometry, LogOffset};
use crate::block::Pod;
use crate::config::Config;
use crate::disk::Disk;
use crate::layout::{CheckpointHeader, DirEntry, DiskInode, RawSegmentSummary, S_IFDIR, SuperBlock};
use crate::ops::OpenFile;
use crate::recovery::{self, Rebuilt};
use crate::segment::SegmentTable;
use crate::staging::Staging;
use crate::txn::AppendTxn;
use crate::write::Source;
use crate::{
    BLOCK_SIZE, BLOCKS_PER_SEGMENT, Error, MAX_INUMBER, NAME_MAX_LEN, ROOT_INUMBER, Result,
};

/// 挂载中的日志结构文件系统
pub struct Lfs {
    pub(crate) disk: Disk,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: Config,
    pub(crate) sb: Box<SuperBlock>,
    pub(crate) segments: SegmentTable,
    pub(crate) handles: BTreeMap<FileHandle, OpenFile>,
    pub(crate) next_handle: FileHandle,
    pub(crate) cleaning_passes: u64,
}

/// 日志的运行统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LfsStats {
    pub segments: usize,
    pub prologue_segments: usize,
    pub clean_segments: usize,
    pub tail: LogOffset,
    /// 数据段中存活的字节数
    pub live_bytes: u64,
    pub file_count: u32,
    pub max_inumber: u32,
    /// 本次挂载以来执行的清理轮数
    pub cleaning_passes: u64,
}

impl Lfs {
    pub fn mount(dev: Arc<dyn BlockDevice>, clock: Arc<dyn Clock>, config: Config) -> Result<Self> {
        config.validate()?;
        if dev.block_size() != BLOCK_SIZE {
            error!(
                "device block size {} differs from {BLOCK_SIZE}",
                dev.block_size()
            );
            return Err(Error::InvalidArgument);
        }
        if dev.num_blocks() == 0 {
            return Self::format(dev, clock, config);
        }

        let geometry = Geometry::new(dev.num_blocks() / BLOCKS_PER_SEGMENT);
        config.check_geometry(&geometry)?;
        let disk = Disk::new(dev, geometry);

        let mut sb = disk.read_super_block()?;
        if !sb.is_valid() {
            error!("device does not hold a log-structured file system");
            return Err(Error::Corrupted);
        }

        let now = clock.now();
        let segments = if sb.is_clean() {
            match load_checkpoint(&disk, &sb) {
                Ok(table) => table,
                Err(err) => {
                    warn!("checkpoint unusable ({err}), scanning the log");
                    recover(&disk, &mut sb, now)?
                }
            }
        } else {
            warn!("log was not unmounted cleanly, scanning the log");
            recover(&disk, &mut sb, now)?
        };

        sb.set_clean(false);
        disk.write_super_block(&sb)?;

        let fs = Self {
            disk,
            clock,
            config,
            sb,
            segments,
            handles: BTreeMap::new(),
            next_handle: 0,
            cleaning_passes: 0,
        };
        info!(
            "mounted {} segment log: {} files, {} clean segments, tail {:?}",
            geometry.segments,
            fs.sb.file_count,
            fs.segments.clean_count(),
            fs.sb.tail
        );
        Ok(fs)
    }

    /// 建立空日志与只含 `.` 和 `..` 的根目录
    fn format(dev: Arc<dyn BlockDevice>, clock: Arc<dyn Clock>, config: Config) -> Result<Self> {
        let geometry = Geometry::new(config.segments());
        config.check_geometry(&geometry)?;
        dev.resize(geometry.segments * BLOCKS_PER_SEGMENT)?;

        let disk = Disk::new(dev, geometry);
        let now = clock.now();
        let mut sb = SuperBlock::zeroed();
        sb.init(geometry.data_start());
        disk.write_super_block(&sb)?;

        let mut fs = Self {
            disk,
            clock,
            config,
            sb,
            segments: SegmentTable::new(geometry, now),
            handles: BTreeMap::new(),
            next_handle: 0,
            cleaning_passes: 0,
        };

        let mut staging = Staging::new(&fs, AppendTxn::new(fs.segments.tail()));
        let mut root = DiskInode::zeroed();
        root.init(
            ROOT_INUMBER,
            S_IFDIR | 0o755,
            fs.config.uid,
            fs.config.gid,
            now,
        );
        staging.insert_file(root);

        let mut entries = Vec::with_capacity(2 * DirEntry::SIZE);
        entries.extend_from_slice(DirEntry::new(".", ROOT_INUMBER).as_bytes());
        entries.extend_from_slice(DirEntry::new("..", ROOT_INUMBER).as_bytes());
        staging.write(ROOT_INUMBER, 0, Source::Bytes(&entries))?;
        staging.sb.file_count = 1;

        let (txn, sb) = staging.seal()?;
        fs.commit(txn, sb, false)?;
        fs.write_checkpoint()?;

        info!(
            "formatted {} MiB log: {} segments, {} in the prologue",
            geometry.log_size() >> 20,
            geometry.segments,
            geometry.prologue
        );
        Ok(fs)
    }

    /// 写检查点并把超级块标记为已卸载
    pub fn unmount(mut self) -> Result<()> {
        self.checkpoint()
    }

    pub(crate) fn checkpoint(&mut self) -> Result<()> {
        self.handles.clear();
        self.write_checkpoint()?;
        self.sb.set_clean(true);
        self.disk.write_super_block(&self.sb)?;
        info!(
            "unmounted: {} files, {} clean segments",
            self.sb.file_count,
            self.segments.clean_count()
        );
        Ok(())
    }

    fn write_checkpoint(&self) -> Result<()> {
        let geometry = self.segments.geometry();
        let header = CheckpointHeader::new(
            geometry.segments as u32,
            self.segments.tail(),
            self.sb.file_count,
            self.sb.max_inumber,
            self.segments.clean_count() as u32,
        );

        let len = checkpoint_len(geometry.segments);
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| Error::OutOfMemory)?;
        bytes.extend_from_slice(header.as_bytes());
        for raw in self.segments.to_raw() {
            bytes.extend_from_slice(raw.as_bytes());
        }
        self.disk.write_prologue(&bytes)
    }

    pub fn stats(&self) -> LfsStats {
        let geometry = self.segments.geometry();
        LfsStats {
            segments: geometry.segments,
            prologue_segments: geometry.prologue,
            clean_segments: self.segments.clean_count(),
            tail: self.segments.tail(),
            live_bytes: self.segments.live_bytes(),
            file_count: self.sb.file_count,
            max_inumber: self.sb.max_inumber,
            cleaning_passes: self.cleaning_passes,
        }
    }

    #[inline]
    pub fn clean_segments(&self) -> usize {
        self.segments.clean_count()
    }

    #[inline]
    pub fn live_bytes(&self) -> u64 {
        self.segments.live_bytes()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn stat_fs(&self) -> StatFs {
        let geometry = self.segments.geometry();
        StatFs {
            block_size: BLOCK_SIZE as u64,
            blocks: (geometry.segments * BLOCKS_PER_SEGMENT) as u64,
            blocks_free: self.segments.free_blocks(),
            files: self.sb.file_count as u64,
            files_free: (MAX_INUMBER - 1 - self.sb.max_inumber) as u64,
            name_max: NAME_MAX_LEN as u32,
        }
    }

    pub(crate) fn now(&self) -> TimeSpec {
        self.clock.now()
    }
}

fn checkpoint_len(segments: usize) -> usize {
    size_of::<CheckpointHeader>() + segments * size_of::<RawSegmentSummary>()
}

/// 载入检查点；与超级块不符的检查点视为过期
fn load_checkpoint(disk: &Disk, sb: &SuperBlock) -> Result<SegmentTable> {
    let geometry = *disk.geometry();
    let bytes = disk.read_prologue(checkpoint_len(geometry.segments))?;
    let (head, body) = bytes.split_at(size_of::<CheckpointHeader>());

    let header = CheckpointHeader::read_from(head);
    if !header.is_valid()
        || header.segment_count as usize != geometry.segments
        || header.tail != sb.tail
        || header.file_count != sb.file_count
        || header.max_inumber != sb.max_inumber
    {
        error!("checkpoint header {header:?} does not match the superblock");
        return Err(Error::Corrupted);
    }

    let mut raws = Vec::new();
    raws.try_reserve_exact(geometry.segments)
        .map_err(|_| Error::OutOfMemory)?;
    for chunk in body.chunks_exact(size_of::<RawSegmentSummary>()) {
        raws.push(*RawSegmentSummary::read_from(chunk));
    }

    let table = SegmentTable::from_raw(geometry, header.tail, &raws)?;
    if table.clean_count() != header.clean_segments as usize {
        error!(
            "checkpoint records {} clean segments, summaries hold {}",
            header.clean_segments,
            table.clean_count()
        );
        return Err(Error::Corrupted);
    }
    Ok(table)
}

/// 从指针图重建段摘要表，并据此修正超级块中的计数
fn recover(disk: &Disk, sb: &mut SuperBlock, now: TimeSpec) -> Result<SegmentTable> {
    let Rebuilt {
        table,
        files,
        max_inumber,
    } = recovery::rebuild(disk, sb, now)?;

    if sb.file_count != files {
        warn!(
            "superblock counts {} files, the log holds {files}",
            sb.file_count
        );
        sb.file_count = files;
    }
    sb.max_inumber = sb.max_inumber.max(max_inumber);
    sb.tail = table.tail();

    info!(
        "recovered {files} files, {} live bytes in {} segments",
        table.live_bytes(),
        table.geometry().segments
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SEGMENT_SIZE;

    #[test]
    fn checkpoint_fits_in_prologue() {
        for segments in [16, 64, 1024, 4096] {
            let geometry = Geometry::new(segments);
            let limit = geometry.prologue * SEGMENT_SIZE;
            assert!(BLOCK_SIZE + checkpoint_len(segments) <= limit);
        }
    }
}
