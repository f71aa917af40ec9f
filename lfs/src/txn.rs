//! # 追加事务
//!
//! 写入、截断、删除与清理共用的提交方式：
//!
//! 1. 暂存阶段：每个新块从尾部起依次分配一个空闲槽位，
//!    同时记下被它取代的旧位置
//! 2. 提交阶段：先写出全部新块，再登记新块、释放旧块，
//!    最后就地重写超级块
//!
//! 超级块写成功之前，磁盘上的旧指针图完好无损，
//! 任一步失败都会撤销段摘要表中的改动。

use alloc::boxed::Box;
use alloc::vec::Vec;

use log::{debug, error};
use vfs::TimeSpec;

use crate::addr::LogOffset;
use crate::block::Block;
use crate::fs::Lfs;
use crate::layout::SuperBlock;
use crate::segment::{Owner, SegmentTable};
use crate::{Error, Result};

pub struct StagedBlock {
    pub at: LogOffset,
    pub owner: Owner,
    pub block: Box<Block>,
}

pub struct AppendTxn {
    /// 第一个候选槽位
    start: LogOffset,
    /// 不得分配的段（清理中的段）
    avoid: Vec<usize>,
    last: Option<LogOffset>,
    staged: Vec<StagedBlock>,
    retired: Vec<LogOffset>,
}

impl AppendTxn {
    pub fn new(start: LogOffset) -> Self {
        Self::avoiding(start, Vec::new())
    }

    pub fn avoiding(start: LogOffset, avoid: Vec<usize>) -> Self {
        Self {
            start,
            avoid,
            last: None,
            staged: Vec::new(),
            retired: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// 分配下一个槽位；绕日志一整圈仍找不到时返回 [`Error::NoSpace`]
    fn allocate(&mut self, table: &SegmentTable) -> Result<LogOffset> {
        let geometry = table.geometry();
        let at = match self.last {
            None if !table.is_live(self.start) && !self.avoid.contains(&self.start.segment()) => {
                self.start
            }
            None => table.next_free(self.start, &self.avoid)?,
            Some(prev) => {
                let at = table.next_free(prev, &self.avoid)?;
                if geometry.distance(self.start, at) <= geometry.distance(self.start, prev) {
                    return Err(Error::NoSpace);
                }
                at
            }
        };
        self.last = Some(at);
        Ok(at)
    }

    /// 暂存一个新块，返回它将被写入的位置；`old` 是它取代的块
    pub fn stage(
        &mut self,
        table: &SegmentTable,
        owner: Owner,
        old: Option<LogOffset>,
        block: Box<Block>,
    ) -> Result<LogOffset> {
        let at = self.allocate(table)?;
        self.staged
            .try_reserve(1)
            .map_err(|_| Error::OutOfMemory)?;
        self.staged.push(StagedBlock { at, owner, block });
        if let Some(old) = old {
            self.retire(old)?;
        }
        Ok(at)
    }

    /// 记录一个在提交后不再被引用的块
    pub fn retire(&mut self, old: LogOffset) -> Result<()> {
        debug_assert!(!self.retired.contains(&old), "{old:?} retired twice");
        self.retired
            .try_reserve(1)
            .map_err(|_| Error::OutOfMemory)?;
        self.retired.push(old);
        Ok(())
    }
}

/// 已对段摘要表做出的改动，用于失败时回滚
enum Change {
    Claimed(LogOffset),
    Released(LogOffset, Owner),
}

fn apply(
    table: &mut SegmentTable,
    staged: &[StagedBlock],
    retired: &[LogOffset],
    now: TimeSpec,
    changes: &mut Vec<Change>,
) -> Result<()> {
    for block in staged {
        table.claim(block.at, block.owner, now)?;
        changes.push(Change::Claimed(block.at));
    }
    for &old in retired {
        let owner = table.release(old)?;
        changes.push(Change::Released(old, owner));
    }
    Ok(())
}

fn rollback(table: &mut SegmentTable, changes: Vec<Change>, now: TimeSpec) {
    for change in changes.into_iter().rev() {
        let undone = match change {
            Change::Claimed(at) => table.release(at).map(drop),
            Change::Released(at, owner) => table.claim(at, owner, now),
        };
        if let Err(err) = undone {
            error!("failed to roll back segment summary: {err}");
        }
    }
}

impl Lfs {
    /// 提交一个追加事务；`sb` 是已更新 imap 指针的超级块副本
    pub(crate) fn commit(
        &mut self,
        txn: AppendTxn,
        mut sb: Box<SuperBlock>,
        allow_clean: bool,
    ) -> Result<()> {
        let AppendTxn {
            staged,
            retired,
            last,
            ..
        } = txn;
        if staged.is_empty() && retired.is_empty() {
            return Ok(());
        }

        for block in &staged {
            self.disk.write(block.at, &block.block)?;
        }

        let now = self.clock.now();
        let mut changes = Vec::new();
        changes
            .try_reserve_exact(staged.len() + retired.len())
            .map_err(|_| Error::OutOfMemory)?;
        let committed = apply(&mut self.segments, &staged, &retired, now, &mut changes)
            .and_then(|()| match last {
                Some(last) => self.segments.next_free(last, &[]),
                None => Ok(self.segments.tail()),
            })
            .and_then(|tail| {
                sb.tail = tail;
                sb.set_clean(false);
                self.disk.write_super_block(&sb)
            });
        if let Err(err) = committed {
            rollback(&mut self.segments, changes, now);
            return Err(err);
        }

        self.segments.set_tail(sb.tail);
        self.sb = sb;
        debug!(
            "committed {} blocks, retired {}, tail {:?}, {} clean segments",
            staged.len(),
            retired.len(),
            self.sb.tail,
            self.segments.clean_count()
        );

        if allow_clean && self.segments.clean_count() < self.config.clean_start {
            if let Err(err) = self.clean() {
                error!("cleaning failed: {err}");
            }
        }
        Ok(())
    }
}
