//! # 段清理器
//!
//! 干净段少于启动阈值时由写路径同步调用，反复执行清理，
//! 直到干净段数达到停止阈值。
//!
//! 每一轮：
//! 1. 按收益成本比 `(1 - u) * age / (1 + u)` 降序挑选一批段
//! 2. 把这批段中每个存活块对应的结构标记为需要重写，
//!    数据块则读出后重新暂存
//! 3. 以一个干净段为起点整批追加，提交后旧位置全部释放，源段随之变干净
//!
//! 每一轮独立提交，中途失败只放弃当前这一轮。

use alloc::vec::Vec;

use log::{debug, error, info, warn};
use vfs::TimeSpec;

use crate::addr::LogOffset;
use crate::fs::Lfs;
use crate::segment::{Owner, SegmentSummary, SegmentTable};
use crate::staging::Staging;
use crate::txn::AppendTxn;
use crate::{Error, Result};

/// 段的收益成本比，越大越值得清理
pub fn cost_benefit(summary: &SegmentSummary, now: TimeSpec) -> f64 {
    let utilization = summary.utilization();
    let age = (now.as_secs_f64() - summary.last_write.as_secs_f64()).max(0.0);
    (1.0 - utilization) * age / (1.0 + utilization)
}

/// 挑选至多 `count` 个待清理的段；干净段不参与排序
pub fn select_victims(table: &SegmentTable, now: TimeSpec, count: usize) -> Vec<usize> {
    let mut candidates: Vec<(usize, f64)> = table
        .geometry()
        .data_segments()
        .filter(|&seg| !table.summary(seg).is_clean())
        .map(|seg| (seg, cost_benefit(table.summary(seg), now)))
        .collect();

    // 比值相同时先清理存活字节少的段
    candidates.sort_by(|(a, ra), (b, rb)| {
        rb.total_cmp(ra)
            .then_with(|| table.summary(*a).live_bytes.cmp(&table.summary(*b).live_bytes))
    });

    candidates
        .into_iter()
        .take(count)
        .map(|(seg, _)| seg)
        .collect()
}

impl Staging<'_> {
    /// 标记 `owner` 所指的元数据结构需要重写，并确认它当前确实位于 `at`
    fn touch(&mut self, owner: Owner, at: LogOffset) -> Result<()> {
        let current = match owner {
            Owner::Imap { group } => {
                let imap = self.imap(group as usize)?;
                imap.dirty = true;
                imap.old
            }
            Owner::Inode { ino } => {
                let file = self.file(ino)?;
                file.dirty = true;
                file.old
            }
            Owner::DoubleIndirect { ino } => {
                let double = self.double(ino)?;
                double.dirty = true;
                double.old
            }
            Owner::Indirect { ino, index } => {
                let page = self.indirect(ino, index as usize)?;
                page.dirty = true;
                page.old
            }
            Owner::Free | Owner::Prologue | Owner::Data { .. } => return Ok(()),
        };

        if current != Some(at) {
            error!("{at:?} is recorded as {owner:?}, but its owner points to {current:?}");
            return Err(Error::Corrupted);
        }
        Ok(())
    }

    /// 把位于 `at` 的数据块迁移到新位置
    fn relocate(&mut self, ino: u32, block: u32, at: LogOffset) -> Result<()> {
        let current = self.block_location(ino, block)?;
        if current != at {
            error!("{at:?} is recorded as block {block} of inode {ino}, which lives at {current:?}");
            return Err(Error::Corrupted);
        }
        let payload = self.disk().read(at)?;
        self.stage_data(ino, block, Some(at), payload)?;
        Ok(())
    }
}

impl Lfs {
    pub(crate) fn clean(&mut self) -> Result<()> {
        let initial = self.segments.clean_count();
        info!(
            "cleaning: {initial} clean segments, target {}",
            self.config.clean_stop
        );

        while self.segments.clean_count() < self.config.clean_stop {
            let before = self.segments.clean_count();
            let victims = select_victims(
                &self.segments,
                self.clock.now(),
                self.config.segments_per_clean,
            );
            if victims.is_empty() {
                break;
            }

            self.clean_pass(&victims)?;
            self.cleaning_passes += 1;

            if self.segments.clean_count() <= before {
                warn!(
                    "cleaning pass over {} segments freed nothing, giving up at {} clean segments",
                    victims.len(),
                    self.segments.clean_count()
                );
                break;
            }
        }

        info!(
            "cleaning finished: {initial} -> {} clean segments",
            self.segments.clean_count()
        );
        Ok(())
    }

    fn clean_pass(&mut self, victims: &[usize]) -> Result<()> {
        let start = self
            .segments
            .find_clean_segment(self.segments.tail())
            .ok_or(Error::NoSpace)?;
        let txn = AppendTxn::avoiding(LogOffset::segment_start(start), victims.to_vec());
        let mut staging = Staging::new(self, txn);

        let mut moves = Vec::new();
        for &seg in victims {
            for (slot, &owner) in self.segments.summary(seg).owners().iter().enumerate() {
                let at = LogOffset::from_parts(seg, slot);
                match owner {
                    Owner::Data { ino, block } => moves.push((ino, block, at)),
                    owner => staging.touch(owner, at)?,
                }
            }
        }

        // 数据块先于它们的间接块、inode 与 imap 暂存
        for (ino, block, at) in moves {
            staging.relocate(ino, block, at)?;
        }

        let (txn, sb) = staging.seal()?;
        debug!(
            "cleaning pass over {victims:?}: relocating {} blocks into segment {start}",
            txn.len()
        );
        self.commit(txn, sb, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::Geometry;
    use crate::{BLOCK_SIZE, BLOCKS_PER_SEGMENT};

    fn fill(table: &mut SegmentTable, seg: usize, blocks: usize, at: TimeSpec) {
        for slot in 0..blocks {
            table
                .claim(
                    LogOffset::from_parts(seg, slot),
                    Owner::Inode { ino: slot as u32 },
                    at,
                )
                .unwrap();
        }
    }

    #[test]
    fn prefers_cold_and_empty_segments() {
        let geometry = Geometry { segments: 8, prologue: 2 };
        let mut table = SegmentTable::new(geometry, TimeSpec::default());
        // 段 2：冷且几乎为空；段 3：热；段 4：冷但很满；段 5：干净
        fill(&mut table, 2, 10, TimeSpec::new(0, 0));
        fill(&mut table, 3, 10, TimeSpec::new(90, 0));
        fill(&mut table, 4, BLOCKS_PER_SEGMENT - 1, TimeSpec::new(0, 0));

        let now = TimeSpec::new(100, 0);
        assert!(cost_benefit(table.summary(2), now) > cost_benefit(table.summary(3), now));
        assert!(cost_benefit(table.summary(2), now) > cost_benefit(table.summary(4), now));
        assert_eq!(cost_benefit(table.summary(5), now), 100.0);

        assert_eq!(select_victims(&table, now, 2), [2, 3]);
        assert_eq!(select_victims(&table, now, 10), [2, 3, 4]);
    }

    #[test]
    fn ties_prefer_fewer_live_bytes() {
        let geometry = Geometry { segments: 6, prologue: 2 };
        let mut table = SegmentTable::new(geometry, TimeSpec::default());
        fill(&mut table, 2, 30, TimeSpec::default());
        fill(&mut table, 3, 3, TimeSpec::default());
        assert_eq!(table.summary(3).live_bytes, 3 * BLOCK_SIZE as u64);

        assert_eq!(select_victims(&table, TimeSpec::default(), 1), [3]);
    }
}
