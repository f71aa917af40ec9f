//! 对块设备的日志视图：按 [`LogOffset`] 读写整块，并校验指针落在数据区内

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;

use crate::addr::{Geometry, LogOffset};
use crate::block::{Block, Pod};
use crate::layout::SuperBlock;
use crate::{BLOCK_SIZE, Error, Result};

pub struct Disk {
    dev: Arc<dyn BlockDevice>,
    geometry: Geometry,
}

impl Disk {
    pub fn new(dev: Arc<dyn BlockDevice>, geometry: Geometry) -> Self {
        Self { dev, geometry }
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn check(&self, offset: LogOffset) -> Result<()> {
        if self.geometry.contains(offset) {
            Ok(())
        } else {
            log::error!("pointer {offset:?} lies outside the data area");
            Err(Error::Corrupted)
        }
    }

    /// 读取位于 `offset` 的块大小结构
    pub fn read<T: Pod>(&self, offset: LogOffset) -> Result<Box<T>> {
        debug_assert_eq!(size_of::<T>(), BLOCK_SIZE);
        let mut value = T::zeroed();
        self.read_into(offset, value.as_bytes_mut())?;
        Ok(value)
    }

    pub fn read_into(&self, offset: LogOffset, buf: &mut [u8]) -> Result<()> {
        self.check(offset)?;
        self.dev.read_block(offset.block_id(), buf)?;
        Ok(())
    }

    pub fn write(&self, offset: LogOffset, block: &Block) -> Result<()> {
        self.check(offset)?;
        self.dev.write_block(offset.block_id(), &block.0)?;
        Ok(())
    }

    pub fn read_super_block(&self) -> Result<Box<SuperBlock>> {
        let mut sb = SuperBlock::zeroed();
        self.dev
            .read_block(LogOffset::SUPER_BLOCK.block_id(), sb.as_bytes_mut())?;
        Ok(sb)
    }

    pub fn write_super_block(&self, sb: &SuperBlock) -> Result<()> {
        self.dev
            .write_block(LogOffset::SUPER_BLOCK.block_id(), sb.as_bytes())?;
        self.dev.flush()?;
        Ok(())
    }

    /// 读取超级块之后的 `len` 字节序言
    pub fn read_prologue(&self, len: usize) -> Result<Vec<u8>> {
        let blocks = len.div_ceil(BLOCK_SIZE);
        let mut bytes = try_zeroed(blocks * BLOCK_SIZE)?;
        for (i, chunk) in bytes.chunks_exact_mut(BLOCK_SIZE).enumerate() {
            self.dev.read_block(1 + i, chunk)?;
        }
        bytes.truncate(len);
        Ok(bytes)
    }

    /// 从超级块之后开始写入序言，最后一块不足的部分补零
    pub fn write_prologue(&self, bytes: &[u8]) -> Result<()> {
        let limit = self.geometry.prologue * crate::BLOCKS_PER_SEGMENT;
        if 1 + bytes.len().div_ceil(BLOCK_SIZE) > limit {
            return Err(Error::NoSpace);
        }
        for (i, chunk) in bytes.chunks(BLOCK_SIZE).enumerate() {
            let block = Block::from_bytes(chunk);
            self.dev.write_block(1 + i, &block.0)?;
        }
        self.dev.flush()?;
        Ok(())
    }
}

/// 申请清零的缓冲区，分配失败时返回 [`Error::OutOfMemory`]
pub fn try_zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::OutOfMemory)?;
    buf.resize(len, 0);
    Ok(buf)
}
