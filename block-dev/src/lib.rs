//! # 块设备接口层
//!
//! 文件系统只通过 [`BlockDevice`] 与存储打交道：
//! 按块编号读写整块数据，查询与调整容量。
//! 读写不足一块时以错误上报，由上层决定如何处理。

#![no_std]

extern crate alloc;

mod ram;

use core::any::Any;
use core::fmt;

pub use self::ram::RamDisk;

pub trait BlockDevice: Send + Sync + Any {
    /// 块大小（字节）
    fn block_size(&self) -> usize;

    /// 设备当前的块数
    fn num_blocks(&self) -> usize;

    /// 将编号为 `block_id` 的块读入 `buf`，`buf` 长度必须等于块大小
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), Error>;

    /// 将 `buf` 写入编号为 `block_id` 的块
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), Error>;

    /// 把设备扩展（或截断）到 `blocks` 块，新增部分全为零
    fn resize(&self, blocks: usize) -> Result<(), Error>;

    fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 块编号越过设备末尾
    OutOfRange { block_id: usize },
    /// 实际读到的字节不足一块
    ShortRead { block_id: usize, len: usize },
    /// 实际写入的字节不足一块
    ShortWrite { block_id: usize, len: usize },
    /// 底层设备报告的其它错误
    Device,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange { block_id } => write!(f, "block {block_id} is out of range"),
            Self::ShortRead { block_id, len } => {
                write!(f, "short read of block {block_id}: {len} bytes")
            }
            Self::ShortWrite { block_id, len } => {
                write!(f, "short write of block {block_id}: {len} bytes")
            }
            Self::Device => f.write_str("device error"),
        }
    }
}

impl core::error::Error for Error {}
