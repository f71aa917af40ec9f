//! # 宿主分发接口
//!
//! 宿主（如 FUSE 适配层）按路径调用文件系统的操作表。
//! 所有方法都取 `&mut self`：同一时刻只允许一个调用进行。

use alloc::vec::Vec;

use enumflags2::{BitFlags, bitflags};

use crate::{DirEntry, Error, Stat, StatFs, TimeSpec};

/// 打开文件或目录后得到的不透明句柄
pub type FileHandle = u64;

/// `access` 检查的权限位，取值同 `R_OK`/`W_OK`/`X_OK`
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Execute = 0b001,
    Write = 0b010,
    Read = 0b100,
}

pub trait FileSystem {
    fn getattr(&mut self, path: &str) -> Result<Stat, Error>;

    /// 按属主权限位检查 `mask`；空掩码只检查存在性
    fn access(&mut self, path: &str, mask: BitFlags<Access>) -> Result<(), Error>;

    /// 创建普通文件并打开
    fn create(&mut self, path: &str, mode: u32) -> Result<FileHandle, Error>;

    /// 设置访问与修改时间，`None` 表示取当前时间
    fn utime(&mut self, path: &str, times: Option<(TimeSpec, TimeSpec)>) -> Result<(), Error>;

    fn truncate(&mut self, path: &str, size: u64) -> Result<(), Error>;

    fn unlink(&mut self, path: &str) -> Result<(), Error>;

    fn open(&mut self, path: &str) -> Result<FileHandle, Error>;

    fn read(&mut self, fh: FileHandle, offset: u64, buf: &mut [u8]) -> Result<usize, Error>;

    fn write(&mut self, fh: FileHandle, offset: u64, data: &[u8]) -> Result<usize, Error>;

    /// 每次写入都已同步落盘
    fn flush(&mut self, _fh: FileHandle) -> Result<(), Error> {
        Ok(())
    }

    fn fsync(&mut self, _fh: FileHandle, _datasync: bool) -> Result<(), Error> {
        Ok(())
    }

    fn release(&mut self, fh: FileHandle) -> Result<(), Error>;

    fn opendir(&mut self, path: &str) -> Result<FileHandle, Error>;

    fn readdir(&mut self, fh: FileHandle) -> Result<Vec<DirEntry>, Error>;

    fn releasedir(&mut self, fh: FileHandle) -> Result<(), Error>;

    fn statfs(&mut self) -> Result<StatFs, Error>;

    /// 卸载：把会话状态写回磁盘
    fn destroy(&mut self) -> Result<(), Error>;
}
