//! 块缓冲与按字节读写的磁盘结构

use alloc::boxed::Box;
use core::mem;
use core::ptr;
use core::slice;

use crate::BLOCK_SIZE;

/// 可以逐字节读写的磁盘结构
///
/// # Safety
///
/// 实现者必须是 `#[repr(C)]`、不含填充之外的非整数字段，
/// 即任意位模式都是合法值。
pub unsafe trait Pod: Sized {
    fn zeroed() -> Box<Self> {
        // SAFETY: 全零是任意 Pod 类型的合法值
        unsafe { Box::new_zeroed().assume_init() }
    }

    fn as_bytes(&self) -> &[u8] {
        // SAFETY: Pod 的每个字节都可读
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), mem::size_of::<Self>()) }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: 写入任意字节后仍是合法值
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), mem::size_of::<Self>()) }
    }

    /// 从字节切片复制出一个值，`bytes` 不足的部分补零
    fn read_from(bytes: &[u8]) -> Box<Self> {
        let mut value = Self::zeroed();
        let len = bytes.len().min(mem::size_of::<Self>());
        value.as_bytes_mut()[..len].copy_from_slice(&bytes[..len]);
        value
    }
}

#[derive(Clone)]
#[repr(C, align(8))]
pub struct Block(pub [u8; BLOCK_SIZE]);

unsafe impl Pod for Block {}

impl Block {
    /// 把一个块大小的结构复制为块
    pub fn from_pod<T: Pod>(value: &T) -> Box<Self> {
        Self::read_from(value.as_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Box<Self> {
        Self::read_from(bytes)
    }
}

impl core::fmt::Debug for Block {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Block").finish_non_exhaustive()
    }
}
