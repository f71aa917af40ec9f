use crate::block::Pod;

/// 根目录中的一项：文件名与 inode 编号
#[derive(Debug, Clone)]
#[repr(C)]
pub struct DirEntry {
    // 最后一字节留给 \0
    name: [u8; Self::NAME_CAP],
    inode_id: u32,
}

unsafe impl Pod for DirEntry {}

impl DirEntry {
    /// 目录项大小恒为256字节
    pub const SIZE: usize = 256;
    pub const NAME_CAP: usize = Self::SIZE - size_of::<u32>();

    /// `name` 的长度必须不超过 [`crate::NAME_MAX_LEN`]
    #[inline]
    pub fn new(name: &str, inode_id: u32) -> Self {
        let bytes = name.as_bytes();
        let mut buf = [0; Self::NAME_CAP];
        buf[..bytes.len()].copy_from_slice(bytes);

        Self {
            name: buf,
            inode_id,
        }
    }

    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(Self::NAME_CAP);
        &self.name[..len]
    }

    /// 文件名不是合法 UTF-8 时返回 `None`
    pub fn name(&self) -> Option<&str> {
        core::str::from_utf8(self.name_bytes()).ok()
    }

    #[inline]
    pub fn inode_id(&self) -> u32 {
        self.inode_id
    }
}
