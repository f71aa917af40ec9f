use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 暂存缓冲区分配失败
    OutOfMemory,
    /// 读到的字节不足一块
    ShortRead,
    ShortWrite,
    /// 区间读取时第 n 个逻辑块读取失败
    ShortBlock(u32),
    /// 逻辑块号超出文件当前的块数
    BlockOutOfRange(u32),
    /// 日志中已没有可用的槽位
    NoSpace,
    NotFound,
    AlreadyExists,
    NameTooLong,
    InvalidArgument,
    FileTooLarge,
    /// inode 编号耗尽
    TooManyFiles,
    BadHandle,
    PermissionDenied,
    /// 磁盘上的结构互相矛盾
    Corrupted,
    Device,
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

impl From<block_dev::Error> for Error {
    fn from(err: block_dev::Error) -> Self {
        match err {
            block_dev::Error::ShortRead { .. } => Self::ShortRead,
            block_dev::Error::ShortWrite { .. } => Self::ShortWrite,
            block_dev::Error::OutOfRange { .. } => Self::Corrupted,
            block_dev::Error::Device => Self::Device,
        }
    }
}

impl From<Error> for vfs::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound => Self::NotFound,
            Error::AlreadyExists => Self::AlreadyExists,
            Error::NameTooLong => Self::NameTooLong,
            Error::InvalidArgument => Self::InvalidArgument,
            Error::FileTooLarge => Self::FileTooLarge,
            Error::NoSpace | Error::TooManyFiles => Self::NoSpace,
            Error::BadHandle => Self::BadHandle,
            Error::PermissionDenied => Self::PermissionDenied,
            Error::OutOfMemory
            | Error::ShortRead
            | Error::ShortWrite
            | Error::ShortBlock(_)
            | Error::BlockOutOfRange(_)
            | Error::Corrupted
            | Error::Device => Self::Io,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => f.write_str("out of memory"),
            Self::ShortRead => f.write_str("short read"),
            Self::ShortWrite => f.write_str("short write"),
            Self::ShortBlock(block) => write!(f, "short read at block {block}"),
            Self::BlockOutOfRange(block) => write!(f, "block {block} out of range"),
            Self::NoSpace => f.write_str("log is full"),
            Self::NotFound => f.write_str("not found"),
            Self::AlreadyExists => f.write_str("already exists"),
            Self::NameTooLong => f.write_str("name too long"),
            Self::InvalidArgument => f.write_str("invalid argument"),
            Self::FileTooLarge => f.write_str("file too large"),
            Self::TooManyFiles => f.write_str("inode numbers exhausted"),
            Self::BadHandle => f.write_str("bad file handle"),
            Self::PermissionDenied => f.write_str("permission denied"),
            Self::Corrupted => f.write_str("on-disk structures are corrupted"),
            Self::Device => f.write_str("device error"),
        }
    }
}

impl core::error::Error for Error {}
