use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    AlreadyExists,
    NotFound,
    FileTooLarge,
    NoSpace,
    NameTooLong,
    InvalidArgument,
    BadHandle,
    PermissionDenied,
    /// 读写失败、元数据损坏等无法细分的错误
    Io,
}

impl Error {
    /// 对应的 POSIX 错误码
    pub fn errno(self) -> i32 {
        match self {
            Self::AlreadyExists => 17,    // EEXIST
            Self::NotFound => 2,          // ENOENT
            Self::FileTooLarge => 27,     // EFBIG
            Self::NoSpace => 28,          // ENOSPC
            Self::NameTooLong => 36,      // ENAMETOOLONG
            Self::InvalidArgument => 22,  // EINVAL
            Self::BadHandle => 9,         // EBADF
            Self::PermissionDenied => 13, // EACCES
            Self::Io => 5,                // EIO
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::AlreadyExists => "file exists",
            Self::NotFound => "no such file",
            Self::FileTooLarge => "file too large",
            Self::NoSpace => "no space left on log",
            Self::NameTooLong => "file name too long",
            Self::InvalidArgument => "invalid argument",
            Self::BadHandle => "bad file handle",
            Self::PermissionDenied => "permission denied",
            Self::Io => "input/output error",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}
