//! Translates FUSE's inode-addressed callbacks into path-addressed `vfs::FileSystem` calls.
//!
//! The log's root has inumber 0 while FUSE reserves 1 for the root, so every inumber is
//! shifted by one. File names are remembered from `lookup`, `create` and `readdir`.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use enumflags2::BitFlags;
use fuser::{
    FUSE_ROOT_ID, FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};
use lfs::Lfs;
use lfs_fuse::SystemClock;
use vfs::{Access, Clock, DirEntryType, FileSystem, Stat, TimeSpec};

const TTL: Duration = Duration::from_secs(1);

/// Unwraps a `vfs` result or answers the request with its errno.
macro_rules! tri {
    ($reply:ident, $result:expr) => {
        match $result {
            Ok(value) => value,
            Err(err) => {
                log::debug!("{}: {err}", stringify!($result));
                return $reply.error(err.errno());
            }
        }
    };
}

macro_rules! path_of {
    ($self:ident, $reply:ident, $ino:expr) => {
        match $self.path($ino) {
            Some(path) => path,
            None => return $reply.error(libc::ENOENT),
        }
    };
}

pub struct LfsFuse {
    fs: Lfs,
    names: HashMap<u64, String>,
}

impl LfsFuse {
    pub fn new(fs: Lfs) -> Self {
        Self {
            fs,
            names: HashMap::new(),
        }
    }

    fn path(&self, ino: u64) -> Option<String> {
        if ino == FUSE_ROOT_ID {
            Some("/".to_owned())
        } else {
            self.names.get(&ino).map(|name| format!("/{name}"))
        }
    }

    /// Only the root directory has children.
    fn child(parent: u64, name: &OsStr) -> Option<(String, String)> {
        if parent != FUSE_ROOT_ID {
            return None;
        }
        let name = name.to_str()?;
        Some((name.to_owned(), format!("/{name}")))
    }
}

fn fuse_ino(ino: u64) -> u64 {
    ino + 1
}

fn system_time(time: TimeSpec) -> SystemTime {
    match u64::try_from(time.sec) {
        Ok(sec) => UNIX_EPOCH + Duration::new(sec, time.nsec as u32),
        Err(_) => UNIX_EPOCH,
    }
}

fn time_spec(time: SystemTime) -> TimeSpec {
    let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    TimeSpec::new(
        since_epoch.as_secs() as i64,
        since_epoch.subsec_nanos() as i64,
    )
}

fn file_type(ty: DirEntryType) -> FileType {
    match ty {
        DirEntryType::Directory => FileType::Directory,
        DirEntryType::Regular => FileType::RegularFile,
    }
}

fn file_attr(stat: &Stat) -> FileAttr {
    FileAttr {
        ino: fuse_ino(stat.ino),
        size: stat.size,
        blocks: stat.blocks * stat.block_size / 512,
        atime: system_time(stat.atime),
        mtime: system_time(stat.mtime),
        ctime: system_time(stat.ctime),
        crtime: system_time(stat.ctime),
        kind: file_type(stat.kind),
        perm: (stat.mode & 0o7777) as u16,
        nlink: stat.nlink,
        uid: stat.uid,
        gid: stat.gid,
        rdev: 0,
        blksize: stat.block_size as u32,
        flags: 0,
    }
}

impl Filesystem for LfsFuse {
    fn destroy(&mut self) {
        if let Err(err) = self.fs.destroy() {
            log::error!("unmount failed: {err}");
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some((name, path)) = Self::child(parent, name) else {
            return reply.error(libc::ENOENT);
        };
        let stat = tri!(reply, self.fs.getattr(&path));
        self.names.insert(fuse_ino(stat.ino), name);
        reply.entry(&TTL, &file_attr(&stat), 0);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let path = path_of!(self, reply, ino);
        let stat = tri!(reply, self.fs.getattr(&path));
        reply.attr(&TTL, &file_attr(&stat));
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = path_of!(self, reply, ino);
        if let Some(mode) = mode {
            log::debug!("ignoring chmod {mode:o} on {path}");
        }
        if let Some(size) = size {
            tri!(reply, self.fs.truncate(&path, size));
        }
        if atime.is_some() || mtime.is_some() {
            let current = tri!(reply, self.fs.getattr(&path));
            let now = SystemClock.now();
            let pick = |time: Option<TimeOrNow>, old: TimeSpec| match time {
                Some(TimeOrNow::SpecificTime(time)) => time_spec(time),
                Some(TimeOrNow::Now) => now,
                None => old,
            };
            let times = (pick(atime, current.atime), pick(mtime, current.mtime));
            tri!(reply, self.fs.utime(&path, Some(times)));
        }

        let stat = tri!(reply, self.fs.getattr(&path));
        reply.attr(&TTL, &file_attr(&stat));
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some((name, path)) = Self::child(parent, name) else {
            return reply.error(libc::ENOENT);
        };
        tri!(reply, self.fs.unlink(&path));
        self.names.retain(|_, known| *known != name);
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let path = path_of!(self, reply, ino);
        let fh = tri!(reply, self.fs.open(&path));
        reply.opened(fh, 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let mut buf = vec![0; size as usize];
        let len = tri!(reply, self.fs.read(fh, offset as u64, &mut buf));
        reply.data(&buf[..len]);
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let len = tri!(reply, self.fs.write(fh, offset as u64, data));
        reply.written(len as u32);
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        tri!(reply, self.fs.flush(fh));
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        tri!(reply, self.fs.release(fh));
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        tri!(reply, self.fs.fsync(fh, datasync));
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let path = path_of!(self, reply, ino);
        let fh = tri!(reply, self.fs.opendir(&path));
        reply.opened(fh, 0);
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = tri!(reply, self.fs.readdir(fh));
        for (i, entry) in entries.into_iter().enumerate().skip(offset as usize) {
            let ino = fuse_ino(entry.inode);
            let kind = file_type(entry.ty);
            if entry.ty == DirEntryType::Regular {
                self.names.insert(ino, entry.name.clone());
            }
            if reply.add(ino, (i + 1) as i64, kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        tri!(reply, self.fs.releasedir(fh));
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let stat = tri!(reply, self.fs.statfs());
        reply.statfs(
            stat.blocks,
            stat.blocks_free,
            stat.blocks_free,
            stat.files,
            stat.files_free,
            stat.block_size as u32,
            stat.name_max,
            stat.block_size as u32,
        );
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let path = path_of!(self, reply, ino);
        let mask = BitFlags::<Access>::from_bits_truncate(mask as u8);
        tri!(reply, self.fs.access(&path, mask));
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some((name, path)) = Self::child(parent, name) else {
            return reply.error(libc::ENOENT);
        };
        let fh = tri!(reply, self.fs.create(&path, mode & !umask));
        let stat = tri!(reply, self.fs.getattr(&path));
        self.names.insert(fuse_ino(stat.ino), name);
        reply.created(&TTL, &file_attr(&stat), 0, fh, 0);
    }
}
