#[cfg(test)]
mod tests;

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use block_dev::{BlockDevice, Error};
use lfs::BLOCK_SIZE;
use vfs::{Clock, TimeSpec};

/// A log image backed by a host file.
pub struct BlockFile(pub Mutex<File>);

impl BlockFile {
    /// Opens (or creates) the image at `path`. An empty image is formatted on mount.
    pub fn open(path: impl AsRef<Path>, truncate: bool) -> io::Result<Arc<Self>> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(truncate)
            .open(path)?;
        Ok(Arc::new(Self(Mutex::new(fd))))
    }

    fn file(&self) -> MutexGuard<'_, File> {
        // A panic while holding the lock leaves the file itself intact.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn seek(file: &mut File, block_id: usize) -> Result<(), Error> {
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .map(drop)
            .map_err(|err| {
                log::error!("seeking to block {block_id}: {err}");
                Error::Device
            })
    }
}

impl BlockDevice for BlockFile {
    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    fn num_blocks(&self) -> usize {
        match self.file().metadata() {
            Ok(meta) => meta.len() as usize / BLOCK_SIZE,
            Err(err) => {
                log::error!("reading image metadata: {err}");
                0
            }
        }
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), Error> {
        let mut file = self.file();
        Self::seek(&mut file, block_id)?;
        let mut len = 0;
        while len < buf.len() {
            match file.read(&mut buf[len..]) {
                Ok(0) => break,
                Ok(n) => len += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    log::error!("reading block {block_id}: {err}");
                    return Err(Error::Device);
                }
            }
        }
        if len != BLOCK_SIZE || buf.len() != BLOCK_SIZE {
            return Err(Error::ShortRead { block_id, len });
        }
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), Error> {
        if buf.len() != BLOCK_SIZE {
            return Err(Error::ShortWrite {
                block_id,
                len: buf.len(),
            });
        }
        let mut file = self.file();
        Self::seek(&mut file, block_id)?;
        file.write_all(buf).map_err(|err| {
            log::error!("writing block {block_id}: {err}");
            Error::Device
        })
    }

    fn resize(&self, blocks: usize) -> Result<(), Error> {
        self.file()
            .set_len((blocks * BLOCK_SIZE) as u64)
            .map_err(|err| {
                log::error!("resizing image to {blocks} blocks: {err}");
                Error::Device
            })
    }

    fn flush(&self) -> Result<(), Error> {
        self.file().sync_data().map_err(|err| {
            log::error!("syncing image: {err}");
            Error::Device
        })
    }
}

/// Wall-clock time of the host.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeSpec {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        TimeSpec::new(
            since_epoch.as_secs() as i64,
            since_epoch.subsec_nanos() as i64,
        )
    }
}

/// Maps an `lfs` mount error onto an `io::Error` for the host binaries.
pub fn io_error(err: lfs::Error) -> io::Error {
    let errno = vfs::Error::from(err).errno();
    io::Error::new(
        io::Error::from_raw_os_error(errno).kind(),
        err.to_string(),
    )
}
