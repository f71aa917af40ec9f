//! 内存块设备

use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::{BlockDevice, Error};

#[derive(Debug)]
pub struct RamDisk {
    block_size: usize,
    data: Mutex<Vec<u8>>,
}

impl RamDisk {
    pub fn new(block_size: usize, blocks: usize) -> Self {
        Self {
            block_size,
            data: Mutex::new(vec![0; block_size * blocks]),
        }
    }

    fn range(&self, block_id: usize, len: usize) -> Result<core::ops::Range<usize>, Error> {
        let start = block_id * self.block_size;
        if start + self.block_size > len {
            return Err(Error::OutOfRange { block_id });
        }
        Ok(start..start + self.block_size)
    }
}

impl BlockDevice for RamDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn num_blocks(&self) -> usize {
        self.data.lock().len() / self.block_size
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), Error> {
        let data = self.data.lock();
        let range = self.range(block_id, data.len())?;
        if buf.len() != self.block_size {
            return Err(Error::ShortRead {
                block_id,
                len: buf.len().min(self.block_size),
            });
        }
        buf.copy_from_slice(&data[range]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), Error> {
        let mut data = self.data.lock();
        let range = self.range(block_id, data.len())?;
        if buf.len() != self.block_size {
            return Err(Error::ShortWrite {
                block_id,
                len: buf.len().min(self.block_size),
            });
        }
        data[range].copy_from_slice(buf);
        Ok(())
    }

    fn resize(&self, blocks: usize) -> Result<(), Error> {
        self.data.lock().resize(blocks * self.block_size, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_back() {
        let disk = RamDisk::new(16, 4);
        disk.write_block(2, &[7; 16]).unwrap();
        let mut buf = [0; 16];
        disk.read_block(2, &mut buf).unwrap();
        assert_eq!(buf, [7; 16]);
        assert_eq!(
            disk.read_block(4, &mut buf),
            Err(Error::OutOfRange { block_id: 4 })
        );
    }

    #[test]
    fn resize_zero_fills() {
        let disk = RamDisk::new(16, 0);
        assert_eq!(disk.num_blocks(), 0);
        disk.resize(3).unwrap();
        let mut buf = [1; 16];
        disk.read_block(2, &mut buf).unwrap();
        assert_eq!(buf, [0; 16]);
    }
}
