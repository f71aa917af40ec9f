#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use block_dev::{BlockDevice, RamDisk};
use lfs::{BLOCK_SIZE, Config, Lfs};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vfs::{Clock, FileSystem, TimeSpec};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 每读一次前进一秒的时钟
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(1_700_000_000)))
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimeSpec {
        TimeSpec::new(self.0.fetch_add(1, Ordering::SeqCst), 0)
    }
}

/// 允许若干次写入后开始报错的设备，用来模拟提交中途的崩溃
pub struct FaultyDisk {
    inner: Arc<RamDisk>,
    armed: AtomicBool,
    writes_left: AtomicUsize,
}

impl FaultyDisk {
    pub fn new(inner: Arc<RamDisk>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            writes_left: AtomicUsize::new(0),
        }
    }

    /// 再成功写入 `writes` 块后，之后的写入全部失败
    pub fn fail_after(&self, writes: usize) {
        self.writes_left.store(writes, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

impl BlockDevice for FaultyDisk {
    fn block_size(&self) -> usize {
        self.inner.block_size()
    }

    fn num_blocks(&self) -> usize {
        self.inner.num_blocks()
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), block_dev::Error> {
        self.inner.read_block(block_id, buf)
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), block_dev::Error> {
        if self.armed.load(Ordering::SeqCst) {
            let left = self.writes_left.load(Ordering::SeqCst);
            if left == 0 {
                return Err(block_dev::Error::Device);
            }
            self.writes_left.store(left - 1, Ordering::SeqCst);
        }
        self.inner.write_block(block_id, buf)
    }

    fn resize(&self, blocks: usize) -> Result<(), block_dev::Error> {
        self.inner.resize(blocks)
    }
}

/// 16 段的小日志，清理阈值按比例缩小
pub fn small_config() -> Config {
    Config {
        log_size: 16 << 20,
        clean_start: 3,
        clean_stop: 6,
        segments_per_clean: 4,
        uid: 1000,
        gid: 1000,
    }
}

pub struct Fixture {
    pub disk: Arc<RamDisk>,
    pub clock: Arc<ManualClock>,
    pub config: Config,
}

impl Fixture {
    pub fn new(config: Config) -> Self {
        init_logger();
        Self {
            disk: Arc::new(RamDisk::new(BLOCK_SIZE, 0)),
            clock: ManualClock::new(),
            config,
        }
    }

    pub fn mount(&self) -> Lfs {
        let dev: Arc<dyn BlockDevice> = self.disk.clone();
        Lfs::mount(dev, self.clock.clone(), self.config).unwrap()
    }

    pub fn mount_on(&self, dev: Arc<dyn BlockDevice>) -> Lfs {
        Lfs::mount(dev, self.clock.clone(), self.config).unwrap()
    }
}

pub fn write_file(fs: &mut Lfs, path: &str, offset: u64, data: &[u8]) {
    let fh = match fs.open(path) {
        Ok(fh) => fh,
        Err(vfs::Error::NotFound) => fs.create(path, 0o644).unwrap(),
        Err(err) => panic!("open {path}: {err}"),
    };
    assert_eq!(fs.write(fh, offset, data).unwrap(), data.len());
    fs.release(fh).unwrap();
}

pub fn read_file(fs: &mut Lfs, path: &str) -> Vec<u8> {
    let size = fs.getattr(path).unwrap().size as usize;
    let fh = fs.open(path).unwrap();
    let mut buf = vec![0; size];
    assert_eq!(fs.read(fh, 0, &mut buf).unwrap(), size);
    fs.release(fh).unwrap();
    buf
}

pub fn names(fs: &mut Lfs) -> Vec<String> {
    let fh = fs.opendir("/").unwrap();
    let entries = fs.readdir(fh).unwrap();
    fs.releasedir(fh).unwrap();
    entries.into_iter().map(|entry| entry.name).collect()
}

/// 可辨认的测试内容
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// 对 `path` 做 `rounds` 次随机的单块覆盖写，`expected` 同步记录文件内容。
///
/// 每当一次写入触发了清理，清理结束时干净段数必须已回到停止阈值。
pub fn random_overwrites(fs: &mut Lfs, path: &str, expected: &mut [u8], rounds: usize, seed: u64) {
    let clean_stop = fs.config().clean_stop;
    let blocks = expected.len() / BLOCK_SIZE;
    let mut rng = StdRng::seed_from_u64(seed);

    let fh = fs.open(path).unwrap();
    for round in 0..rounds {
        let offset = rng.gen_range(0..blocks) * BLOCK_SIZE;
        let data = pattern(BLOCK_SIZE, rng.r#gen());
        let passes = fs.stats().cleaning_passes;

        assert_eq!(fs.write(fh, offset as u64, &data).unwrap(), BLOCK_SIZE);
        expected[offset..offset + BLOCK_SIZE].copy_from_slice(&data);

        if fs.stats().cleaning_passes > passes {
            assert!(
                fs.clean_segments() >= clean_stop,
                "round {round}: cleaning stopped at {} clean segments",
                fs.clean_segments()
            );
        }
    }
    fs.release(fh).unwrap();
}
