mod common;

use std::sync::Arc;

use block_dev::{BlockDevice, RamDisk};
use lfs::{BLOCK_SIZE, Config, Error, Lfs};
use vfs::FileSystem;

use common::*;

#[test]
fn unclean_shutdown_rebuilds_summaries() {
    let fixture = Fixture::new(small_config());
    let mut fs = fixture.mount();

    let data = pattern(70_000, 9);
    write_file(&mut fs, "/a", 0, &data);
    write_file(&mut fs, "/b", 0, b"bee");
    fs.unlink("/b").unwrap();
    write_file(&mut fs, "/c", 0, b"sea");
    let before = fs.stats();
    drop(fs);

    let mut fs = fixture.mount();
    let after = fs.stats();
    assert_eq!(after.live_bytes, before.live_bytes);
    assert_eq!(after.clean_segments, before.clean_segments);
    assert_eq!(after.file_count, before.file_count);
    assert_eq!(after.max_inumber, 3);
    assert_eq!(read_file(&mut fs, "/a"), data);
    assert_eq!(read_file(&mut fs, "/c"), b"sea");
    assert_eq!(names(&mut fs), [".", "..", "a", "c"]);
    fs.verify().unwrap();

    // 恢复后的日志照常可写
    write_file(&mut fs, "/d", 0, b"dee");
    assert_eq!(fs.getattr("/d").unwrap().ino, 4);
    fs.verify().unwrap();
}

#[test]
fn unclean_shutdown_after_cleaning() {
    let fixture = Fixture::new(small_config());
    let mut fs = fixture.mount();

    let mut hot = pattern(1500 * BLOCK_SIZE, 11);
    write_file(&mut fs, "/hot", 0, &hot);
    random_overwrites(&mut fs, "/hot", &mut hot, 1000, 4);
    let before = fs.stats();
    assert!(before.cleaning_passes > 0);
    drop(fs);

    let mut fs = fixture.mount();
    let after = fs.stats();
    assert_eq!(after.live_bytes, before.live_bytes);
    assert_eq!(after.clean_segments, before.clean_segments);
    assert_eq!(read_file(&mut fs, "/hot"), hot);
    fs.verify().unwrap();

    random_overwrites(&mut fs, "/hot", &mut hot, 300, 5);
    assert_eq!(read_file(&mut fs, "/hot"), hot);
    fs.verify().unwrap();
}

#[test]
fn failed_commit_leaves_previous_state() {
    let fixture = Fixture::new(small_config());
    let faulty = Arc::new(FaultyDisk::new(fixture.disk.clone()));
    let mut fs = fixture.mount_on(faulty.clone());

    let v1 = pattern(30_000, 1);
    let v2 = pattern(30_000, 2);
    write_file(&mut fs, "/f", 0, &v1);
    let before = fs.stats();

    // 一次覆盖写暂存 8 个数据块、inode 与 imap，共 10 块，之后才写超级块。
    // 依次模拟：新块一块未写、写到一半、全部写完但超级块写失败
    for writes in [0, 3, 10] {
        faulty.fail_after(writes);
        let fh = fs.open("/f").unwrap();
        assert_eq!(fs.write(fh, 0, &v2), Err(vfs::Error::Io));
        fs.release(fh).unwrap();
        faulty.disarm();

        assert_eq!(fs.stats(), before);
        assert_eq!(read_file(&mut fs, "/f"), v1);
        fs.verify().unwrap();
    }

    drop(fs);

    let mut fs = fixture.mount();
    assert_eq!(read_file(&mut fs, "/f"), v1);
    assert_eq!(fs.live_bytes(), before.live_bytes);
    fs.verify().unwrap();

    write_file(&mut fs, "/f", 0, &v2);
    assert_eq!(read_file(&mut fs, "/f"), v2);
    fs.verify().unwrap();
}

#[test]
fn damaged_checkpoint_falls_back_to_scan() {
    let fixture = Fixture::new(small_config());
    let mut fs = fixture.mount();

    let data = pattern(40_000, 4);
    write_file(&mut fs, "/x", 0, &data);
    let before = fs.stats();
    fs.unmount().unwrap();

    // 抹掉检查点头
    fixture.disk.write_block(1, &[0; BLOCK_SIZE]).unwrap();

    let mut fs = fixture.mount();
    assert_eq!(fs.stats().live_bytes, before.live_bytes);
    assert_eq!(read_file(&mut fs, "/x"), data);
    fs.verify().unwrap();
}

#[test]
fn destroy_then_write_is_not_trusted_as_clean() {
    let fixture = Fixture::new(small_config());
    let mut fs = fixture.mount();

    write_file(&mut fs, "/x", 0, b"one");
    fs.destroy().unwrap();
    write_file(&mut fs, "/x", 0, b"two");
    drop(fs);

    let mut fs = fixture.mount();
    assert_eq!(read_file(&mut fs, "/x"), b"two");
    fs.verify().unwrap();
}

#[test]
fn rejects_foreign_devices() {
    init_logger();
    let clock = ManualClock::new();

    let blank: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(BLOCK_SIZE, 16 * 256));
    assert_eq!(
        Lfs::mount(blank, clock.clone(), small_config()).err(),
        Some(Error::Corrupted)
    );

    let sectors: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(512, 0));
    assert_eq!(
        Lfs::mount(sectors, clock.clone(), small_config()).err(),
        Some(Error::InvalidArgument)
    );

    let tiny = Config {
        log_size: 4 << 20,
        ..small_config()
    };
    let empty: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(BLOCK_SIZE, 0));
    assert_eq!(
        Lfs::mount(empty, clock, tiny).err(),
        Some(Error::InvalidArgument)
    );
}
