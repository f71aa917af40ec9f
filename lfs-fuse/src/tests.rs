use std::path::PathBuf;
use std::sync::Arc;

use block_dev::BlockDevice;
use lfs::{Config, Lfs};
use vfs::FileSystem;

use super::*;

fn image(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("lfs-fuse-{}-{name}.img", std::process::id()))
}

fn config() -> Config {
    Config {
        log_size: 16 << 20,
        clean_start: 3,
        clean_stop: 6,
        segments_per_clean: 4,
        ..Config::default()
    }
}

#[test]
fn block_file_round_trip() {
    let path = image("blocks");
    let file = BlockFile::open(&path, true).unwrap();
    assert_eq!(file.num_blocks(), 0);

    file.resize(4).unwrap();
    assert_eq!(file.num_blocks(), 4);
    file.write_block(2, &[0x5a; BLOCK_SIZE]).unwrap();
    file.flush().unwrap();

    let mut buf = [0; BLOCK_SIZE];
    file.read_block(2, &mut buf).unwrap();
    assert_eq!(buf, [0x5a; BLOCK_SIZE]);
    assert!(matches!(
        file.read_block(9, &mut buf),
        Err(block_dev::Error::ShortRead { block_id: 9, .. })
    ));

    std::fs::remove_file(path).unwrap();
}

#[test]
fn log_survives_reopening_the_image() {
    let path = image("remount");
    let clock = Arc::new(SystemClock);

    let mut fs = Lfs::mount(BlockFile::open(&path, true).unwrap(), clock.clone(), config()).unwrap();
    let fh = fs.create("/note", 0o644).unwrap();
    fs.write(fh, 0, b"written through a host file").unwrap();
    fs.release(fh).unwrap();
    fs.unmount().unwrap();

    let mut fs = Lfs::mount(BlockFile::open(&path, false).unwrap(), clock, config()).unwrap();
    let fh = fs.open("/note").unwrap();
    let mut buf = [0; 64];
    let len = fs.read(fh, 0, &mut buf).unwrap();
    assert_eq!(&buf[..len], b"written through a host file");
    fs.verify().unwrap();

    std::fs::remove_file(path).unwrap();
}

#[test]
fn mount_errors_keep_errno() {
    let err = io_error(lfs::Error::NoSpace);
    assert_eq!(err.kind(), std::io::ErrorKind::StorageFull);
    assert_eq!(err.to_string(), "log is full");
}
