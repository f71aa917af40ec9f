mod cli;

use std::fs;
use std::io;
use std::sync::Arc;

use clap::Parser;
use cli::Cli;
use lfs::{Config, Lfs};
use lfs_fuse::{BlockFile, SystemClock, io_error};
use typed_bytesize::ByteSizeIec;
use vfs::FileSystem;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    println!("source={:?}\nout={:?}", cli.source, cli.out);

    let config = Config {
        log_size: ByteSizeIec::gib(cli.size).0,
        ..Config::default()
    };
    let image = BlockFile::open(&cli.out, true)?;
    let mut fs = Lfs::mount(image, Arc::new(SystemClock), config).map_err(io_error)?;

    for entry in fs::read_dir(&cli.source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            log::warn!("skipping non UTF-8 name {:?}", entry.file_name());
            continue;
        };

        let data = fs::read(entry.path())?;
        let path = format!("/{name}");
        let fh = fs.create(&path, 0o644).map_err(vfs_error)?;
        fs.write(fh, 0, &data).map_err(vfs_error)?;
        fs.release(fh).map_err(vfs_error)?;
        println!("file: {name:?} ({} bytes)", data.len());
    }

    let stats = fs.stats();
    println!(
        "{} files, {} live bytes, {} of {} segments clean",
        stats.file_count, stats.live_bytes, stats.clean_segments, stats.segments
    );
    fs.unmount().map_err(io_error)
}

fn vfs_error(err: vfs::Error) -> io::Error {
    io::Error::new(io::Error::from_raw_os_error(err.errno()).kind(), err.to_string())
}
