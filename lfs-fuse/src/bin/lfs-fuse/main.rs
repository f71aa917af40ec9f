mod adapter;
mod cli;

use std::io;
use std::sync::Arc;

use clap::Parser;
use fuser::MountOption;
use lfs::{Config, Lfs};
use lfs_fuse::{BlockFile, SystemClock, io_error};
use typed_bytesize::ByteSizeIec;

use self::{adapter::LfsFuse, cli::Cli};

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    // SAFETY: plain libc queries without side effects
    let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
    let config = Config {
        log_size: ByteSizeIec::gib(cli.size).0,
        clean_start: cli.clean_start,
        clean_stop: cli.clean_stop,
        segments_per_clean: cli.segments_per_clean,
        uid,
        gid,
    };

    let image = BlockFile::open(&cli.log, false)?;
    let fs = Lfs::mount(image, Arc::new(SystemClock), config).map_err(io_error)?;
    log::info!("mounting {:?} on {:?}", cli.log, cli.mount_dir);

    let options = [
        MountOption::FSName("lfs".to_owned()),
        MountOption::DefaultPermissions,
    ];
    fuser::mount2(LfsFuse::new(fs), &cli.mount_dir, &options)
}
