use clap::Parser;
use std::path::PathBuf;

use lfs::config::{DEFAULT_CLEAN_START, DEFAULT_CLEAN_STOP, DEFAULT_SEGMENTS_PER_CLEAN};

#[derive(Parser)]
pub struct Cli {
    /// Mount point
    pub mount_dir: PathBuf,

    /// Log image; created and formatted when empty
    #[arg(long, short)]
    pub log: PathBuf,

    /// Log size in GiB, used only when formatting
    #[arg(long, default_value_t = 1)]
    pub size: u64,

    /// Start cleaning below this many clean segments
    #[arg(long, default_value_t = DEFAULT_CLEAN_START)]
    pub clean_start: usize,

    /// Stop cleaning at this many clean segments
    #[arg(long, default_value_t = DEFAULT_CLEAN_STOP)]
    pub clean_stop: usize,

    /// Segments cleaned per pass
    #[arg(long, default_value_t = DEFAULT_SEGMENTS_PER_CLEAN)]
    pub segments_per_clean: usize,
}
