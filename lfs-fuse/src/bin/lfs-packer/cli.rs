use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Directory whose regular files are copied into the log
    #[arg(long, short)]
    pub source: PathBuf,

    /// Output image
    #[arg(long, short = 'O')]
    pub out: PathBuf,

    /// Log size in GiB
    #[arg(long, default_value_t = 1)]
    pub size: u64,
}
