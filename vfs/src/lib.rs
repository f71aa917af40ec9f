#![no_std]

extern crate alloc;

mod dirent;
mod error;
mod fs;
mod stat;
mod time;

pub use self::{
    dirent::{DirEntry, DirEntryType},
    error::Error,
    fs::{Access, FileHandle, FileSystem},
    stat::{Stat, StatFs},
    time::{Clock, TimeSpec},
};
