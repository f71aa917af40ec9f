use crate::addr::Geometry;
use crate::{Error, Result, SEGMENT_SIZE};

/// 首次格式化时日志的默认大小：1 GiB
pub const DEFAULT_LOG_SIZE: u64 = 1 << 30;
/// 干净段少于该数时开始清理
pub const DEFAULT_CLEAN_START: usize = 20;
/// 干净段达到该数时停止清理
pub const DEFAULT_CLEAN_STOP: usize = 75;
/// 每轮清理的段数
pub const DEFAULT_SEGMENTS_PER_CLEAN: usize = 20;

/// 挂载参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// 格式化时的日志大小（字节）；已有的日志以其实际大小为准
    pub log_size: u64,
    pub clean_start: usize,
    pub clean_stop: usize,
    pub segments_per_clean: usize,
    /// 根目录与新建文件的属主
    pub uid: u32,
    pub gid: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_size: DEFAULT_LOG_SIZE,
            clean_start: DEFAULT_CLEAN_START,
            clean_stop: DEFAULT_CLEAN_STOP,
            segments_per_clean: DEFAULT_SEGMENTS_PER_CLEAN,
            uid: 0,
            gid: 0,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.clean_stop <= self.clean_start {
            log::error!(
                "cleaner stop threshold {} must exceed start threshold {}",
                self.clean_stop,
                self.clean_start
            );
            return Err(Error::InvalidArgument);
        }
        if self.segments_per_clean == 0 {
            log::error!("cleaner must process at least one segment per pass");
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    /// 格式化时的段数
    pub fn segments(&self) -> usize {
        (self.log_size / SEGMENT_SIZE as u64) as usize
    }

    /// 日志必须有足够的数据段，清理的停止阈值才可能达到
    pub fn check_geometry(&self, geometry: &Geometry) -> Result<()> {
        let data = geometry.data_segments().len();
        if geometry.segments <= geometry.prologue || data <= self.clean_stop {
            log::error!(
                "log of {} segments has {data} data segments, need more than {}",
                geometry.segments,
                self.clean_stop
            );
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = Config::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.segments(), 1024);
        assert_eq!(config.check_geometry(&Geometry::new(config.segments())), Ok(()));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let config = Config {
            clean_start: 10,
            clean_stop: 10,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(Error::InvalidArgument));

        let config = Config {
            segments_per_clean: 0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(Error::InvalidArgument));
    }

    #[test]
    fn rejects_tiny_logs() {
        let config = Config {
            log_size: 8 << 20,
            ..Config::default()
        };
        assert_eq!(
            config.check_geometry(&Geometry::new(config.segments())),
            Err(Error::InvalidArgument)
        );
    }
}
