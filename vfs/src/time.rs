/// 秒与纳秒组成的时间戳，布局固定，可直接落盘
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(C)]
pub struct TimeSpec {
    pub sec: i64,
    pub nsec: i64,
}

impl TimeSpec {
    pub const fn new(sec: i64, nsec: i64) -> Self {
        Self { sec, nsec }
    }

    /// 以秒计的浮点值
    pub fn as_secs_f64(self) -> f64 {
        self.sec as f64 + self.nsec as f64 / 1e9
    }
}

/// 时间来源
pub trait Clock: Send + Sync {
    fn now(&self) -> TimeSpec;
}
