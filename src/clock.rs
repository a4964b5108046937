//! 单调时钟（应用启动锚点）
//!
//! **App Start Relative Time Pattern**：
//! - 以应用启动时刻为锚点的单调时间
//! - 不受系统时钟调整（NTP、手动改时间）影响
//! - 可安全存入 AtomicU64 做无锁访问

use std::sync::OnceLock;
use std::time::Instant;

/// 全局单调时间锚点，首次访问时设置，之后不变
static APP_START: OnceLock<Instant> = OnceLock::new();

/// 获取应用启动以来的单调毫秒数
///
/// 所有控制回路时间戳（目标刷新、电机应用、保持闩锁）统一使用此时基。
pub fn monotonic_millis() -> u64 {
    let start = APP_START.get_or_init(Instant::now);
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::monotonic_millis;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_monotonic_millis_increases() {
        let t1 = monotonic_millis();
        thread::sleep(Duration::from_millis(15));
        let t2 = monotonic_millis();
        assert!(t2 > t1, "Monotonic time should always increase");
    }
}
