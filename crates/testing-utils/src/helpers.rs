//! 测试辅助函数

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::time::sleep;

pub struct TestEnv;

impl TestEnv {
    /// 轮询等待条件成立，超时返回 false
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }

        false
    }

    pub fn days_ago(days: i64) -> DateTime<Utc> {
        Utc::now() - ChronoDuration::days(days)
    }

    pub fn timestamp_with_offset(offset_seconds: i64) -> DateTime<Utc> {
        Utc::now() + ChronoDuration::seconds(offset_seconds)
    }
}

pub struct TestAssertions;

impl TestAssertions {
    /// 断言两个集合元素相同（不关心顺序）
    pub fn assert_contains_exactly<T: PartialEq + std::fmt::Debug>(actual: &[T], expected: &[T]) {
        assert_eq!(
            actual.len(),
            expected.len(),
            "集合长度不同. 实际: {:?}, 期望: {:?}",
            actual,
            expected
        );

        for expected_item in expected {
            assert!(
                actual.contains(expected_item),
                "期望的元素 {:?} 不在 {:?} 中",
                expected_item,
                actual
            );
        }
    }

    /// 断言积分榜按给定球队名的顺序排列
    pub fn assert_team_order(entries: &[standings_domain::StandingsEntry], expected: &[&str]) {
        let actual: Vec<&str> = entries.iter().map(|entry| entry.team_name.as_str()).collect();
        assert_eq!(actual, expected, "积分榜顺序不符");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_wait_for_succeeds_eventually() {
        let counter = AtomicU32::new(0);
        let reached = TestEnv::wait_for(
            || {
                let value = counter.fetch_add(1, Ordering::SeqCst);
                async move { value >= 3 }
            },
            Duration::from_secs(1),
        )
        .await;
        assert!(reached);
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        assert!(!TestEnv::wait_for(|| async { false }, Duration::from_millis(50)).await);
    }

    #[test]
    fn test_assert_contains_exactly_ignores_order() {
        TestAssertions::assert_contains_exactly(&[3, 1, 2], &[1, 2, 3]);
    }
}
