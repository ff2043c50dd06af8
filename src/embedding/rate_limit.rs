//! 요청 속도 제한 (슬라이딩 윈도우 + 최소 간격)

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// 윈도우 안의 요청 수와 연속 요청 간격을 함께 제한
#[derive(Debug)]
pub(crate) struct RateLimiter {
    sent: VecDeque<Instant>,
    limit: usize,
    window: Duration,
    min_interval: Duration,
}

impl RateLimiter {
    pub(crate) fn new(limit: usize, window: Duration, min_interval: Duration) -> Self {
        Self {
            sent: VecDeque::with_capacity(limit),
            limit: limit.max(1),
            window,
            min_interval,
        }
    }

    /// `now`에 요청하려면 얼마나 기다려야 하는지 (필요 없으면 None)
    pub(crate) fn wait_time(&mut self, now: Instant) -> Option<Duration> {
        while let Some(&first) = self.sent.front() {
            if now.saturating_duration_since(first) >= self.window {
                self.sent.pop_front();
            } else {
                break;
            }
        }

        let interval_wait = self
            .sent
            .back()
            .map(|&last| self.min_interval.saturating_sub(now.saturating_duration_since(last)))
            .unwrap_or_default();

        let window_wait = if self.sent.len() >= self.limit {
            self.sent
                .front()
                .map(|&first| self.window.saturating_sub(now.saturating_duration_since(first)))
                .unwrap_or_default()
        } else {
            Duration::ZERO
        };

        Some(interval_wait.max(window_wait)).filter(|wait| !wait.is_zero())
    }

    /// 요청 가능할 때까지 대기한 뒤 요청 시각 기록
    pub(crate) async fn acquire(&mut self) {
        if let Some(wait) = self.wait_time(Instant::now()) {
            tracing::debug!("Rate limited, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        self.sent.push_back(Instant::now());
    }

    #[cfg(test)]
    fn record(&mut self, at: Instant) {
        self.sent.push_back(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_is_free() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(60), Duration::from_secs(1));
        assert_eq!(limiter.wait_time(Instant::now()), None);
    }

    #[test]
    fn test_min_interval_between_requests() {
        let mut limiter = RateLimiter::new(10, Duration::from_secs(60), Duration::from_secs(1));
        let start = Instant::now();
        limiter.record(start);

        let wait = limiter.wait_time(start + Duration::from_millis(400)).unwrap();
        assert_eq!(wait, Duration::from_millis(600));
        assert_eq!(limiter.wait_time(start + Duration::from_secs(2)), None);
    }

    #[test]
    fn test_full_window_waits_for_oldest() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(60), Duration::ZERO);
        let start = Instant::now();
        limiter.record(start);
        limiter.record(start + Duration::from_secs(10));

        let wait = limiter.wait_time(start + Duration::from_secs(20)).unwrap();
        assert_eq!(wait, Duration::from_secs(40));

        // 가장 오래된 요청이 윈도우를 벗어나면 바로 가능
        assert_eq!(limiter.wait_time(start + Duration::from_secs(61)), None);
    }
}
