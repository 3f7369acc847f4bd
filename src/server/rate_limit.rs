//! Fixed-window per-IP rate limiter / 按IP的固定窗口限流
//!
//! Public read endpoints allow 60 requests per minute per client address.
//! Admin routes bypass the limiter entirely.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// Requests allowed per window / 每窗口允许的请求数
const WINDOW_LIMIT: u32 = 60;
/// Window length / 窗口长度
const WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<RwLock<HashMap<IpAddr, (Instant, u32)>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record one request; false means the caller is over the limit
    /// / 记录一次请求，返回false表示超限
    pub async fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.write().await;

        // 顺手清理过期窗口
        if windows.len() > 1024 {
            windows.retain(|_, (start, _)| now.duration_since(*start) < WINDOW);
        }

        let entry = windows.entry(ip).or_insert((now, 0));
        if now.duration_since(entry.0) >= WINDOW {
            *entry = (now, 0);
        }
        entry.1 += 1;
        entry.1 <= WINDOW_LIMIT
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limit_enforced() {
        let limiter = RateLimiter::new();
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        for _ in 0..WINDOW_LIMIT {
            assert!(limiter.check(ip).await);
        }
        assert!(!limiter.check(ip).await);
    }

    #[tokio::test]
    async fn test_limit_is_per_ip() {
        let limiter = RateLimiter::new();
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        for _ in 0..WINDOW_LIMIT {
            assert!(limiter.check(a).await);
        }
        assert!(limiter.check(b).await);
    }
}
