//! Per-client-IP sliding window rate limiting (spec §4.5 "Rate limiting").
//!
//! No teacher equivalent; hand-rolled in the teacher's shared-state idiom
//! (a plain `HashMap` behind a lock, as `AppState` uses in the source for
//! its active-download map) rather than a generic tower middleware stack.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use pipeline_core::Config;

pub struct RateLimiter {
    max: u32,
    window: Duration,
    hits: Mutex<HashMap<IpAddr, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self { max, window, hits: Mutex::new(HashMap::new()) }
    }

    /// Records a hit for `ip` and returns whether it is within the window's
    /// budget. Always records, even when over budget, so a client that
    /// keeps hammering the endpoint does not get a free pass once the
    /// window rolls forward.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap();
        let entry = hits.entry(ip).or_default();
        entry.retain(|t| now.duration_since(*t) < self.window);
        if entry.len() as u32 >= self.max {
            return false;
        }
        entry.push(now);
        true
    }

    pub fn remaining(&self, ip: IpAddr) -> u32 {
        let now = Instant::now();
        let hits = self.hits.lock().unwrap();
        let used = hits
            .get(&ip)
            .map(|hits| hits.iter().filter(|t| now.duration_since(**t) < self.window).count())
            .unwrap_or(0) as u32;
        self.max.saturating_sub(used)
    }
}

pub struct RateLimiters {
    pub global: RateLimiter,
    pub analyze: RateLimiter,
    pub download: RateLimiter,
    pub convert: RateLimiter,
    pub queue_status: RateLimiter,
}

impl RateLimiters {
    pub fn from_config(config: &Config) -> Self {
        Self {
            global: RateLimiter::new(config.rate_limit_max, Duration::from_secs(15 * 60)),
            analyze: RateLimiter::new(config.analyze_rate_limit_max, Duration::from_secs(15 * 60)),
            download: RateLimiter::new(config.download_rate_limit_max, Duration::from_secs(60 * 60)),
            convert: RateLimiter::new(config.convert_rate_limit_max, Duration::from_secs(60 * 60)),
            queue_status: RateLimiter::new(config.queue_status_rate_limit_max, Duration::from_secs(60)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_then_rejects() {
        let rl = RateLimiter::new(2, Duration::from_secs(60));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(rl.check(ip));
        assert!(rl.check(ip));
        assert!(!rl.check(ip));
    }

    #[test]
    fn tracks_clients_independently() {
        let rl = RateLimiter::new(1, Duration::from_secs(60));
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(rl.check(a));
        assert!(rl.check(b));
        assert!(!rl.check(a));
    }

    #[test]
    fn remaining_reflects_usage() {
        let rl = RateLimiter::new(3, Duration::from_secs(60));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(rl.remaining(ip), 3);
        rl.check(ip);
        assert_eq!(rl.remaining(ip), 2);
    }
}
