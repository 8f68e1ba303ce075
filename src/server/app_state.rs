use std::sync::Arc;

use crate::config::Config;
use crate::engine::Trigger;
use crate::server::middleware::rate_limit::RateLimiter;

pub struct AppState {
    pub config: Config,
    pub trigger: Trigger,
    pub start_time: std::time::Instant,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: Config, trigger: Trigger) -> Arc<Self> {
        Arc::new(Self {
            config,
            trigger,
            start_time: std::time::Instant::now(),
            rate_limiter: RateLimiter::default(),
        })
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
