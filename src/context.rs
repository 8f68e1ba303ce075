use chrono::{DateTime, Duration, Utc};

use crate::domain::PlatformVersion;

/// Ambient inputs threaded through the pure planning and change-calculus
/// functions: the clock, the system-supplied platform version, and the
/// liveness horizon for in-flight jobs. All time in the core comes from
/// here, never from a direct clock read, so tests can pin it.
#[derive(Debug, Clone)]
pub struct PlanningContext {
    pub now: DateTime<Utc>,
    pub system_platform_version: PlatformVersion,
    pub job_timeout: Duration,
}

impl PlanningContext {
    pub fn new(now: DateTime<Utc>, system_platform_version: PlatformVersion, job_timeout: Duration) -> Self {
        Self {
            now,
            system_platform_version,
            job_timeout,
        }
    }
}
