//! The trigger's own components: the planner (§4.F), the triggering engine
//! (§4.G), the completion reconciler (§4.H), and the external-change API
//! (§4.I). `Trigger` is the façade that wires them to a build service and an
//! application repository.

pub mod external_api;
pub mod planner;
mod reconciler;
mod triggering;

use std::sync::Arc;

use crate::build_service::BuildService;
use crate::domain::PlatformVersion;
use crate::repository::ApplicationRepository;

pub use planner::Candidate;

/// Cheaply cloneable façade: every field is an `Arc` or a plain value, so a
/// `Trigger` can be handed to the HTTP layer's state and to the periodic
/// tick task without any extra wrapping.
#[derive(Clone)]
pub struct Trigger {
    pub repository: Arc<ApplicationRepository>,
    pub build_service: Arc<dyn BuildService>,
    pub system_platform_version: PlatformVersion,
    pub job_timeout: chrono::Duration,
    pub max_concurrent_applications: usize,
}

impl Trigger {
    pub fn new(
        repository: Arc<ApplicationRepository>,
        build_service: Arc<dyn BuildService>,
        system_platform_version: PlatformVersion,
        job_timeout: chrono::Duration,
        max_concurrent_applications: usize,
    ) -> Self {
        Self {
            repository,
            build_service,
            system_platform_version,
            job_timeout,
            max_concurrent_applications,
        }
    }
}
