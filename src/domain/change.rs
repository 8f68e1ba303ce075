use serde::{Deserialize, Serialize};

use super::application::Deployment;
use super::versions::{ApplicationVersion, PlatformVersion};

/// A pair {optional platform version, optional application version}. Empty
/// means "no migration in progress". All helpers are pure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub platform_version: Option<PlatformVersion>,
    #[serde(default)]
    pub application_version: Option<ApplicationVersion>,
}

impl Change {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of_application(v: ApplicationVersion) -> Self {
        Self {
            platform_version: None,
            application_version: Some(v),
        }
    }

    pub fn of_platform(v: PlatformVersion) -> Self {
        Self {
            platform_version: Some(v),
            application_version: None,
        }
    }

    pub fn with_application(&self, v: ApplicationVersion) -> Self {
        Self {
            platform_version: self.platform_version.clone(),
            application_version: Some(v),
        }
    }

    pub fn with_platform(&self, v: PlatformVersion) -> Self {
        Self {
            platform_version: Some(v),
            application_version: self.application_version.clone(),
        }
    }

    pub fn without_platform(&self) -> Self {
        Self {
            platform_version: None,
            application_version: self.application_version.clone(),
        }
    }

    pub fn without_application(&self) -> Self {
        Self {
            platform_version: self.platform_version.clone(),
            application_version: None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.platform_version.is_some() || self.application_version.is_some()
    }

    pub fn upgrades(&self, deployment: &Deployment) -> bool {
        self.platform_version
            .as_ref()
            .is_some_and(|p| *p > deployment.platform_version)
            || self
                .application_version
                .as_ref()
                .is_some_and(|a| *a > deployment.application_version)
    }

    pub fn downgrades(&self, deployment: &Deployment) -> bool {
        self.platform_version
            .as_ref()
            .is_some_and(|p| *p < deployment.platform_version)
            || self
                .application_version
                .as_ref()
                .is_some_and(|a| *a < deployment.application_version)
    }
}
