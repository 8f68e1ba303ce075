use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::change::Change;
use super::deployment_steps::DeploymentSpec;
use super::job_status::JobStatus;
use super::versions::{ApplicationVersion, PlatformVersion};

/// Tenant-qualified application identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId {
    pub tenant: String,
    pub name: String,
}

impl ApplicationId {
    pub fn new(tenant: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.name)
    }
}

/// A named target environment that can host a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Zone {
    pub env: String,
    pub region: String,
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.env, self.region)
    }
}

/// A role in the pipeline: component/build, one of the two fixed test
/// stages, or a specific production zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    Component,
    SystemTest,
    StagingTest,
    Production(Zone),
}

impl JobType {
    pub fn is_test(&self) -> bool {
        matches!(self, JobType::SystemTest | JobType::StagingTest)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, JobType::Production(_))
    }

    /// Canonical string form used as the build service's job name.
    pub fn canonical_name(&self) -> String {
        match self {
            JobType::Component => "component".to_string(),
            JobType::SystemTest => "systemTest".to_string(),
            JobType::StagingTest => "stagingTest".to_string(),
            JobType::Production(zone) => format!("production:{}:{}", zone.env, zone.region),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_name())
    }
}

#[derive(Debug, Clone)]
pub struct ParseJobTypeError(String);

impl fmt::Display for ParseJobTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a job type: {}", self.0)
    }
}

impl std::error::Error for ParseJobTypeError {}

impl std::str::FromStr for JobType {
    type Err = ParseJobTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "component" => Ok(JobType::Component),
            "systemTest" => Ok(JobType::SystemTest),
            "stagingTest" => Ok(JobType::StagingTest),
            other => other
                .strip_prefix("production:")
                .and_then(|rest| rest.split_once(':'))
                .map(|(env, region)| {
                    JobType::Production(Zone {
                        env: env.to_string(),
                        region: region.to_string(),
                    })
                })
                .ok_or_else(|| ParseJobTypeError(s.to_string())),
        }
    }
}

/// One of {outOfCapacity, testFailure, deploymentFailure, unknown}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    OutOfCapacity,
    TestFailure,
    DeploymentFailure,
    Unknown,
}

/// An immutable record produced when triggering and extended when recording
/// completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub platform: PlatformVersion,
    pub application: ApplicationVersion,
    pub source_platform: Option<PlatformVersion>,
    pub source_application: Option<ApplicationVersion>,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// What is currently deployed in a given zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub platform_version: PlatformVersion,
    pub application_version: ApplicationVersion,
    pub timestamp: DateTime<Utc>,
}

/// Ingress from the build service reporting a job's outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub application_id: ApplicationId,
    pub project_id: Option<String>,
    pub job_type: JobType,
    pub build_number: Option<u64>,
    pub source_revision: Option<String>,
    pub error: Option<ErrorKind>,
}

/// Aggregate root. Created externally and thereafter only mutated through
/// the trigger's own APIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub deployment_spec: DeploymentSpec,
    pub current_change: Change,
    pub outstanding_change: Option<Change>,
    pub deployment_jobs: HashMap<JobType, JobStatus>,
    pub deployments: HashMap<Zone, Deployment>,
    pub project_id: Option<String>,
}

impl Application {
    pub fn new(id: ApplicationId, deployment_spec: DeploymentSpec, project_id: Option<String>) -> Self {
        Self {
            id,
            deployment_spec,
            current_change: Change::empty(),
            outstanding_change: None,
            deployment_jobs: HashMap::new(),
            deployments: HashMap::new(),
            project_id,
        }
    }

    pub fn status_of(&self, job_type: &JobType) -> Option<&JobStatus> {
        self.deployment_jobs.get(job_type)
    }

    pub fn deployment_in(&self, zone: &Zone) -> Option<&Deployment> {
        self.deployments.get(zone)
    }

    pub fn deployment_for(&self, job_type: &JobType) -> Option<&Deployment> {
        match job_type {
            JobType::Production(zone) => self.deployment_in(zone),
            _ => None,
        }
    }

    /// Best-known baseline application version absent an explicit change or
    /// zone deployment: the most recently deployed version across all zones,
    /// else the unknown sentinel. Not specified verbatim by name in the
    /// source material; a reasonable reading of "current deployed" for jobs
    /// with no single owning zone (e.g. tests).
    pub fn baseline_application_version(&self) -> ApplicationVersion {
        self.deployments
            .values()
            .max_by_key(|d| d.timestamp)
            .map(|d| d.application_version.clone())
            .unwrap_or(ApplicationVersion::Unknown)
    }

    pub fn baseline_platform_version(&self) -> Option<PlatformVersion> {
        self.deployments
            .values()
            .max_by_key(|d| d.timestamp)
            .map(|d| d.platform_version.clone())
    }

    pub fn is_running(&self, job_type: &JobType, now: DateTime<Utc>, job_timeout: chrono::Duration) -> bool {
        match self.status_of(job_type) {
            Some(status) => status.is_running(now, job_timeout),
            None => false,
        }
    }

    /// Records a successful dispatch of `job_type` under `run`.
    pub fn record_trigger(&mut self, job_type: JobType, run: JobRun) {
        self.deployment_jobs.entry(job_type).or_default().record_trigger(run);
    }

    /// Applies a completion report to the stored job status for `job_type`.
    pub fn record_completion(
        &mut self,
        job_type: JobType,
        at: DateTime<Utc>,
        success_run: Option<JobRun>,
        error: Option<ErrorKind>,
    ) {
        self.deployment_jobs
            .entry(job_type)
            .or_default()
            .record_completion(at, success_run, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deployment_steps::DeploymentSpec;
    use crate::domain::versions::{ApplicationVersion, PlatformVersion};

    fn bare_spec() -> DeploymentSpec {
        DeploymentSpec {
            tests: true,
            steps: vec![],
            block_windows: vec![],
        }
    }

    #[test]
    fn job_type_canonical_round_trips_through_from_str() {
        let zone = Zone {
            env: "prod".into(),
            region: "us-east-1".into(),
        };
        let job = JobType::Production(zone);
        let parsed: JobType = job.canonical_name().parse().unwrap();
        assert_eq!(parsed, job);
        assert_eq!("systemTest".parse::<JobType>().unwrap(), JobType::SystemTest);
    }

    #[test]
    fn baseline_versions_fall_back_to_unknown_with_no_deployments() {
        let app = Application::new(ApplicationId::new("acme", "web"), bare_spec(), Some("proj".into()));
        assert_eq!(app.baseline_application_version(), ApplicationVersion::Unknown);
        assert!(app.baseline_platform_version().is_none());
    }

    #[test]
    fn baseline_versions_pick_most_recently_deployed_zone() {
        let mut app = Application::new(ApplicationId::new("acme", "web"), bare_spec(), Some("proj".into()));
        let older = Zone {
            env: "prod".into(),
            region: "us-east-1".into(),
        };
        let newer = Zone {
            env: "prod".into(),
            region: "us-west-2".into(),
        };
        app.deployments.insert(
            older,
            Deployment {
                platform_version: PlatformVersion::new("7.0"),
                application_version: ApplicationVersion::from_build("rev-a", 1),
                timestamp: Utc::now() - chrono::Duration::hours(1),
            },
        );
        app.deployments.insert(
            newer,
            Deployment {
                platform_version: PlatformVersion::new("7.3"),
                application_version: ApplicationVersion::from_build("rev-b", 2),
                timestamp: Utc::now(),
            },
        );

        assert_eq!(app.baseline_platform_version(), Some(PlatformVersion::new("7.3")));
        assert_eq!(app.baseline_application_version(), ApplicationVersion::from_build("rev-b", 2));
    }
}
