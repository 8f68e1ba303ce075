pub mod application;
pub mod calculus;
pub mod change;
pub mod deployment_steps;
pub mod job_status;
pub mod retry;
pub mod versions;

pub use application::{Application, ApplicationId, Deployment, ErrorKind, JobReport, JobRun, JobType, Zone};
pub use change::Change;
pub use deployment_steps::{BlockWindow, ChangeKind, DeploymentSpec, ProductionStep};
pub use job_status::JobStatus;
pub use versions::{ApplicationVersion, PlatformVersion, Versions};

pub use calculus::{is_complete, is_tested, remaining_change};
pub use retry::may_trigger;
