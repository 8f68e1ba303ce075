use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::application::{Application, Deployment, JobRun};
use super::change::Change;

/// Opaque, externally-supplied platform version. Comparison is dotted-numeric
/// ("7.3" < "8.0"), falling back to lexical comparison for non-numeric segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformVersion(pub String);

impl PlatformVersion {
    pub fn new(v: impl Into<String>) -> Self {
        Self(v.into())
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd for PlatformVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PlatformVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_dotted(&self.0, &other.0)
    }
}

/// Dotted-numeric comparison: each '.'-separated segment is compared as an
/// integer when both sides parse, otherwise lexically. Missing trailing
/// segments are treated as zero.
fn compare_dotted(a: &str, b: &str) -> Ordering {
    let pa: Vec<&str> = a.split('.').collect();
    let pb: Vec<&str> = b.split('.').collect();
    for i in 0..pa.len().max(pb.len()) {
        let da = pa.get(i).copied().unwrap_or("0");
        let db = pb.get(i).copied().unwrap_or("0");
        let ord = match (da.parse::<u64>(), db.parse::<u64>()) {
            (Ok(na), Ok(nb)) => na.cmp(&nb),
            _ => da.cmp(db),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// An opaque comparable token (source revision + build number) produced by a
/// successful component (build) job. `Unknown` is the sentinel value for an
/// application that has never had a component job succeed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationVersion {
    Unknown,
    Build {
        source_revision: String,
        build_number: u64,
    },
}

impl ApplicationVersion {
    pub fn unknown() -> Self {
        ApplicationVersion::Unknown
    }

    pub fn from_build(source_revision: impl Into<String>, build_number: u64) -> Self {
        ApplicationVersion::Build {
            source_revision: source_revision.into(),
            build_number,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ApplicationVersion::Unknown)
    }
}

impl fmt::Display for ApplicationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationVersion::Unknown => write!(f, "unknown"),
            ApplicationVersion::Build {
                source_revision,
                build_number,
            } => write!(f, "{source_revision}+{build_number}"),
        }
    }
}

impl PartialOrd for ApplicationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ApplicationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        use ApplicationVersion::*;
        match (self, other) {
            (Unknown, Unknown) => Ordering::Equal,
            (Unknown, _) => Ordering::Less,
            (_, Unknown) => Ordering::Greater,
            (Build { build_number: a, .. }, Build { build_number: b, .. }) => a.cmp(b),
        }
    }
}

/// The concrete (target, source?) pair a job run targets. Purely functional,
/// no failure modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versions {
    pub target_platform: PlatformVersion,
    pub target_application: ApplicationVersion,
    pub source_platform: Option<PlatformVersion>,
    pub source_application: Option<ApplicationVersion>,
}

impl Versions {
    pub fn targets_match(&self, run: &JobRun) -> bool {
        self.target_platform == run.platform && self.target_application == run.application
    }

    pub fn sources_match_if_present(&self, run: &JobRun) -> bool {
        if let (Some(expected), Some(actual)) = (&self.source_platform, &run.source_platform) {
            if expected != actual {
                return false;
            }
        }
        if let (Some(expected), Some(actual)) =
            (&self.source_application, &run.source_application)
        {
            if expected != actual {
                return false;
            }
        }
        true
    }

    /// Target platform = change.platform or the zone's existing deployment or
    /// the system platform version; target application = change.application
    /// or the application's best-known baseline. Sources are the pre-change
    /// deployed values, carried only when they differ from the targets.
    pub fn from(
        change: &Change,
        application: &Application,
        existing_deployment: Option<&Deployment>,
        system_platform_version: &PlatformVersion,
    ) -> Self {
        let target_platform = change
            .platform_version
            .clone()
            .or_else(|| existing_deployment.map(|d| d.platform_version.clone()))
            .unwrap_or_else(|| {
                application
                    .baseline_platform_version()
                    .unwrap_or_else(|| system_platform_version.clone())
            });

        let target_application = change
            .application_version
            .clone()
            .or_else(|| existing_deployment.map(|d| d.application_version.clone()))
            .unwrap_or_else(|| application.baseline_application_version());

        let (source_platform, source_application) = match existing_deployment {
            Some(dep) => {
                let sp = (dep.platform_version != target_platform).then(|| dep.platform_version.clone());
                let sa = (dep.application_version != target_application)
                    .then(|| dep.application_version.clone());
                (sp, sa)
            }
            None => (None, None),
        };

        Self {
            target_platform,
            target_application,
            source_platform,
            source_application,
        }
    }
}
