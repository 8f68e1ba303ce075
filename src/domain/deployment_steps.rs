use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::application::{JobType, Zone};

/// Which kind of in-progress change a block window applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Platform,
    Application,
    Both,
}

/// A timespan declared in the deployment spec during which changes of some
/// kind must not advance. Hours are in the given timezone's wall-clock
/// (only UTC is evaluated; non-UTC windows are accepted but compared as UTC,
/// a known limitation left for the operator to account for).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockWindow {
    pub kind: ChangeKind,
    pub start_hour: u8,
    pub end_hour: u8,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl BlockWindow {
    fn covers(&self, at: DateTime<Utc>) -> bool {
        let hour = at.hour() as u8;
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            // wraps past midnight, e.g. 22..6
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    fn applies_to(&self, kind: ChangeKind) -> bool {
        matches!(self.kind, ChangeKind::Both) || self.kind == kind
    }
}

/// One node of the deployment spec's step tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepNode {
    TestStage,
    Delay {
        #[serde(with = "humantime_duration")]
        duration: ChronoDuration,
    },
    Zone(Zone),
    Parallel {
        zones: Vec<Zone>,
    },
}

mod humantime_duration {
    use chrono::Duration as ChronoDuration;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &ChronoDuration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let std_duration = value.to_std().unwrap_or_default();
        serializer.serialize_str(&humantime::format_duration(std_duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ChronoDuration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let std_duration = humantime::parse_duration(&raw).map_err(serde::de::Error::custom)?;
        ChronoDuration::from_std(std_duration).map_err(serde::de::Error::custom)
    }
}

/// A flattened production step: either a pause, or a set of jobs that run
/// together (a lone zone, or a declared parallel group).
#[derive(Debug, Clone)]
pub enum ProductionStep<'a> {
    Delay(ChronoDuration),
    Jobs(Vec<JobType>, &'a StepNode),
}

/// A parsed deployment spec: whether the pipeline declares tests, its
/// ordered top-level steps, and any block windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSpec {
    #[serde(default)]
    pub tests: bool,
    #[serde(default)]
    pub steps: Vec<StepNode>,
    #[serde(default)]
    pub block_windows: Vec<BlockWindow>,
}

impl DeploymentSpec {
    /// `[systemTest, stagingTest]` when the spec declares tests, else empty.
    pub fn test_jobs(&self) -> Vec<JobType> {
        if self.tests {
            vec![JobType::SystemTest, JobType::StagingTest]
        } else {
            Vec::new()
        }
    }

    /// Ordered steps that produce production jobs: delay and zone/parallel
    /// nodes, with bare test-stage markers filtered out.
    pub fn production(&self) -> Vec<ProductionStep<'_>> {
        self.steps
            .iter()
            .filter_map(|node| match node {
                StepNode::TestStage => None,
                StepNode::Delay { duration } => Some(ProductionStep::Delay(*duration)),
                StepNode::Zone(_) | StepNode::Parallel { .. } => {
                    Some(ProductionStep::Jobs(self.to_jobs(node), node))
                }
            })
            .collect()
    }

    /// Zero or more job types for a single step node: a delay step yields
    /// none; a parallel group yields its members in declared order.
    pub fn to_jobs(&self, node: &StepNode) -> Vec<JobType> {
        match node {
            StepNode::TestStage | StepNode::Delay { .. } => Vec::new(),
            StepNode::Zone(zone) => vec![JobType::Production(zone.clone())],
            StepNode::Parallel { zones } => {
                zones.iter().cloned().map(JobType::Production).collect()
            }
        }
    }

    /// All production job types the spec declares, across every step.
    pub fn all_production_jobs(&self) -> Vec<JobType> {
        self.steps.iter().flat_map(|node| self.to_jobs(node)).collect()
    }

    pub fn blocked_by(&self, at: DateTime<Utc>, kind: ChangeKind) -> bool {
        self.block_windows
            .iter()
            .any(|w| w.applies_to(kind) && w.covers(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> DeploymentSpec {
        DeploymentSpec {
            tests: true,
            steps: vec![
                StepNode::TestStage,
                StepNode::Delay {
                    duration: ChronoDuration::minutes(5),
                },
                StepNode::Zone(Zone {
                    env: "prod".into(),
                    region: "us-east-1".into(),
                }),
                StepNode::Parallel {
                    zones: vec![
                        Zone {
                            env: "prod".into(),
                            region: "us-west-2".into(),
                        },
                        Zone {
                            env: "prod".into(),
                            region: "eu-west-1".into(),
                        },
                    ],
                },
            ],
            block_windows: vec![],
        }
    }

    #[test]
    fn production_skips_test_stage_and_keeps_order() {
        let s = spec();
        let steps = s.production();
        assert_eq!(steps.len(), 3);
        assert!(matches!(steps[0], ProductionStep::Delay(_)));
        match &steps[2] {
            ProductionStep::Jobs(jobs, _) => assert_eq!(jobs.len(), 2),
            _ => panic!("expected parallel jobs step"),
        }
    }

    #[test]
    fn block_window_wraps_midnight() {
        let window = BlockWindow {
            kind: ChangeKind::Both,
            start_hour: 22,
            end_hour: 6,
            timezone: "UTC".into(),
        };
        let at_23 = Utc::now()
            .with_hour(23)
            .unwrap()
            .with_minute(0)
            .unwrap();
        let at_12 = at_23.with_hour(12).unwrap();
        assert!(window.covers(at_23));
        assert!(!window.covers(at_12));
    }
}
