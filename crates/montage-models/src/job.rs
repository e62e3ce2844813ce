//! Render job definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::payload::JobPayload;
use crate::status::JobStatus;

/// Unique identifier for a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse cost/quality knob, opaque to the queue.
///
/// The media layer maps tiers to encoder settings; the queue stores the tier
/// without interpreting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Fast, cheap preview quality
    Draft,
    /// Balanced default
    #[default]
    Standard,
    /// Slow, high quality final render
    High,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Draft => "draft",
            QualityTier::Standard => "standard",
            QualityTier::High => "high",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown tier string.
#[derive(Debug, Error)]
#[error("unknown quality tier: {0}")]
pub struct ParseQualityTierError(pub String);

impl FromStr for QualityTier {
    type Err = ParseQualityTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(QualityTier::Draft),
            "standard" => Ok(QualityTier::Standard),
            "high" => Ok(QualityTier::High),
            other => Err(ParseQualityTierError(other.to_string())),
        }
    }
}

/// Scene-level progress for a job.
///
/// Last write wins; the queue does not enforce monotonicity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobProgress {
    /// Scenes processed so far
    pub current: u32,
    /// Total scenes in the job
    pub total: u32,
    /// Human-readable step description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One durable unit of render work.
///
/// Jobs are created by an enqueue call and mutated only through the queue
/// store; workers never write the record directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Owning user
    pub user_id: String,

    /// Owning project
    pub project_id: String,

    /// Lifecycle state
    pub status: JobStatus,

    /// Cost/quality knob
    pub quality_tier: QualityTier,

    /// Scene-level progress
    #[serde(default)]
    pub progress: JobProgress,

    /// Final artifact reference; non-null iff completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,

    /// User-facing error; non-null iff failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Opaque work description
    pub payload: JobPayload,

    /// Enqueue timestamp, set server-side
    pub created_at: DateTime<Utc>,

    /// Set exactly once, at the transition into processing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Set exactly once, at the transition into a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(
        user_id: impl Into<String>,
        project_id: impl Into<String>,
        quality_tier: QualityTier,
        payload: JobPayload,
    ) -> Self {
        Self {
            id: JobId::new(),
            user_id: user_id.into(),
            project_id: project_id.into(),
            status: JobStatus::Pending,
            quality_tier,
            progress: JobProgress::default(),
            result_ref: None,
            error_message: None,
            payload,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Check if the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{RenderedScene, SceneInstruction};
    use crate::transition::Transition;

    fn generation_payload() -> JobPayload {
        JobPayload::Generation {
            instructions: vec![SceneInstruction {
                scene_index: 0,
                prompt: "a city at night".into(),
                duration_secs: 6.0,
                transition_out: Transition::Cut,
            }],
            style: Some("cinematic".into()),
            stock_query_hints: vec!["city skyline".into()],
            estimated_cost: Some(0.42),
        }
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new("user-1", "proj-1", QualityTier::Standard, generation_payload());
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
        assert!(job.result_ref.is_none());
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_job_round_trips_through_json() {
        let job = Job::new(
            "user-1",
            "proj-1",
            QualityTier::High,
            JobPayload::PreRendered {
                scenes: vec![RenderedScene {
                    scene_index: 0,
                    rendered_path: "/data/scene_0.mp4".into(),
                    transition_out: Transition::Dissolve,
                }],
                project_id: "proj-1".into(),
            },
        );

        let json = serde_json::to_string(&job).unwrap();
        let parsed: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, job.id);
        assert_eq!(parsed.quality_tier, QualityTier::High);
        assert_eq!(parsed.payload, job.payload);
    }
}
