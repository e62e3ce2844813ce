//! Job payload definitions.
//!
//! A job carries exactly one of two payload shapes: a list of already-rendered
//! scene clips to stitch, or generation instructions for the upstream
//! provider. The shape is a tagged union so workers match exhaustively
//! instead of probing for keys.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::transition::Transition;

/// A scene clip rendered in an earlier phase, ready for stitching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedScene {
    /// Position of the scene in the final cut
    pub scene_index: u32,
    /// Path to the rendered clip file
    pub rendered_path: PathBuf,
    /// Transition joining this scene to the next
    #[serde(default)]
    pub transition_out: Transition,
}

/// One scene the generation provider should render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneInstruction {
    /// Position of the scene in the final cut
    pub scene_index: u32,
    /// Prompt describing the scene content
    pub prompt: String,
    /// Target duration in seconds
    pub duration_secs: f64,
    /// Transition joining this scene to the next
    #[serde(default)]
    pub transition_out: Transition,
}

/// The unit of work a job describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    /// Stitch scene clips produced by an earlier rendering phase.
    PreRendered {
        scenes: Vec<RenderedScene>,
        project_id: String,
    },
    /// Render every scene through the generation provider, then stitch.
    Generation {
        instructions: Vec<SceneInstruction>,
        /// Overall style/vibe hint forwarded to the provider
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<String>,
        /// Stock-footage query hints forwarded to the provider
        #[serde(default)]
        stock_query_hints: Vec<String>,
        /// Caller-side cost estimate, informational only
        #[serde(default, skip_serializing_if = "Option::is_none")]
        estimated_cost: Option<f64>,
    },
}

impl JobPayload {
    /// Number of scenes in the final cut.
    pub fn scene_count(&self) -> usize {
        match self {
            JobPayload::PreRendered { scenes, .. } => scenes.len(),
            JobPayload::Generation { instructions, .. } => instructions.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_tagging() {
        let payload = JobPayload::PreRendered {
            scenes: vec![RenderedScene {
                scene_index: 0,
                rendered_path: PathBuf::from("/tmp/scene_0.mp4"),
                transition_out: Transition::Fade,
            }],
            project_id: "proj-1".into(),
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "pre_rendered");

        let parsed: JobPayload = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn test_generation_defaults() {
        let json = serde_json::json!({
            "type": "generation",
            "instructions": [
                {"scene_index": 0, "prompt": "a sunrise over mountains", "duration_secs": 4.0}
            ]
        });

        let parsed: JobPayload = serde_json::from_value(json).unwrap();
        match parsed {
            JobPayload::Generation {
                instructions,
                style,
                stock_query_hints,
                estimated_cost,
            } => {
                assert_eq!(instructions.len(), 1);
                assert_eq!(instructions[0].transition_out, Transition::Cut);
                assert!(style.is_none());
                assert!(stock_query_hints.is_empty());
                assert!(estimated_cost.is_none());
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_shape_is_rejected() {
        let json = serde_json::json!({"type": "legacy", "clips": []});
        assert!(serde_json::from_value::<JobPayload>(json).is_err());
    }

    #[test]
    fn test_scene_count() {
        let payload = JobPayload::Generation {
            instructions: vec![
                SceneInstruction {
                    scene_index: 0,
                    prompt: "intro".into(),
                    duration_secs: 3.0,
                    transition_out: Transition::Cut,
                },
                SceneInstruction {
                    scene_index: 1,
                    prompt: "outro".into(),
                    duration_secs: 5.0,
                    transition_out: Transition::Cut,
                },
            ],
            style: None,
            stock_query_hints: Vec::new(),
            estimated_cost: None,
        };
        assert_eq!(payload.scene_count(), 2);
    }
}
