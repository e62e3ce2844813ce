//! Render orchestration.
//!
//! Turns a claimed job's payload into a finished artifact: either stitching
//! clips rendered in an earlier phase, or generating every scene through the
//! provider first. All errors resolve here into a `fail()` with a user-safe
//! message; full detail stays in the server-side logs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use montage_media::{stitch_scenes, EncodeProfile, StitchInput, StitchProgress, Transcoder};
use montage_models::{Job, JobPayload, RenderedScene, SceneInstruction};
use montage_queue::JobStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::provider::{GenerationProvider, SceneRender};

/// Told to the owner when referenced clips are gone from disk.
const RERENDER_MESSAGE: &str =
    "Your rendered scenes could not be found. Please re-render them and try again.";

/// Told to the owner when a generation job carries no instructions.
const NO_INSTRUCTIONS_MESSAGE: &str =
    "No rendering instructions provided. Add scenes to this project and try again.";

/// Told to the owner when the final assembly cannot be produced.
const ASSEMBLY_FAILED_MESSAGE: &str =
    "We could not assemble the final video. Please try again.";

/// Worker-side render pipeline for one job at a time.
pub struct RenderOrchestrator {
    store: Arc<dyn JobStore>,
    provider: Arc<dyn GenerationProvider>,
    transcoder: Arc<dyn Transcoder>,
    work_dir: PathBuf,
    output_dir: PathBuf,
}

impl RenderOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        provider: Arc<dyn GenerationProvider>,
        transcoder: Arc<dyn Transcoder>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            store,
            provider,
            transcoder,
            work_dir: config.work_dir.clone(),
            output_dir: config.output_dir.clone(),
        }
    }

    /// Drive a claimed job to a terminal state.
    ///
    /// Never propagates an error to the caller: success records the result
    /// reference, any failure records a user-safe message. The job's scratch
    /// directory is removed on every exit path.
    pub async fn process(&self, job: Job) {
        let job_id = job.id;
        info!(job_id = %job_id, tier = %job.quality_tier, "Processing render job");

        let work_dir = self.work_dir.join(job_id.to_string());
        let outcome = self.process_inner(&job, &work_dir).await;
        let _ = tokio::fs::remove_dir_all(&work_dir).await;

        match outcome {
            Ok(result_ref) => {
                info!(job_id = %job_id, result = %result_ref, "Job completed");
                if let Err(e) = self.store.complete(job_id, &result_ref).await {
                    error!(job_id = %job_id, error = %e, "Failed to record completion");
                }
            }
            Err(err) => {
                // Full detail server-side; only the safe message reaches the record.
                error!(job_id = %job_id, error = %err, "Job failed");
                if let Err(e) = self.store.fail(job_id, err.user_message()).await {
                    error!(job_id = %job_id, error = %e, "Failed to record failure");
                }
            }
        }
    }

    async fn process_inner(&self, job: &Job, work_dir: &Path) -> WorkerResult<String> {
        tokio::fs::create_dir_all(work_dir).await?;

        match &job.payload {
            JobPayload::PreRendered { scenes, .. } => {
                self.assemble_prerendered(job, scenes, work_dir).await
            }
            JobPayload::Generation {
                instructions,
                style,
                stock_query_hints,
                ..
            } => {
                self.generate_and_assemble(job, instructions, style.as_deref(), stock_query_hints, work_dir)
                    .await
            }
        }
    }

    /// Path 1: clips were rendered in an earlier phase; validate and stitch.
    async fn assemble_prerendered(
        &self,
        job: &Job,
        scenes: &[RenderedScene],
        work_dir: &Path,
    ) -> WorkerResult<String> {
        if scenes.is_empty() {
            return Err(WorkerError::validation(RERENDER_MESSAGE));
        }

        let missing = scenes
            .iter()
            .filter(|s| !s.rendered_path.exists())
            .count();
        if missing > 0 {
            warn!(
                job_id = %job.id,
                missing,
                total = scenes.len(),
                "Referenced scene clips are missing from disk"
            );
            return Err(WorkerError::validation(RERENDER_MESSAGE));
        }

        let mut ordered = scenes.to_vec();
        ordered.sort_by_key(|s| s.scene_index);

        let clips: Vec<StitchInput> = ordered
            .iter()
            .map(|s| StitchInput {
                path: s.rendered_path.clone(),
                transition_out: s.transition_out,
            })
            .collect();

        self.stitch_and_publish(job, &clips, work_dir).await
    }

    /// Path 2: render every scene through the provider, then stitch.
    async fn generate_and_assemble(
        &self,
        job: &Job,
        instructions: &[SceneInstruction],
        style: Option<&str>,
        stock_query_hints: &[String],
        work_dir: &Path,
    ) -> WorkerResult<String> {
        if instructions.is_empty() {
            return Err(WorkerError::validation(NO_INSTRUCTIONS_MESSAGE));
        }

        let mut ordered = instructions.to_vec();
        ordered.sort_by_key(|i| i.scene_index);

        let total = ordered.len() as u32;
        self.store
            .update_progress(job.id, 0, total, "Generating scenes")
            .await
            .ok();

        let mut clips = Vec::with_capacity(ordered.len());
        for (i, instruction) in ordered.iter().enumerate() {
            let render = self
                .provider
                .render_scene(instruction, style, stock_query_hints, work_dir)
                .await
                .map_err(|e| {
                    error!(
                        job_id = %job.id,
                        scene = instruction.scene_index,
                        error = %e,
                        "Scene generation failed"
                    );
                    WorkerError::generation(format!(
                        "Scene {} could not be generated. Please try again.",
                        instruction.scene_index + 1
                    ))
                })?;

            match render {
                SceneRender::Clip(path) => clips.push(StitchInput {
                    path,
                    transition_out: instruction.transition_out,
                }),
                SceneRender::Deferred(reference) => {
                    // Nothing to stitch yet; the caller re-polls the provider
                    // through the returned token.
                    info!(job_id = %job.id, reference = %reference, "Provider deferred rendering");
                    return Ok(format!("pending:{reference}"));
                }
            }

            self.store
                .update_progress(
                    job.id,
                    i as u32 + 1,
                    total,
                    &format!("Generated scene {}/{}", i + 1, total),
                )
                .await
                .ok();
        }

        self.stitch_and_publish(job, &clips, work_dir).await
    }

    /// Stitch validated clips and move the result to its stable location.
    async fn stitch_and_publish(
        &self,
        job: &Job,
        clips: &[StitchInput],
        work_dir: &Path,
    ) -> WorkerResult<String> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let output = self.output_dir.join(format!("{}.mp4", job.id));
        let profile = EncodeProfile::for_tier(job.quality_tier);

        let (tx, mut rx) = mpsc::unbounded_channel::<StitchProgress>();
        let store = Arc::clone(&self.store);
        let job_id = job.id;
        let forwarder = tokio::spawn(async move {
            while let Some(p) = rx.recv().await {
                let message = format!("Stitched scene {}/{}", p.step, p.total_steps);
                let _ = store
                    .update_progress(job_id, p.step, p.total_steps, &message)
                    .await;
            }
        });

        let result = stitch_scenes(
            self.transcoder.as_ref(),
            &profile,
            clips,
            work_dir,
            &output,
            Some(tx),
        )
        .await;
        let _ = forwarder.await;

        result.map_err(|e| {
            error!(job_id = %job_id, error = %e, "Stitching failed");
            WorkerError::assembly(ASSEMBLY_FAILED_MESSAGE)
        })?;

        Ok(output.to_string_lossy().to_string())
    }
}
