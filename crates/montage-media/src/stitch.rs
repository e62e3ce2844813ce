//! Scene stitching pipeline.
//!
//! Folds an ordered list of scene clips into one output file. Blended
//! transitions overlap the tail of the running output with the head of the
//! next scene; a failed blend degrades to a hard concatenation of the same
//! two inputs instead of failing the job. Intermediates are removed on every
//! exit path.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use montage_models::Transition;

use crate::error::{MediaError, MediaResult};
use crate::fs_utils;
use crate::transcoder::{BlendSpec, EncodeProfile, Transcoder};

/// Fraction of the shorter clip's duration used as the blend overlap window.
pub const TRANSITION_OVERLAP_FRACTION: f64 = 0.25;

/// Upper bound on the blend overlap window, in seconds.
pub const MAX_TRANSITION_OVERLAP_SECS: f64 = 1.0;

/// One clip entering the fold, tagged with the transition to its successor.
#[derive(Debug, Clone)]
pub struct StitchInput {
    pub path: PathBuf,
    pub transition_out: Transition,
}

/// Scene-level progress emitted after each fold step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StitchProgress {
    pub step: u32,
    pub total_steps: u32,
}

/// Stitch `clips` into `output`.
///
/// `work_dir` receives the intermediate files; it must be unique to the job.
/// A single clip short-circuits to a re-encode with no fold loop. The final
/// intermediate is moved to `output` (EXDEV-safe); if that move cannot be
/// produced the stitch fails.
pub async fn stitch_scenes(
    transcoder: &dyn Transcoder,
    profile: &EncodeProfile,
    clips: &[StitchInput],
    work_dir: &Path,
    output: &Path,
    progress: Option<UnboundedSender<StitchProgress>>,
) -> MediaResult<()> {
    if clips.is_empty() {
        return Err(MediaError::invalid_video("no scene clips to stitch"));
    }

    let total_steps = clips.len() as u32;
    let report = |step: u32| {
        if let Some(tx) = &progress {
            let _ = tx.send(StitchProgress { step, total_steps });
        }
    };

    if let [only] = clips {
        transcoder.reencode(&only.path, output, profile).await?;
        report(1);
        return Ok(());
    }

    let mut intermediates: Vec<PathBuf> = Vec::new();
    let result = fold_clips(
        transcoder,
        profile,
        clips,
        work_dir,
        output,
        &mut intermediates,
        &report,
    )
    .await;

    // Cleanup runs on success and failure alike; the moved final file is
    // gone already and removal of it simply misses.
    for path in &intermediates {
        let _ = fs::remove_file(path).await;
    }

    result
}

async fn fold_clips(
    transcoder: &dyn Transcoder,
    profile: &EncodeProfile,
    clips: &[StitchInput],
    work_dir: &Path,
    output: &Path,
    intermediates: &mut Vec<PathBuf>,
    report: &(dyn Fn(u32) + Sync),
) -> MediaResult<()> {
    let mut current = clips[0].path.clone();
    let mut transition = clips[0].transition_out;
    report(1);

    for (i, clip) in clips.iter().enumerate().skip(1) {
        let step_out = work_dir.join(format!("stitch_{i:04}.mp4"));
        intermediates.push(step_out.clone());

        if transition.is_blended() {
            blend_or_concat(transcoder, profile, &current, &clip.path, transition, &step_out)
                .await?;
        } else {
            transcoder
                .concat(&current, &clip.path, &step_out, profile)
                .await?;
        }

        // The previous intermediate is consumed; source clips are kept.
        if i > 1 {
            let _ = fs::remove_file(&current).await;
        }

        current = step_out;
        transition = clip.transition_out;
        report(i as u32 + 1);
    }

    fs_utils::move_file(&current, output).await
}

/// The explicit two-attempt strategy: try the blended transition, fall back
/// to a hard concat of the same two inputs, propagate only if both fail.
async fn blend_or_concat(
    transcoder: &dyn Transcoder,
    profile: &EncodeProfile,
    first: &Path,
    second: &Path,
    transition: Transition,
    output: &Path,
) -> MediaResult<()> {
    let dur_first = transcoder.duration(first).await?;
    let dur_second = transcoder.duration(second).await?;
    let overlap = blend_overlap(dur_first, dur_second);
    let spec = BlendSpec {
        transition,
        overlap_secs: overlap,
        offset_secs: (dur_first - overlap).max(0.0),
    };

    match transcoder.blend(first, second, &spec, output, profile).await {
        Ok(()) => {
            debug!(transition = %transition, overlap, "Blended transition applied");
            Ok(())
        }
        Err(e) => {
            warn!(
                transition = %transition,
                error = %e,
                "Blended transition failed, falling back to hard concat"
            );
            transcoder.concat(first, second, output, profile).await
        }
    }
}

/// Overlap window: a fraction of the shorter clip, bounded by a fixed cap.
fn blend_overlap(dur_first: f64, dur_second: f64) -> f64 {
    (TRANSITION_OVERLAP_FRACTION * dur_first.min(dur_second)).min(MAX_TRANSITION_OVERLAP_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcoder::EncodeProfile;
    use async_trait::async_trait;
    use montage_models::QualityTier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Transcoder double that writes real output files and can be told to
    /// reject blends.
    #[derive(Default)]
    struct FakeTranscoder {
        fail_blends: bool,
        reencodes: AtomicUsize,
        concats: AtomicUsize,
        blends: AtomicUsize,
    }

    impl FakeTranscoder {
        fn failing_blends() -> Self {
            Self {
                fail_blends: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn duration(&self, _input: &Path) -> MediaResult<f64> {
            Ok(8.0)
        }

        async fn reencode(
            &self,
            input: &Path,
            output: &Path,
            _profile: &EncodeProfile,
        ) -> MediaResult<()> {
            self.reencodes.fetch_add(1, Ordering::SeqCst);
            let bytes = fs::read(input).await?;
            fs::write(output, bytes).await?;
            Ok(())
        }

        async fn concat(
            &self,
            first: &Path,
            second: &Path,
            output: &Path,
            _profile: &EncodeProfile,
        ) -> MediaResult<()> {
            self.concats.fetch_add(1, Ordering::SeqCst);
            let mut bytes = fs::read(first).await?;
            bytes.extend(fs::read(second).await?);
            fs::write(output, bytes).await?;
            Ok(())
        }

        async fn blend(
            &self,
            first: &Path,
            second: &Path,
            _spec: &BlendSpec,
            output: &Path,
            _profile: &EncodeProfile,
        ) -> MediaResult<()> {
            self.blends.fetch_add(1, Ordering::SeqCst);
            if self.fail_blends {
                return Err(MediaError::ffmpeg_failed("xfade rejected input", None, Some(1)));
            }
            let mut bytes = fs::read(first).await?;
            bytes.extend(fs::read(second).await?);
            fs::write(output, bytes).await?;
            Ok(())
        }
    }

    fn profile() -> EncodeProfile {
        EncodeProfile::for_tier(QualityTier::Standard)
    }

    async fn write_clips(dir: &Path, tags: &[Transition]) -> Vec<StitchInput> {
        let mut clips = Vec::new();
        for (i, tag) in tags.iter().enumerate() {
            let path = dir.join(format!("scene_{i}.mp4"));
            fs::write(&path, format!("clip-{i}")).await.unwrap();
            clips.push(StitchInput {
                path,
                transition_out: *tag,
            });
        }
        clips
    }

    fn leftover_intermediates(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("stitch_"))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_single_clip_short_circuits() {
        let dir = TempDir::new().unwrap();
        let clips = write_clips(dir.path(), &[Transition::Fade]).await;
        let output = dir.path().join("final.mp4");

        let transcoder = FakeTranscoder::default();
        stitch_scenes(&transcoder, &profile(), &clips, dir.path(), &output, None)
            .await
            .unwrap();

        assert!(output.exists());
        assert_eq!(transcoder.reencodes.load(Ordering::SeqCst), 1);
        assert_eq!(transcoder.concats.load(Ordering::SeqCst), 0);
        assert_eq!(transcoder.blends.load(Ordering::SeqCst), 0);
        assert!(leftover_intermediates(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_mixed_transitions_leave_one_output_and_no_temps() {
        let dir = TempDir::new().unwrap();
        let clips = write_clips(
            dir.path(),
            &[
                Transition::Fade,
                Transition::Cut,
                Transition::Dissolve,
                Transition::Cut,
            ],
        )
        .await;
        let output = dir.path().join("final.mp4");

        let transcoder = FakeTranscoder::default();
        stitch_scenes(&transcoder, &profile(), &clips, dir.path(), &output, None)
            .await
            .unwrap();

        assert!(output.exists());
        // fade, cut, dissolve joins: two blends, one concat.
        assert_eq!(transcoder.blends.load(Ordering::SeqCst), 2);
        assert_eq!(transcoder.concats.load(Ordering::SeqCst), 1);
        assert!(leftover_intermediates(dir.path()).is_empty());

        // Source clips are never consumed by the fold.
        for clip in &clips {
            assert!(clip.path.exists());
        }
    }

    #[tokio::test]
    async fn test_blend_failure_falls_back_to_concat() {
        let dir = TempDir::new().unwrap();
        let clips = write_clips(dir.path(), &[Transition::Crossfade, Transition::Cut]).await;
        let output = dir.path().join("final.mp4");

        let transcoder = FakeTranscoder::failing_blends();
        stitch_scenes(&transcoder, &profile(), &clips, dir.path(), &output, None)
            .await
            .unwrap();

        assert!(output.exists());
        assert_eq!(transcoder.blends.load(Ordering::SeqCst), 1);
        assert_eq!(transcoder.concats.load(Ordering::SeqCst), 1);
        assert!(leftover_intermediates(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_complete() {
        let dir = TempDir::new().unwrap();
        let clips = write_clips(
            dir.path(),
            &[Transition::Cut, Transition::Cut, Transition::Cut],
        )
        .await;
        let output = dir.path().join("final.mp4");

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let transcoder = FakeTranscoder::default();
        stitch_scenes(&transcoder, &profile(), &clips, dir.path(), &output, Some(tx))
            .await
            .unwrap();

        let mut steps = Vec::new();
        while let Ok(p) = rx.try_recv() {
            assert_eq!(p.total_steps, 3);
            steps.push(p.step);
        }
        assert_eq!(steps, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("final.mp4");
        let transcoder = FakeTranscoder::default();

        let err = stitch_scenes(&transcoder, &profile(), &[], dir.path(), &output, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidVideo(_)));
    }

    #[tokio::test]
    async fn test_overlap_respects_fraction_and_cap() {
        assert!((blend_overlap(2.0, 8.0) - 0.5).abs() < 1e-9);
        assert!((blend_overlap(8.0, 8.0) - MAX_TRANSITION_OVERLAP_SECS).abs() < 1e-9);
        assert_eq!(blend_overlap(0.0, 8.0), 0.0);
    }
}
