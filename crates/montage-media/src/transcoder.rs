//! The transcoder seam.
//!
//! Stitching talks to FFmpeg through the [`Transcoder`] trait so the fold
//! logic can be exercised without the binary installed. [`FfmpegTranscoder`]
//! is the production implementation.

use async_trait::async_trait;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

use montage_models::{QualityTier, Transition};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe;

/// Canonical output encode settings for a quality tier.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeProfile {
    pub crf: u8,
    pub preset: &'static str,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl EncodeProfile {
    /// Map a quality tier to encoder settings. The canonical output is
    /// 1080p H.264/yuv420p at 30 fps; tiers trade encode time for quality.
    pub fn for_tier(tier: QualityTier) -> Self {
        let (crf, preset) = match tier {
            QualityTier::Draft => (28, "veryfast"),
            QualityTier::Standard => (23, "medium"),
            QualityTier::High => (18, "slow"),
        };
        Self {
            crf,
            preset,
            width: 1920,
            height: 1080,
            fps: 30,
        }
    }

    /// Filter chain normalizing any input to the canonical frame geometry,
    /// rate and pixel format. Inputs to `xfade` must agree on all three.
    fn normalize_filter(&self) -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps},format=yuv420p",
            w = self.width,
            h = self.height,
            fps = self.fps
        )
    }
}

/// Parameters of one blended transition between two clips.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendSpec {
    /// The transition tag; must be a blended one
    pub transition: Transition,
    /// Overlap window in seconds
    pub overlap_secs: f64,
    /// Offset into the first clip where the overlap starts
    pub offset_secs: f64,
}

/// Operations the stitching fold needs from the external transcoder.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Duration of a clip in seconds.
    async fn duration(&self, input: &Path) -> MediaResult<f64>;

    /// Re-encode a single clip to the canonical output format.
    async fn reencode(
        &self,
        input: &Path,
        output: &Path,
        profile: &EncodeProfile,
    ) -> MediaResult<()>;

    /// Hard-concatenate two clips.
    async fn concat(
        &self,
        first: &Path,
        second: &Path,
        output: &Path,
        profile: &EncodeProfile,
    ) -> MediaResult<()>;

    /// Blend the tail of `first` into the head of `second`.
    async fn blend(
        &self,
        first: &Path,
        second: &Path,
        spec: &BlendSpec,
        output: &Path,
        profile: &EncodeProfile,
    ) -> MediaResult<()>;
}

/// FFmpeg-backed [`Transcoder`].
#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder {
    runner: FfmpegRunner,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill any single FFmpeg invocation that exceeds `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn duration(&self, input: &Path) -> MediaResult<f64> {
        probe::get_duration(input).await
    }

    async fn reencode(
        &self,
        input: &Path,
        output: &Path,
        profile: &EncodeProfile,
    ) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(output)
            .input(input)
            .video_filter(profile.normalize_filter())
            .video_codec("libx264")
            .preset(profile.preset)
            .crf(profile.crf)
            .audio_codec("aac")
            .output_args(["-movflags", "+faststart"]);

        self.runner.run(&cmd).await
    }

    async fn concat(
        &self,
        first: &Path,
        second: &Path,
        output: &Path,
        profile: &EncodeProfile,
    ) -> MediaResult<()> {
        let list_dir = output.parent().unwrap_or_else(|| Path::new("."));
        let list_path = list_dir.join(format!("concat_{}.txt", Uuid::new_v4()));

        let list = format!(
            "file '{}'\nfile '{}'\n",
            escape_concat_path(first),
            escape_concat_path(second)
        );
        fs::write(&list_path, list).await?;

        let cmd = FfmpegCommand::new(output)
            .input_with_args(["-f", "concat", "-safe", "0"], &list_path)
            .video_filter(profile.normalize_filter())
            .video_codec("libx264")
            .preset(profile.preset)
            .crf(profile.crf)
            .audio_codec("aac")
            .output_args(["-movflags", "+faststart"]);

        let result = self.runner.run(&cmd).await;
        let _ = fs::remove_file(&list_path).await;
        result
    }

    async fn blend(
        &self,
        first: &Path,
        second: &Path,
        spec: &BlendSpec,
        output: &Path,
        profile: &EncodeProfile,
    ) -> MediaResult<()> {
        let Some(xfade) = spec.transition.xfade_name() else {
            return Err(MediaError::invalid_video(format!(
                "transition {} has no blend",
                spec.transition
            )));
        };

        let norm = profile.normalize_filter();
        let filter = format!(
            "[0:v]{norm}[v0];[1:v]{norm}[v1];\
             [v0][v1]xfade=transition={xfade}:duration={dur:.3}:offset={off:.3}[v];\
             [0:a][1:a]acrossfade=d={dur:.3}[a]",
            dur = spec.overlap_secs,
            off = spec.offset_secs,
        );

        let cmd = FfmpegCommand::new(output)
            .input(first)
            .input(second)
            .filter_complex(filter)
            .output_args(["-map", "[v]", "-map", "[a]"])
            .video_codec("libx264")
            .preset(profile.preset)
            .crf(profile.crf)
            .audio_codec("aac")
            .output_args(["-movflags", "+faststart"]);

        self.runner.run(&cmd).await
    }
}

/// The concat demuxer reads single-quoted paths; embedded quotes are closed,
/// escaped and reopened.
fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_order_by_quality() {
        let draft = EncodeProfile::for_tier(QualityTier::Draft);
        let standard = EncodeProfile::for_tier(QualityTier::Standard);
        let high = EncodeProfile::for_tier(QualityTier::High);

        assert!(draft.crf > standard.crf);
        assert!(standard.crf > high.crf);
        assert_eq!(standard.width, 1920);
    }

    #[test]
    fn test_normalize_filter_mentions_geometry() {
        let profile = EncodeProfile::for_tier(QualityTier::Standard);
        let filter = profile.normalize_filter();
        assert!(filter.contains("1920:1080"));
        assert!(filter.contains("fps=30"));
        assert!(filter.contains("yuv420p"));
    }

    #[test]
    fn test_escape_concat_path() {
        let path = Path::new("/tmp/it's a clip.mp4");
        assert_eq!(escape_concat_path(path), "/tmp/it'\\''s a clip.mp4");
    }

    #[test]
    fn test_blend_rejects_cut() {
        let transcoder = FfmpegTranscoder::new();
        let spec = BlendSpec {
            transition: Transition::Cut,
            overlap_secs: 1.0,
            offset_secs: 4.0,
        };
        let profile = EncodeProfile::for_tier(QualityTier::Standard);

        let err = tokio_test::block_on(transcoder.blend(
            Path::new("a.mp4"),
            Path::new("b.mp4"),
            &spec,
            Path::new("out.mp4"),
            &profile,
        ))
        .unwrap_err();
        assert!(matches!(err, MediaError::InvalidVideo(_)));
    }
}
