//! FFmpeg adapter for the Montage render pipeline.
//!
//! Wraps the external `ffmpeg`/`ffprobe` binaries behind the [`Transcoder`]
//! trait and implements the scene stitching fold: a left-to-right
//! assembly of scene clips with blended transitions, hard-concat fallback,
//! and unconditional cleanup of intermediates.

pub mod command;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod stitch;
pub mod transcoder;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use probe::{get_duration, probe_video, VideoInfo};
pub use stitch::{stitch_scenes, StitchInput, StitchProgress};
pub use transcoder::{BlendSpec, EncodeProfile, FfmpegTranscoder, Transcoder};
