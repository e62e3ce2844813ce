//! Montage render worker.
//!
//! Claims jobs from the durable queue and drives each one through the render
//! orchestrator: payload validation, scene generation via the upstream
//! provider, stitching through FFmpeg, and result/error resolution back into
//! the queue.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod worker;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult, GENERIC_FAILURE_MESSAGE};
pub use orchestrator::RenderOrchestrator;
pub use provider::{
    GenerationProvider, HttpGenerationProvider, ProviderError, ProviderResult, SceneRender,
};
pub use worker::{Worker, STALE_JOB_MESSAGE};
