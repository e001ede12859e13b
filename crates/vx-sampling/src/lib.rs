//! Resumable, chunked model sampling over masked voxel volumes.
//!
//! The orchestration path: [`ModelSampling`] validates the invocation and
//! hands off to [`SampleSingleModel`], which consults the resumability gate,
//! resolves parameter initialization, and drives a [`ProcessingStrategy`]
//! with a [`SamplingWorker`]. Results land under
//! `<output_folder>/<model_name>/samples/` behind an atomically written
//! completion manifest.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod init;
pub mod orchestrator;
pub mod result;
pub mod resume;
pub mod strategy;
pub mod timing;
pub mod worker;

pub use init::{InitSpec, InitializeUsing};
pub use orchestrator::{sample_model, ModelSampling, RunFlags, SampleSingleModel, SamplingOptions};
pub use result::SamplingResult;
pub use resume::{assess_output, CompletionManifest, ResumeState};
pub use strategy::{ChunkResult, ChunkWorker, ChunkedStrategy, ProcessingStrategy, TmpDirPolicy};
pub use timing::TimedPhase;
pub use worker::SamplingWorker;
