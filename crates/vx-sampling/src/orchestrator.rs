//! Model sampling orchestration.
//!
//! [`ModelSampling`] is the entry point: it validates the model/protocol
//! pair, resolves compute devices and the sampler configuration, builds the
//! chunked strategy, and delegates to [`SampleSingleModel`], which owns the
//! resumability decision, initialization resolution and strategy dispatch.
//!
//! All preconditions are checked before any device or file I/O: a failing
//! run leaves no partial output behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use vx_compute::sampler::SamplerConfig;
use vx_compute::{enumerate_devices, resolve_devices, DeviceInfo};
use vx_core::error::Error;
use vx_core::{get_model, CompositeModel, Model, ProblemData, Result};

use crate::init::{resolve_initialization, InitializeUsing};
use crate::result::SamplingResult;
use crate::resume::{assess_output, ResumeState};
use crate::strategy::{ChunkedStrategy, ProcessingStrategy, TmpDirPolicy};
use crate::timing::TimedPhase;
use crate::worker::SamplingWorker;

/// Options for a sampling run. The defaults match a first-time run seeded
/// from sibling optimization output.
#[derive(Debug, Clone)]
pub struct SamplingOptions {
    /// Sampler configuration; `None` selects the model's default.
    pub sampler: Option<SamplerConfig>,
    /// Delete any existing output for this model and recompute.
    pub recalculate: bool,
    /// Indices into the enumerated device list; `None` selects all devices.
    pub device_indices: Option<Vec<usize>>,
    /// Evaluate the model in double precision.
    pub double_precision: bool,
    /// Seed the sampler from prior optimization maps.
    pub initialize: bool,
    /// Where to take the initialization maps from.
    pub initialize_using: InitializeUsing,
    /// Persist full sample chains alongside the summary maps.
    pub store_samples: bool,
    /// Temp-results directory policy for the processing strategy.
    pub tmp_dir: TmpDirPolicy,
    /// Upper bound on voxels per chunk.
    pub max_voxels_per_chunk: usize,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            sampler: None,
            recalculate: false,
            device_indices: None,
            double_precision: true,
            initialize: true,
            initialize_using: InitializeUsing::DefaultFolder,
            store_samples: true,
            tmp_dir: TmpDirPolicy::Default,
            max_voxels_per_chunk: 10_000,
        }
    }
}

/// Run flags consumed by [`SampleSingleModel`].
#[derive(Debug, Clone, Default)]
pub struct RunFlags {
    /// Delete any existing output for this model and recompute.
    pub recalculate: bool,
    /// Seed the sampler from prior optimization maps.
    pub initialize: bool,
    /// Where to take the initialization maps from.
    pub initialize_using: InitializeUsing,
    /// Persist full sample chains alongside the summary maps.
    pub store_samples: bool,
}

/// Sample a registered model by name. Convenience wrapper around
/// [`ModelSampling`].
pub fn sample_model(
    model_name: &str,
    problem_data: ProblemData,
    output_folder: impl Into<PathBuf>,
    options: SamplingOptions,
) -> Result<SamplingResult> {
    ModelSampling::new(get_model(model_name)?, problem_data, output_folder, options)?.run()
}

/// Validated, ready-to-run sampling invocation.
///
/// Construction performs every precondition check; [`run`](ModelSampling::run)
/// performs the work. Cascade models are rejected here: they exist only to
/// chain initializations and cannot be sampled.
pub struct ModelSampling {
    model: Box<dyn CompositeModel>,
    problem_data: Arc<ProblemData>,
    output_folder: PathBuf,
    sampler: SamplerConfig,
    devices: Vec<DeviceInfo>,
    options: SamplingOptions,
}

impl ModelSampling {
    /// Validate a sampling invocation.
    ///
    /// Fails with [`Error::UnsupportedModelKind`] for cascade models and
    /// [`Error::InsufficientProtocol`] when the protocol does not satisfy
    /// the model, in both cases before any side effect.
    pub fn new(
        model: Model,
        problem_data: ProblemData,
        output_folder: impl Into<PathBuf>,
        options: SamplingOptions,
    ) -> Result<Self> {
        let mut model = model.into_composite()?;

        let problems = model.protocol_problems(&problem_data.protocol);
        if !problems.is_empty() {
            return Err(Error::InsufficientProtocol(problems));
        }

        model.set_double_precision(options.double_precision);
        let sampler = options
            .sampler
            .clone()
            .unwrap_or_else(|| SamplerConfig::default_for(model.name()));
        let devices = resolve_devices(options.device_indices.as_deref(), &enumerate_devices())?;

        Ok(Self {
            model,
            problem_data: problem_data.into_shared(),
            output_folder: output_folder.into(),
            sampler,
            devices,
            options,
        })
    }

    /// Execute the run and return the aggregated (or reloaded) result.
    pub fn run(self) -> Result<SamplingResult> {
        tracing::info!(model = self.model.name(), "preparing sampling run");

        let strategy = ChunkedStrategy {
            devices: self.devices,
            max_voxels_per_chunk: self.options.max_voxels_per_chunk,
            tmp_policy: self.options.tmp_dir.clone(),
        };
        let flags = RunFlags {
            recalculate: self.options.recalculate,
            initialize: self.options.initialize,
            initialize_using: self.options.initialize_using.clone(),
            store_samples: self.options.store_samples,
        };

        SampleSingleModel::new(
            self.model,
            self.problem_data,
            self.output_folder,
            self.sampler,
            strategy,
            flags,
        )?
        .run()
    }
}

/// Resumable single-model sampler.
///
/// Places output under `<output_folder>/<model_name>/samples/`. Re-invoking
/// with identical arguments and `recalculate == false` after a completed run
/// loads and returns the persisted result without recomputation.
pub struct SampleSingleModel<S> {
    model: Box<dyn CompositeModel>,
    problem_data: Arc<ProblemData>,
    output_folder: PathBuf,
    output_path: PathBuf,
    sampler: SamplerConfig,
    strategy: S,
    flags: RunFlags,
}

impl<S: ProcessingStrategy> SampleSingleModel<S> {
    /// Create a single-model sampler.
    ///
    /// Protocol sufficiency is re-checked here: callers may construct this
    /// directly, bypassing [`ModelSampling`].
    pub fn new(
        model: Box<dyn CompositeModel>,
        problem_data: Arc<ProblemData>,
        output_folder: impl Into<PathBuf>,
        sampler: SamplerConfig,
        strategy: S,
        flags: RunFlags,
    ) -> Result<Self> {
        let problems = model.protocol_problems(&problem_data.protocol);
        if !problems.is_empty() {
            return Err(Error::InsufficientProtocol(problems));
        }

        let output_folder = output_folder.into();
        let output_path = output_folder.join(model.name()).join("samples");
        Ok(Self { model, problem_data, output_folder, output_path, sampler, strategy, flags })
    }

    /// The samples directory this run reads and writes.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Run the state machine: recalculate, reuse, or (re)compute.
    pub fn run(mut self) -> Result<SamplingResult> {
        if self.flags.recalculate {
            if self.output_path.exists() {
                tracing::info!("removing existing output at {}", self.output_path.display());
                std::fs::remove_dir_all(&self.output_path)?;
            }
        } else if assess_output(&self.output_path, self.model.name()) == ResumeState::CompletedUsable
        {
            tracing::info!("not recalculating {} model, returning prior result", self.model.name());
            return SamplingResult::load(&self.output_path);
        }

        std::fs::create_dir_all(&self.output_path)?;

        self.model.set_problem_data(self.problem_data.clone())?;

        let fallback_folder = self.output_folder.join(self.model.name());
        let seeds = resolve_initialization(
            self.flags.initialize,
            &self.flags.initialize_using,
            &fallback_folder,
            &self.problem_data.mask,
        )?;
        self.model.set_initial_parameters(seeds);

        let worker = SamplingWorker::new(self.sampler.clone(), self.flags.store_samples);

        let phase = TimedPhase::start(format!("sampling {} model", self.model.name()));
        let result = self.strategy.run(
            self.model.as_ref(),
            &self.problem_data,
            &self.output_path,
            self.flags.recalculate,
            &worker,
        )?;
        phase.finish();

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resume::{read_manifest, write_manifest, CompletionManifest, SCHEMA_VERSION};
    use crate::result::VOLUME_MAPS_DIR;
    use crate::strategy::ChunkWorker;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vx_core::volume::write_volume_map;
    use vx_core::{Mask, Protocol};

    fn protocol() -> Protocol {
        Protocol::new(vec!["b".to_string()], vec![vec![0.0], vec![1.0e9]]).unwrap()
    }

    fn problem_data(n_voxels: usize) -> ProblemData {
        ProblemData::new(
            protocol(),
            vec![vec![100.0, 50.0]; n_voxels],
            Mask::all([1, 1, n_voxels]),
        )
        .unwrap()
    }

    #[test]
    fn cascade_model_is_rejected_before_any_side_effect() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let model = get_model("Adc (Cascade)").unwrap();

        let result = ModelSampling::new(model, problem_data(2), &out, SamplingOptions::default());
        match result {
            Err(Error::UnsupportedModelKind(name)) => assert_eq!(name, "Adc (Cascade)"),
            other => panic!("expected UnsupportedModelKind, got {:?}", other.err()),
        }
        assert!(!out.exists(), "no directory may be created on rejection");
    }

    #[test]
    fn insufficient_protocol_lists_the_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let bad_protocol =
            Protocol::new(vec!["delta".to_string()], vec![vec![0.02], vec![0.02]]).unwrap();
        let data = ProblemData::new(
            bad_protocol,
            vec![vec![1.0, 1.0], vec![1.0, 1.0]],
            Mask::all([1, 1, 2]),
        )
        .unwrap();

        let model = get_model("Adc").unwrap();
        let result = ModelSampling::new(model, data, &out, SamplingOptions::default());
        match result {
            Err(Error::InsufficientProtocol(problems)) => {
                assert!(problems
                    .iter()
                    .any(|p| matches!(p, vx_core::ProtocolProblem::MissingColumn { column } if column == "b")));
            }
            other => panic!("expected InsufficientProtocol, got {:?}", other.err()),
        }
        assert!(!out.exists());
    }

    /// Strategy that counts invocations and writes a loadable minimal result.
    struct CountingStrategy {
        calls: Arc<AtomicUsize>,
    }

    impl ProcessingStrategy for CountingStrategy {
        fn run(
            &self,
            model: &dyn CompositeModel,
            problem_data: &Arc<ProblemData>,
            output_path: &Path,
            _recalculate: bool,
            _worker: &dyn ChunkWorker,
        ) -> Result<SamplingResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let mask = &problem_data.mask;
            let n_active = mask.n_active();
            let mut volume_maps = std::collections::BTreeMap::new();
            let mut map_names = Vec::new();
            for name in model.parameter_names() {
                let volume = mask.unproject(&vec![1.0; n_active], 0.0)?;
                write_volume_map(output_path.join(VOLUME_MAPS_DIR), &name, &volume)?;
                map_names.push(name.clone());
                volume_maps.insert(name, volume);
            }
            write_manifest(
                output_path,
                &CompletionManifest {
                    schema_version: SCHEMA_VERSION.to_string(),
                    model_name: model.name().to_string(),
                    param_names: model.parameter_names(),
                    map_names,
                    n_active_voxels: n_active,
                    stored_samples: false,
                    created_at: chrono::Utc::now(),
                },
            )?;
            Ok(SamplingResult {
                param_names: model.parameter_names(),
                volume_maps,
                samples: None,
            })
        }
    }

    fn single_model(
        out: &Path,
        calls: Arc<AtomicUsize>,
        recalculate: bool,
    ) -> SampleSingleModel<CountingStrategy> {
        let model = get_model("Adc").unwrap().into_composite().unwrap();
        let flags = RunFlags { recalculate, initialize: false, ..RunFlags::default() };
        SampleSingleModel::new(
            model,
            problem_data(2).into_shared(),
            out,
            SamplerConfig::default(),
            CountingStrategy { calls },
            flags,
        )
        .unwrap()
    }

    #[test]
    fn second_run_is_an_idempotent_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = single_model(dir.path(), calls.clone(), false).run().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let second = single_model(dir.path(), calls.clone(), false).run().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no recomputation on resume");
        assert_eq!(second.volume_maps, first.volume_maps);
    }

    #[test]
    fn recalculate_deletes_and_recomputes() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        single_model(dir.path(), calls.clone(), false).run().unwrap();
        let samples_path = dir.path().join("Adc").join("samples");
        let first_manifest = read_manifest(&samples_path).unwrap();

        single_model(dir.path(), calls.clone(), true).run().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let second_manifest = read_manifest(&samples_path).unwrap();
        assert!(second_manifest.created_at >= first_manifest.created_at);
        assert_eq!(second_manifest.map_names, first_manifest.map_names);
    }

    #[test]
    fn stale_output_without_manifest_is_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let samples_path = dir.path().join("Adc").join("samples");
        std::fs::create_dir_all(&samples_path).unwrap();
        std::fs::write(samples_path.join("chunk_0.json"), "{}").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        single_model(dir.path(), calls.clone(), false).run().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
