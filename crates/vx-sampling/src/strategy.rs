//! Chunked, device-distributed processing strategy.
//!
//! The strategy partitions the masked voxel domain into chunks, dispatches
//! each chunk to a worker on one of the configured devices, and persists
//! every chunk's output to the temp-results directory before the run
//! completes. Re-running against the same output path skips chunks whose
//! persisted output is still valid, unless a recalculation is forced.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use vx_compute::DeviceInfo;
use vx_core::error::Error;
use vx_core::volume::{write_json_atomic, write_volume_map};
use vx_core::{CompositeModel, ProblemData, Result};

use crate::result::{SamplingResult, CHAINS_DIR, VOLUME_MAPS_DIR};
use crate::resume::{write_manifest, CompletionManifest, SCHEMA_VERSION};

/// Default temp-results directory name under the output path.
pub const TMP_RESULTS_DIR: &str = "tmp_results";

/// Where the strategy keeps its incremental per-chunk results.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TmpDirPolicy {
    /// Under the output path; removed after a successful run.
    #[default]
    Default,
    /// An explicit directory; left in place for inspection or reuse.
    Custom(PathBuf),
    /// No persistence: chunks are computed in memory, losing chunk-level
    /// resume.
    Disabled,
}

/// Output of one processed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkResult {
    /// Position of this chunk in the chunk sequence.
    pub chunk_index: usize,
    /// Offset of this chunk's first voxel in the active-voxel list.
    pub roi_start: usize,
    /// Flat grid indices of the voxels in this chunk.
    pub voxels: Vec<usize>,
    /// Posterior means, `(voxel in chunk, parameter)`.
    pub means: Vec<Vec<f64>>,
    /// Posterior standard deviations, `(voxel in chunk, parameter)`.
    pub stds: Vec<Vec<f64>>,
    /// Raw draws, `(voxel in chunk, draw, parameter)`, when stored.
    pub samples: Option<Vec<Vec<Vec<f64>>>>,
}

/// A per-chunk computation. Implementations must be safely re-invocable
/// across chunks; no teardown is required between calls.
pub trait ChunkWorker: Send + Sync {
    /// Process the given voxels (flat grid indices; `roi_start` is their
    /// offset into the active-voxel list) on the given device.
    fn process(
        &self,
        model: &dyn CompositeModel,
        chunk_index: usize,
        roi_start: usize,
        voxels: &[usize],
        device: &DeviceInfo,
    ) -> Result<ChunkResult>;

    /// Whether chunks produced by this worker carry raw sample draws.
    /// Persisted chunks whose sample presence differs are not reusable.
    fn wants_samples(&self) -> bool;
}

/// The consumed strategy contract: partition, dispatch, persist, aggregate.
pub trait ProcessingStrategy {
    /// Run the full voxel domain of `problem_data` through `worker`,
    /// persisting into `output_path` and returning the aggregated result.
    fn run(
        &self,
        model: &dyn CompositeModel,
        problem_data: &Arc<ProblemData>,
        output_path: &Path,
        recalculate: bool,
        worker: &dyn ChunkWorker,
    ) -> Result<SamplingResult>;
}

/// Chunked strategy distributing work round-robin over the configured
/// devices via the rayon pool.
pub struct ChunkedStrategy {
    /// Resolved compute devices; fixed for the whole run.
    pub devices: Vec<DeviceInfo>,
    /// Upper bound on voxels per chunk.
    pub max_voxels_per_chunk: usize,
    /// Temp-results directory policy.
    pub tmp_policy: TmpDirPolicy,
}

impl ChunkedStrategy {
    fn tmp_dir(&self, output_path: &Path) -> Option<PathBuf> {
        match &self.tmp_policy {
            TmpDirPolicy::Default => Some(output_path.join(TMP_RESULTS_DIR)),
            TmpDirPolicy::Custom(dir) => Some(dir.clone()),
            TmpDirPolicy::Disabled => None,
        }
    }

    fn process_chunk(
        &self,
        model: &dyn CompositeModel,
        worker: &dyn ChunkWorker,
        tmp_dir: Option<&Path>,
        recalculate: bool,
        chunk_index: usize,
        roi_start: usize,
        voxels: &[usize],
    ) -> Result<ChunkResult> {
        let device = &self.devices[chunk_index % self.devices.len()];
        let n_params = model.parameter_names().len();

        let chunk_file = tmp_dir.map(|dir| dir.join(format!("chunk_{chunk_index}.json")));
        if let Some(path) = &chunk_file {
            if !recalculate && path.is_file() {
                match Self::read_chunk(path) {
                    Ok(prior)
                        if chunk_is_reusable(&prior, voxels, n_params, worker.wants_samples()) =>
                    {
                        tracing::debug!(chunk_index, "reusing persisted chunk");
                        return Ok(prior);
                    }
                    Ok(_) => {
                        log::warn!(
                            "chunk file {} does not match this run, recomputing",
                            path.display()
                        );
                    }
                    Err(e) => {
                        log::warn!("unreadable chunk file {}: {e}, recomputing", path.display());
                    }
                }
            }
        }

        tracing::debug!(chunk_index, device = %device.name, n_voxels = voxels.len(), "processing chunk");
        let result = worker.process(model, chunk_index, roi_start, voxels, device)?;
        if let Some(path) = &chunk_file {
            write_json_atomic(path, &result)?;
        }
        Ok(result)
    }

    fn read_chunk(path: &Path) -> Result<ChunkResult> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Whether a persisted chunk can stand in for recomputing `voxels`.
///
/// Guards against truncated or hand-edited chunk files: every per-voxel
/// array must have the expected row count and parameter width, and the
/// presence of raw draws must match what the worker would produce now.
fn chunk_is_reusable(
    prior: &ChunkResult,
    voxels: &[usize],
    n_params: usize,
    wants_samples: bool,
) -> bool {
    if prior.voxels != voxels {
        return false;
    }
    let n = voxels.len();
    if prior.means.len() != n || prior.stds.len() != n {
        return false;
    }
    if prior.means.iter().any(|row| row.len() != n_params)
        || prior.stds.iter().any(|row| row.len() != n_params)
    {
        return false;
    }
    match &prior.samples {
        Some(samples) if wants_samples => {
            samples.len() == n
                && samples.iter().all(|draws| draws.iter().all(|d| d.len() == n_params))
        }
        None if !wants_samples => true,
        _ => false,
    }
}

impl ProcessingStrategy for ChunkedStrategy {
    fn run(
        &self,
        model: &dyn CompositeModel,
        problem_data: &Arc<ProblemData>,
        output_path: &Path,
        recalculate: bool,
        worker: &dyn ChunkWorker,
    ) -> Result<SamplingResult> {
        if self.devices.is_empty() {
            return Err(Error::Validation("no compute devices configured".to_string()));
        }
        if self.max_voxels_per_chunk == 0 {
            return Err(Error::Validation("max_voxels_per_chunk must be >= 1".to_string()));
        }
        let active = problem_data.mask.active_indices();
        if active.is_empty() {
            return Err(Error::Validation("mask selects no voxels".to_string()));
        }

        let tmp_dir = self.tmp_dir(output_path);
        if let Some(dir) = &tmp_dir {
            std::fs::create_dir_all(dir)?;
        }

        let chunks: Vec<(usize, usize, &[usize])> = active
            .chunks(self.max_voxels_per_chunk)
            .enumerate()
            .map(|(i, voxels)| (i, i * self.max_voxels_per_chunk, voxels))
            .collect();
        tracing::info!(
            n_chunks = chunks.len(),
            n_voxels = active.len(),
            n_devices = self.devices.len(),
            "dispatching chunks"
        );

        let results: Vec<ChunkResult> = chunks
            .par_iter()
            .map(|&(chunk_index, roi_start, voxels)| {
                self.process_chunk(
                    model,
                    worker,
                    tmp_dir.as_deref(),
                    recalculate,
                    chunk_index,
                    roi_start,
                    voxels,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let result = aggregate(model, problem_data, output_path, &results)?;

        // Incremental results are only needed for resuming; a completed run
        // can drop the default temp dir. Custom dirs are left to the caller.
        if self.tmp_policy == TmpDirPolicy::Default {
            if let Some(dir) = &tmp_dir {
                if let Err(e) = std::fs::remove_dir_all(dir) {
                    log::warn!("could not remove temp results dir {}: {e}", dir.display());
                }
            }
        }

        Ok(result)
    }
}

/// Merge chunk results into volume maps and chains, persist them, and write
/// the completion manifest last.
fn aggregate(
    model: &dyn CompositeModel,
    problem_data: &Arc<ProblemData>,
    output_path: &Path,
    results: &[ChunkResult],
) -> Result<SamplingResult> {
    let param_names = model.parameter_names();
    let n_params = param_names.len();
    let mask = &problem_data.mask;
    let n_active = mask.n_active();

    let mut means = vec![vec![0.0; n_active]; n_params];
    let mut stds = vec![vec![0.0; n_active]; n_params];
    let stored_samples = results.iter().all(|c| c.samples.is_some());
    if !stored_samples && results.iter().any(|c| c.samples.is_some()) {
        log::warn!("some chunks carry raw draws and some do not; persisting summary maps only");
    }
    let mut chains: Vec<Vec<Vec<f64>>> = vec![vec![Vec::new(); n_active]; n_params];

    for chunk in results {
        for (j, _) in chunk.voxels.iter().enumerate() {
            let roi = chunk.roi_start + j;
            if roi >= n_active {
                return Err(Error::ShapeMismatch(format!(
                    "chunk {} addresses roi voxel {roi}, only {n_active} active",
                    chunk.chunk_index
                )));
            }
            for p in 0..n_params {
                means[p][roi] = chunk.means[j][p];
                stds[p][roi] = chunk.stds[j][p];
            }
            if stored_samples {
                if let Some(samples) = &chunk.samples {
                    for p in 0..n_params {
                        chains[p][roi] = samples[j].iter().map(|draw| draw[p]).collect();
                    }
                }
            }
        }
    }

    let maps_dir = output_path.join(VOLUME_MAPS_DIR);
    let mut volume_maps = std::collections::BTreeMap::new();
    for (p, name) in param_names.iter().enumerate() {
        let mean_volume = mask.unproject(&means[p], 0.0)?;
        let std_volume = mask.unproject(&stds[p], 0.0)?;
        write_volume_map(&maps_dir, name, &mean_volume)?;
        write_volume_map(&maps_dir, &format!("{name}.std"), &std_volume)?;
        volume_maps.insert(name.clone(), mean_volume);
        volume_maps.insert(format!("{name}.std"), std_volume);
    }

    let samples = if stored_samples {
        let chains_dir = output_path.join(CHAINS_DIR);
        std::fs::create_dir_all(&chains_dir)?;
        let mut by_param = std::collections::BTreeMap::new();
        for (p, name) in param_names.iter().enumerate() {
            write_json_atomic(&chains_dir.join(format!("{name}.json")), &chains[p])?;
            by_param.insert(name.clone(), std::mem::take(&mut chains[p]));
        }
        Some(by_param)
    } else {
        None
    };

    let manifest = CompletionManifest {
        schema_version: SCHEMA_VERSION.to_string(),
        model_name: model.name().to_string(),
        param_names: param_names.clone(),
        map_names: volume_maps.keys().cloned().collect(),
        n_active_voxels: n_active,
        stored_samples,
        created_at: chrono::Utc::now(),
    };
    write_manifest(output_path, &manifest)?;

    Ok(SamplingResult { param_names, volume_maps, samples })
}
