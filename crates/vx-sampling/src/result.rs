//! Persisted sampling results and their on-disk layout.
//!
//! Layout under `<output_folder>/<model_name>/samples/`:
//!
//! ```text
//! manifest.json            completion marker, written last
//! volume_maps/<map>.json   one volume per derived summary map
//! chains/<param>.json      per-parameter sample chains (when stored)
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use vx_core::error::Error;
use vx_core::volume::read_volume_maps;
use vx_core::{Result, Volume};

use crate::resume::read_manifest;

/// Subdirectory holding the derived summary volume maps.
pub const VOLUME_MAPS_DIR: &str = "volume_maps";

/// Subdirectory holding raw per-parameter sample chains.
pub const CHAINS_DIR: &str = "chains";

/// Aggregated result of one model sampling run.
///
/// Written by the processing strategy under orchestrator supervision;
/// read back by any later run that resumes the same output path.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingResult {
    /// Fully qualified parameter names of the sampled model.
    pub param_names: Vec<String>,
    /// Derived summary maps: posterior mean per parameter plus `.std` maps.
    pub volume_maps: BTreeMap<String, Volume>,
    /// Per-parameter chains, `(active voxel, draw)`, when samples were stored.
    pub samples: Option<BTreeMap<String, Vec<Vec<f64>>>>,
}

impl SamplingResult {
    /// Load a completed result from a model's samples directory.
    ///
    /// Fails if no completion manifest is present; partial output is never
    /// loadable through this path.
    pub fn load(samples_path: &Path) -> Result<Self> {
        let manifest = read_manifest(samples_path).ok_or_else(|| {
            Error::Validation(format!(
                "no completed sampling output at {}",
                samples_path.display()
            ))
        })?;

        let volume_maps = read_volume_maps(samples_path.join(VOLUME_MAPS_DIR))?;

        let samples = if manifest.stored_samples {
            let chains_dir = samples_path.join(CHAINS_DIR);
            let mut chains = BTreeMap::new();
            for name in &manifest.param_names {
                let json = std::fs::read_to_string(chains_dir.join(format!("{name}.json")))?;
                chains.insert(name.clone(), serde_json::from_str(&json)?);
            }
            Some(chains)
        } else {
            None
        };

        Ok(Self { param_names: manifest.param_names, volume_maps, samples })
    }

    /// One summary map by name, if present.
    pub fn map(&self, name: &str) -> Option<&Volume> {
        self.volume_maps.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_without_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SamplingResult::load(dir.path()).is_err());
    }
}
