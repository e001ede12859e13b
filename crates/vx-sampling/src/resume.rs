//! Resumability gate: completion manifest and output-state assessment.
//!
//! Directory existence alone is not crash-atomic, so completeness is marked
//! by a small manifest written atomically as the very last step of a run.
//! A valid manifest whose listed maps are all present means the output is
//! trusted complete; anything else is either fresh or resumable-at-chunk
//! granularity by the processing strategy.
//!
//! Concurrent writers to one `(output_folder, model_name)` pair are not
//! supported; callers must serialize access externally.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vx_core::volume::write_json_atomic;
use vx_core::Result;

/// Manifest file name inside a model's samples directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Current manifest schema version.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Completion marker for one model's sampling output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionManifest {
    /// Manifest schema version for forward compatibility.
    pub schema_version: String,
    /// Name of the sampled model.
    pub model_name: String,
    /// Fully qualified parameter names of the model.
    pub param_names: Vec<String>,
    /// Names of the expected volume maps.
    pub map_names: Vec<String>,
    /// Number of active voxels covered by the run.
    pub n_active_voxels: usize,
    /// Whether full sample chains were persisted alongside the maps.
    pub stored_samples: bool,
    /// When the run completed.
    pub created_at: DateTime<Utc>,
}

/// State of an output directory at run entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeState {
    /// No prior output; compute everything.
    Fresh,
    /// A complete, trusted result exists; load and return it.
    CompletedUsable,
    /// Partial prior content; the strategy resumes at chunk granularity.
    StaleIncomplete,
}

/// Write the manifest atomically into `samples_path`.
pub fn write_manifest(samples_path: &Path, manifest: &CompletionManifest) -> Result<()> {
    write_json_atomic(&samples_path.join(MANIFEST_FILE), manifest)
}

/// Read the manifest if present and parseable.
pub fn read_manifest(samples_path: &Path) -> Option<CompletionManifest> {
    let path = samples_path.join(MANIFEST_FILE);
    let json = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&json).ok()
}

/// Assess the output directory for `model_name` at `samples_path`.
pub fn assess_output(samples_path: &Path, model_name: &str) -> ResumeState {
    if let Some(manifest) = read_manifest(samples_path) {
        let maps_dir = samples_path.join("volume_maps");
        let all_present = manifest
            .map_names
            .iter()
            .all(|name| maps_dir.join(format!("{name}.json")).is_file());
        if manifest.model_name == model_name && all_present {
            return ResumeState::CompletedUsable;
        }
        return ResumeState::StaleIncomplete;
    }

    match std::fs::read_dir(samples_path) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                ResumeState::StaleIncomplete
            } else {
                ResumeState::Fresh
            }
        }
        Err(_) => ResumeState::Fresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vx_core::volume::{write_volume_map, Volume};

    fn manifest(map_names: Vec<String>) -> CompletionManifest {
        CompletionManifest {
            schema_version: SCHEMA_VERSION.to_string(),
            model_name: "Adc".to_string(),
            param_names: vec!["S0.s0".to_string(), "Adc.d".to_string()],
            map_names,
            n_active_voxels: 2,
            stored_samples: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn missing_directory_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let state = assess_output(&dir.path().join("nothing"), "Adc");
        assert_eq!(state, ResumeState::Fresh);
    }

    #[test]
    fn content_without_manifest_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("chunk_0.json"), "{}").unwrap();
        assert_eq!(assess_output(dir.path(), "Adc"), ResumeState::StaleIncomplete);
    }

    #[test]
    fn manifest_with_all_maps_is_complete() {
        let dir = tempfile::tempdir().unwrap();
        let volume = Volume::new([1, 1, 2], vec![1.0, 2.0]).unwrap();
        let maps_dir = dir.path().join("volume_maps");
        write_volume_map(&maps_dir, "Adc.d", &volume).unwrap();
        write_manifest(dir.path(), &manifest(vec!["Adc.d".to_string()])).unwrap();

        assert_eq!(assess_output(dir.path(), "Adc"), ResumeState::CompletedUsable);
    }

    #[test]
    fn manifest_with_missing_map_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), &manifest(vec!["Adc.d".to_string()])).unwrap();
        assert_eq!(assess_output(dir.path(), "Adc"), ResumeState::StaleIncomplete);
    }

    #[test]
    fn manifest_for_other_model_is_not_trusted() {
        let dir = tempfile::tempdir().unwrap();
        let volume = Volume::new([1, 1, 2], vec![1.0, 2.0]).unwrap();
        write_volume_map(dir.path().join("volume_maps"), "Adc.d", &volume).unwrap();
        write_manifest(dir.path(), &manifest(vec!["Adc.d".to_string()])).unwrap();

        assert_eq!(assess_output(dir.path(), "BallStick"), ResumeState::StaleIncomplete);
    }

    #[test]
    fn manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let m = manifest(vec!["S0.s0".to_string()]);
        write_manifest(dir.path(), &m).unwrap();
        assert_eq!(read_manifest(dir.path()).unwrap(), m);
    }
}
