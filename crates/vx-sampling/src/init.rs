//! Initialization resolver: parameter seeds from prior optimization output.
//!
//! Three mutually exclusive source modes, expressed as a tagged union so the
//! dispatch happens once at the call boundary instead of by runtime type
//! inspection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use vx_core::error::Error;
use vx_core::volume::{read_volume_maps, Volume};
use vx_core::{InitValue, InitializationMap, Mask, Result};

/// One explicitly supplied seed source for a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum InitSpec {
    /// Load a volume from this file and mask-project it.
    VolumeFile(PathBuf),
    /// Use this constant for every voxel.
    Scalar(f64),
    /// Mask-project this in-memory volume.
    Volume(Volume),
}

/// Where to take initialization maps from.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InitializeUsing {
    /// The sibling optimization-output folder for the same model name.
    #[default]
    DefaultFolder,
    /// An arbitrary folder of volume maps.
    Folder(PathBuf),
    /// An explicit per-parameter mapping.
    Explicit(BTreeMap<String, InitSpec>),
}

/// Resolve the initialization map for a run.
///
/// With `initialize == false` this returns an empty map and the model falls
/// back to its own defaults. Otherwise the resolved map must be non-empty:
/// silently proceeding without requested seeds could silently change
/// results, so an empty resolution is fatal.
pub fn resolve_initialization(
    initialize: bool,
    using: &InitializeUsing,
    fallback_folder: &Path,
    mask: &Mask,
) -> Result<InitializationMap> {
    if !initialize {
        return Ok(InitializationMap::new());
    }

    let maps = match using {
        InitializeUsing::DefaultFolder => {
            tracing::info!("initializing sampler using maps in {}", fallback_folder.display());
            project_folder(fallback_folder, mask)?
        }
        InitializeUsing::Folder(folder) => {
            tracing::info!("initializing sampler using maps in {}", folder.display());
            project_folder(folder, mask)?
        }
        InitializeUsing::Explicit(specs) => {
            tracing::info!("initializing sampler using {} given map(s)", specs.len());
            let mut maps = InitializationMap::new();
            for (name, spec) in specs {
                let value = match spec {
                    InitSpec::VolumeFile(path) => {
                        InitValue::PerVoxel(mask.project(&Volume::read(path)?)?)
                    }
                    InitSpec::Scalar(value) => InitValue::Scalar(*value),
                    InitSpec::Volume(volume) => InitValue::PerVoxel(mask.project(volume)?),
                };
                maps.insert(name.clone(), value);
            }
            maps
        }
    };

    if maps.is_empty() {
        let source = match using {
            InitializeUsing::DefaultFolder => fallback_folder.display().to_string(),
            InitializeUsing::Folder(folder) => folder.display().to_string(),
            InitializeUsing::Explicit(_) => "the explicit mapping".to_string(),
        };
        return Err(Error::NoInitializationMapsFound(source));
    }
    Ok(maps)
}

fn project_folder(folder: &Path, mask: &Mask) -> Result<InitializationMap> {
    let mut maps = InitializationMap::new();
    for (name, volume) in read_volume_maps(folder)? {
        maps.insert(name, InitValue::PerVoxel(mask.project(&volume)?));
    }
    Ok(maps)
}
