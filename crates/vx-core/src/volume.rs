//! Scalar volumes and the on-disk volume-map format.
//!
//! A volume map directory holds one JSON file per map, keyed by file stem
//! (`Adc.d.json` → map `"Adc.d"`). Writes go through a temp file and a rename
//! so a crash never leaves a half-written map behind.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A dense 3-D scalar volume, row-major over `[x, y, z]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    /// Spatial dimensions.
    pub dims: [usize; 3],
    /// Flat voxel values, `dims[0] * dims[1] * dims[2]` entries.
    pub data: Vec<f64>,
}

impl Volume {
    /// Create a volume, validating the value count against the dimensions.
    pub fn new(dims: [usize; 3], data: Vec<f64>) -> Result<Self> {
        let expected = dims[0] * dims[1] * dims[2];
        if data.len() != expected {
            return Err(Error::ShapeMismatch(format!(
                "volume with dims {dims:?} needs {expected} value(s), got {}",
                data.len()
            )));
        }
        Ok(Self { dims, data })
    }

    /// Total number of voxels.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the volume has zero voxels.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read a volume from a JSON file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let volume: Volume = serde_json::from_str(&json)?;
        Volume::new(volume.dims, volume.data)
    }

    /// Write the volume to a JSON file atomically (write-then-rename).
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json_atomic(path.as_ref(), self)
    }
}

/// Serialize a value to `path` via a sibling temp file and an atomic rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Read every `*.json` volume in a directory, keyed by file stem.
///
/// Returns an empty map if the directory does not exist.
pub fn read_volume_maps(dir: impl AsRef<Path>) -> Result<BTreeMap<String, Volume>> {
    let dir = dir.as_ref();
    let mut maps = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(maps);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        maps.insert(stem.to_string(), Volume::read(&path)?);
    }
    Ok(maps)
}

/// Write one named volume map into `dir`, creating the directory if needed.
pub fn write_volume_map(dir: impl AsRef<Path>, name: &str, volume: &Volume) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    volume.write(dir.join(format!("{name}.json")))
}
