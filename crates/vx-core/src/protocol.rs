//! Acquisition protocol: the table of measurement settings shared by all voxels.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the diffusion weighting column. Every built-in model requires it.
pub const B_COLUMN: &str = "b";

/// b-values at or below this threshold (s/m^2) count as unweighted.
pub const UNWEIGHTED_THRESHOLD: f64 = 25e6;

/// Two weighted b-values within this distance (s/m^2) belong to the same shell.
pub const SHELL_TOLERANCE: f64 = 25e6;

/// One distinct b-value shell in a protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shell {
    /// Representative b-value of the shell (mean of its members).
    pub b_value: f64,
    /// Number of measurements on this shell.
    pub n_measurements: usize,
}

/// Ordered sequence of measurement rows, each a mapping of named acquisition
/// parameters to numeric values.
///
/// The row count is fixed at construction and must match the measurement axis
/// of any signal data the protocol is paired with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    column_names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl Protocol {
    /// Create a protocol from column names and row-major values.
    ///
    /// Every row must have exactly one value per column.
    pub fn new(column_names: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        let width = column_names.len();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(Error::ShapeMismatch(format!(
                    "protocol row {i} has {} value(s), expected {width}",
                    row.len()
                )));
            }
        }
        Ok(Self { column_names, rows })
    }

    /// Load a protocol from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let protocol: Protocol = serde_json::from_str(&json)?;
        // Re-validate: hand-edited files may have ragged rows.
        Protocol::new(protocol.column_names, protocol.rows)
    }

    /// Save the protocol to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Number of measurement rows.
    pub fn number_of_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of acquisition columns.
    pub fn number_of_columns(&self) -> usize {
        self.column_names.len()
    }

    /// Names of the acquisition columns, in storage order.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Whether a column with the given name exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column_names.iter().any(|c| c == name)
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<f64>> {
        let idx = self
            .column_names
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::Validation(format!("protocol has no column '{name}'")))?;
        Ok(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Value of one column at one row.
    pub fn value(&self, row: usize, name: &str) -> Result<f64> {
        let column = self.column(name)?;
        column
            .get(row)
            .copied()
            .ok_or_else(|| Error::Validation(format!("protocol has no row {row}")))
    }

    /// Indices of the unweighted measurements (b-value at or below
    /// [`UNWEIGHTED_THRESHOLD`]). Empty if there is no b column.
    pub fn unweighted_indices(&self) -> Vec<usize> {
        match self.column(B_COLUMN) {
            Ok(b) => b
                .iter()
                .enumerate()
                .filter(|(_, &v)| v <= UNWEIGHTED_THRESHOLD)
                .map(|(i, _)| i)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Indices of the diffusion-weighted measurements.
    pub fn weighted_indices(&self) -> Vec<usize> {
        match self.column(B_COLUMN) {
            Ok(b) => b
                .iter()
                .enumerate()
                .filter(|(_, &v)| v > UNWEIGHTED_THRESHOLD)
                .map(|(i, _)| i)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Distinct weighted b-value shells, ascending, clustered within
    /// [`SHELL_TOLERANCE`].
    pub fn b_value_shells(&self) -> Vec<Shell> {
        let b = match self.column(B_COLUMN) {
            Ok(b) => b,
            Err(_) => return Vec::new(),
        };
        let mut weighted: Vec<f64> = self
            .weighted_indices()
            .into_iter()
            .map(|i| b[i])
            .collect();
        weighted.sort_by(|a, b| a.partial_cmp(b).expect("b-values must not be NaN"));

        let mut shells: Vec<Shell> = Vec::new();
        for value in weighted {
            match shells.last_mut() {
                Some(shell) if value - shell.b_value <= SHELL_TOLERANCE => {
                    // Running mean keeps the representative value centered.
                    let n = shell.n_measurements as f64;
                    shell.b_value = (shell.b_value * n + value) / (n + 1.0);
                    shell.n_measurements += 1;
                }
                _ => shells.push(Shell { b_value: value, n_measurements: 1 }),
            }
        }
        shells
    }

    /// A new protocol containing only the given rows, in the given order.
    pub fn with_rows(&self, indices: &[usize]) -> Result<Self> {
        let mut rows = Vec::with_capacity(indices.len());
        for &i in indices {
            let row = self
                .rows
                .get(i)
                .ok_or_else(|| {
                    Error::Validation(format!(
                        "row index {i} out of range for protocol with {} row(s)",
                        self.rows.len()
                    ))
                })?
                .clone();
            rows.push(row);
        }
        Ok(Self { column_names: self.column_names.clone(), rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_protocol() -> Protocol {
        // 2 unweighted rows, then two shells of 2 rows each.
        Protocol::new(
            vec!["b".to_string(), "delta".to_string()],
            vec![
                vec![0.0, 0.02],
                vec![0.0, 0.02],
                vec![1.0e9, 0.02],
                vec![1.0e9, 0.02],
                vec![3.0e9, 0.02],
                vec![3.0e9, 0.02],
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_ragged_rows() {
        let result = Protocol::new(vec!["b".to_string()], vec![vec![0.0], vec![0.0, 1.0]]);
        assert!(matches!(result, Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn unweighted_and_weighted_indices() {
        let p = test_protocol();
        assert_eq!(p.unweighted_indices(), vec![0, 1]);
        assert_eq!(p.weighted_indices(), vec![2, 3, 4, 5]);
    }

    #[test]
    fn shells_are_clustered_and_counted() {
        let p = test_protocol();
        let shells = p.b_value_shells();
        assert_eq!(shells.len(), 2);
        assert_eq!(shells[0].b_value, 1.0e9);
        assert_eq!(shells[0].n_measurements, 2);
        assert_eq!(shells[1].b_value, 3.0e9);
    }

    #[test]
    fn row_subset_preserves_order() {
        let p = test_protocol();
        let sub = p.with_rows(&[4, 0]).unwrap();
        assert_eq!(sub.number_of_rows(), 2);
        assert_eq!(sub.value(0, "b").unwrap(), 3.0e9);
        assert_eq!(sub.value(1, "b").unwrap(), 0.0);
    }

    #[test]
    fn json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protocol.json");
        let p = test_protocol();
        p.save(&path).unwrap();
        let loaded = Protocol::load(&path).unwrap();
        assert_eq!(loaded, p);
    }
}
