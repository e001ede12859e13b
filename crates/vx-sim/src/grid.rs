//! Combinatorial parameter grids for simulation sweeps.
//!
//! A grid is the cartesian product of linearly spaced ranges over a chosen
//! subset of a model's parameters, with every other parameter pinned to its
//! default. The first varying index changes fastest; [`permuted_indices`]
//! yields the matching grid coordinates so a combination can be mapped back
//! to the cell it came from.

use vx_core::error::Error;
use vx_core::Result;

/// Number of grid points per varying parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridSize {
    /// The same number of points for every varying parameter.
    Uniform(usize),
    /// One count per varying parameter, in `varying_indices` order.
    PerParameter(Vec<usize>),
}

impl GridSize {
    /// Per-parameter point counts for `n_varying` varying parameters.
    fn resolve(&self, n_varying: usize) -> Result<Vec<usize>> {
        match self {
            GridSize::Uniform(n) => Ok(vec![*n; n_varying]),
            GridSize::PerParameter(sizes) => {
                if sizes.len() != n_varying {
                    return Err(Error::ShapeMismatch(format!(
                        "{} grid size(s) for {n_varying} varying parameter(s)",
                        sizes.len()
                    )));
                }
                Ok(sizes.clone())
            }
        }
    }
}

/// `n` values linearly spaced from `lo` to `hi`, both endpoints included.
pub fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lo],
        _ => {
            let step = (hi - lo) / (n - 1) as f64;
            (0..n).map(|i| lo + step * i as f64).collect()
        }
    }
}

/// Build the full parameter combination matrix.
///
/// Each entry of `varying_indices` selects a column of the output to sweep
/// from `lower[index]` to `upper[index]`; all other columns hold their
/// `defaults` value on every row. Output shape is `(∏ grid, defaults.len())`
/// with the first varying index changing fastest.
pub fn permutate_parameters(
    varying_indices: &[usize],
    defaults: &[f64],
    lower: &[f64],
    upper: &[f64],
    grid: &GridSize,
) -> Result<Vec<Vec<f64>>> {
    let n_params = defaults.len();
    if lower.len() != n_params || upper.len() != n_params {
        return Err(Error::ShapeMismatch(format!(
            "defaults/lower/upper lengths differ: {n_params}/{}/{}",
            lower.len(),
            upper.len()
        )));
    }
    for &index in varying_indices {
        if index >= n_params {
            return Err(Error::ShapeMismatch(format!(
                "varying index {index} out of range for {n_params} parameter(s)"
            )));
        }
    }
    let sizes = grid.resolve(varying_indices.len())?;

    let values: Vec<Vec<f64>> = varying_indices
        .iter()
        .zip(&sizes)
        .map(|(&index, &n)| linspace(lower[index], upper[index], n))
        .collect();

    let indices = tiled_indices(&sizes);
    let mut rows = Vec::with_capacity(indices.len());
    for coords in &indices {
        let mut row = defaults.to_vec();
        for (i, &param) in varying_indices.iter().enumerate() {
            row[param] = values[i][coords[i]];
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Grid coordinates of every combination, in lockstep with
/// [`permutate_parameters`]: row `k`, column `i` is the index into the
/// linspace of the i-th varying parameter.
pub fn permuted_indices(n_varying: usize, grid: &GridSize) -> Result<Vec<Vec<usize>>> {
    Ok(tiled_indices(&grid.resolve(n_varying)?))
}

fn tiled_indices(sizes: &[usize]) -> Vec<Vec<usize>> {
    let n_rows: usize = sizes.iter().product();
    let mut rows = Vec::with_capacity(n_rows);
    for k in 0..n_rows {
        let mut stride = 1;
        let coords = sizes
            .iter()
            .map(|&n| {
                let c = (k / stride) % n;
                stride *= n;
                c
            })
            .collect();
        rows.push(coords);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn linspace_includes_both_endpoints() {
        let values = linspace(0.0, 2.0, 5);
        assert_eq!(values.len(), 5);
        assert_relative_eq!(values[0], 0.0);
        assert_relative_eq!(values[2], 1.0);
        assert_relative_eq!(values[4], 2.0);
        assert_eq!(linspace(7.0, 9.0, 1), vec![7.0]);
    }

    #[test]
    fn row_count_is_the_grid_product_and_defaults_hold() {
        let rows = permutate_parameters(
            &[0, 2],
            &[1.0, 2.0, 3.0, 4.0],
            &[0.0, 0.0, 10.0, 0.0],
            &[1.0, 0.0, 20.0, 0.0],
            &GridSize::PerParameter(vec![4, 5]),
        )
        .unwrap();

        assert_eq!(rows.len(), 20);
        for row in &rows {
            assert_eq!(row.len(), 4);
            assert_eq!(row[1], 2.0);
            assert_eq!(row[3], 4.0);
        }
        // Each varying column realizes both bounds.
        assert!(rows.iter().any(|r| r[0] == 0.0));
        assert!(rows.iter().any(|r| r[0] == 1.0));
        assert!(rows.iter().any(|r| r[2] == 10.0));
        assert!(rows.iter().any(|r| r[2] == 20.0));
    }

    #[test]
    fn uniform_grid_broadcasts_to_all_varying_parameters() {
        let rows = permutate_parameters(
            &[0, 1],
            &[0.0, 0.0],
            &[0.0, 0.0],
            &[1.0, 1.0],
            &GridSize::Uniform(3),
        )
        .unwrap();
        assert_eq!(rows.len(), 9);
    }

    #[test]
    fn mismatched_grid_length_fails_fast() {
        let result = permutate_parameters(
            &[0, 1],
            &[0.0, 0.0],
            &[0.0, 0.0],
            &[1.0, 1.0],
            &GridSize::PerParameter(vec![3]),
        );
        assert!(matches!(result, Err(Error::ShapeMismatch(_))));

        let result = permuted_indices(2, &GridSize::PerParameter(vec![3, 2, 2]));
        assert!(matches!(result, Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn out_of_range_varying_index_fails_fast() {
        let result =
            permutate_parameters(&[3], &[0.0, 0.0], &[0.0, 0.0], &[1.0, 1.0], &GridSize::Uniform(2));
        assert!(matches!(result, Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn indices_reproduce_the_values() {
        let varying = [0usize, 1];
        let lower = [0.0, -1.0, 0.0];
        let upper = [2.0, 1.0, 0.0];
        let grid = GridSize::PerParameter(vec![3, 4]);

        let rows =
            permutate_parameters(&varying, &[9.0, 9.0, 9.0], &lower, &upper, &grid).unwrap();
        let indices = permuted_indices(varying.len(), &grid).unwrap();

        assert_eq!(rows.len(), indices.len());
        for (row, coords) in rows.iter().zip(&indices) {
            for (i, &param) in varying.iter().enumerate() {
                let values = linspace(lower[param], upper[param], if i == 0 { 3 } else { 4 });
                assert_relative_eq!(row[param], values[coords[i]]);
            }
        }
    }

    #[test]
    fn documented_six_row_scenario() {
        let rows = permutate_parameters(
            &[0, 1],
            &[1.0, 2.0, 3.0],
            &[0.0, 0.0, 3.0],
            &[2.0, 4.0, 3.0],
            &GridSize::PerParameter(vec![3, 2]),
        )
        .unwrap();

        // First varying index fastest: column 0 cycles {0,1,2} inside each
        // column-1 value {0,4}; column 2 is pinned at its default.
        let expected = [
            [0.0, 0.0, 3.0],
            [1.0, 0.0, 3.0],
            [2.0, 0.0, 3.0],
            [0.0, 4.0, 3.0],
            [1.0, 4.0, 3.0],
            [2.0, 4.0, 3.0],
        ];
        assert_eq!(rows.len(), 6);
        for (row, expected) in rows.iter().zip(&expected) {
            assert_eq!(row.as_slice(), expected);
        }
    }
}
