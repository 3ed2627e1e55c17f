//! Dense direct solve of the balance system.
//!
//! The rate matrix is at most a few tens of levels wide, so an LU
//! decomposition with partial pivoting is both exact enough and cheap.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

use crate::solver::SolverError;

/// Solve `matrix · x = rhs` by LU decomposition with partial pivoting.
///
/// # Arguments
/// * `matrix` - Square balance matrix, rows are equations.
/// * `rhs` - Right-hand side, same length as the matrix dimension.
/// * `label` - Species label, carried into the error.
///
/// # Returns
/// The solution vector, or [`SolverError::SingularSystem`] when a pivot
/// vanishes or the solution is not finite.
pub fn solve_direct(
    matrix: &Array2<f64>,
    rhs: &Array1<f64>,
    label: &str,
) -> Result<Array1<f64>, SolverError> {
    let dim = matrix.nrows();
    if dim != matrix.ncols() {
        return Err(SolverError::DimensionMismatch {
            expected: dim,
            actual: matrix.ncols(),
        });
    }
    if dim != rhs.len() {
        return Err(SolverError::DimensionMismatch {
            expected: dim,
            actual: rhs.len(),
        });
    }

    let a = DMatrix::from_fn(dim, dim, |i, j| matrix[[i, j]]);
    let b = DVector::from_iterator(dim, rhs.iter().copied());

    let singular = || SolverError::SingularSystem {
        label: label.to_string(),
    };
    let x = a.lu().solve(&b).ok_or_else(singular)?;
    if x.iter().any(|v| !v.is_finite()) {
        return Err(singular());
    }

    Ok(Array1::from_iter(x.iter().copied()))
}
