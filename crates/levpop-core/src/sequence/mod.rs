//! Isoelectronic-sequence model atoms.
//!
//! Each sequence fixes the level structure and statistical weights of its
//! ground configuration, so callers only hand over the radiative lines and
//! a few collision strengths. Results are written to a [`CoolingLedger`]
//! under the caller's label as well as returned.
//!
//! [`CoolingLedger`]: crate::cooling::CoolingLedger

pub mod beryllium;
pub mod boron;

pub use beryllium::{solve_beryllium_like, BerylliumAtom, BerylliumSolution};
pub use boron::{solve_boron_like, BoronAtom, BoronSolution};

/// Whether a line's statistical weight is the one the sequence fixes, to
/// single precision.
pub(crate) fn weight_matches(g: f64, expected: f64) -> bool {
    (g / expected - 1.0).abs() < f32::EPSILON as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_matches_to_single_precision() {
        assert!(weight_matches(3.0, 3.0));
        assert!(weight_matches(3.0 + 1.0e-9, 3.0));
        assert!(!weight_matches(3.001, 3.0));
        assert!(!weight_matches(5.0, 3.0));
    }
}
