//! Closed-form three-level atom.
//!
//! The two balance equations for levels 2 and 3 are eliminated by hand
//! instead of going through a generic matrix solve:
//!
//! $$ n_2 \alpha = n_1 c_{12} + n_3 (c_{32} + A_{32}) $$
//! $$ n_3 \beta  = n_1 c_{13} + n_2 c_{23} $$
//!
//! with $\alpha = A_{21} + c_{21} + c_{23} + \gamma_2$ and
//! $\beta = A_{31} + A_{32} + c_{31} + c_{32}$. Solving for $n_1 = 1$ and
//! rescaling to the abundance gives all three populations.

use serde::{Deserialize, Serialize};

use crate::physics::{boltzmann_factor, Conditions, SMALLFLOAT};

/// `E/kT` of the 1→2 gap beyond which the atom is cold unless driven.
const MAX_EXCITATION_RATIO: f64 = 20.0;

/// Atomic data of a three-level atom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThreeLevelAtom {
    /// Statistical weights of levels 1, 2 and 3.
    pub weights: [f64; 3],
    pub omega12: f64,
    pub omega13: f64,
    pub omega23: f64,
    /// Net radiative rates (s⁻¹).
    pub a21: f64,
    pub a31: f64,
    pub a32: f64,
    /// Excitation temperature of the 1→2 gap (K).
    pub tex12: f64,
    /// Excitation temperature of the 2→3 gap (K).
    pub tex23: f64,
}

/// Rates from processes outside the collisional-radiative system.
///
/// None of these contribute to the energy exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreeLevelExtras {
    /// Photo-destruction of level 2 (s⁻¹).
    pub photo_destruction2: f64,
    /// Extra excitation 1→2 (s⁻¹), e.g. chemistry or pumping.
    pub excitation12: f64,
    /// Extra excitation 1→3 (s⁻¹).
    pub excitation13: f64,
}

/// Level populations (cm⁻³).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreeLevelPopulations {
    pub pop1: f64,
    pub pop2: f64,
    pub pop3: f64,
}

impl ThreeLevelPopulations {
    fn ground(abundance: f64) -> Self {
        Self {
            pop1: abundance.max(0.0),
            ..Self::default()
        }
    }

    pub fn total(&self) -> f64 {
        self.pop1 + self.pop2 + self.pop3
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.pop1, self.pop2, self.pop3]
    }
}

/// Populations of a three-level atom.
///
/// Returns everything in the ground level when `abundance <= 0`, or when the
/// Boltzmann factors underflow and neither extra excitation route (1→2 or
/// 1→3) drives the atom.
///
/// # Panics
///
/// Panics on a negative collision strength, transition probability or
/// excitation temperature, or a non-positive statistical weight. The atomic
/// data is checked before any early exit.
pub fn three_level_populations(
    atom: &ThreeLevelAtom,
    abundance: f64,
    extras: &ThreeLevelExtras,
    cond: &Conditions,
) -> ThreeLevelPopulations {
    let [g1, g2, g3] = atom.weights;
    assert!(
        g1 > 0.0 && g2 > 0.0 && g3 > 0.0,
        "statistical weights must be positive: {:?}",
        atom.weights
    );
    assert!(
        atom.omega12 >= 0.0 && atom.omega13 >= 0.0 && atom.omega23 >= 0.0,
        "collision strengths must be non-negative"
    );
    assert!(
        atom.a21 >= 0.0 && atom.a31 >= 0.0 && atom.a32 >= 0.0,
        "transition probabilities must be non-negative"
    );
    assert!(
        atom.tex12 >= 0.0 && atom.tex23 >= 0.0,
        "excitation temperatures must be non-negative"
    );

    let driven = extras.excitation12 >= SMALLFLOAT || extras.excitation13 >= SMALLFLOAT;
    let ex = atom.tex12 / cond.temperature;
    if abundance <= 0.0 || (ex > MAX_EXCITATION_RATIO && !driven) {
        return ThreeLevelPopulations::ground(abundance);
    }

    let b12 = boltzmann_factor(ex);
    let b23 = boltzmann_factor(atom.tex23 / cond.temperature);
    let b13 = b12 * b23;
    if b13 == 0.0 && !driven {
        return ThreeLevelPopulations::ground(abundance);
    }

    let cf = cond.collision_factor;
    let c12 = cf * atom.omega12 / g1 * b12 + extras.excitation12;
    let c13 = cf * atom.omega13 / g1 * b13 + extras.excitation13;
    let c23 = cf * atom.omega23 / g2 * b23;
    let c32 = cf * atom.omega23 / g3;
    let c31 = cf * atom.omega13 / g3;
    let c21 = cf * atom.omega12 / g2;

    let alpha = atom.a21 + c21 + c23 + extras.photo_destruction2;
    let beta = atom.a31 + atom.a32 + c31 + c32;
    let feed32 = c32 + atom.a32;

    // relative to n1 = 1
    let pop2 = (c12 * beta + feed32 * c13) / (alpha * beta - c23 * feed32);
    let pop3 = (c13 + pop2 * c23) / beta;

    let scale = abundance / (1.0 + pop2 + pop3);
    ThreeLevelPopulations {
        pop1: scale,
        pop2: pop2 * scale,
        pop3: pop3 * scale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_atom() -> ThreeLevelAtom {
        ThreeLevelAtom {
            weights: [9.0, 5.0, 1.0],
            omega12: 1.0,
            omega13: 1.0,
            omega23: 1.0,
            a21: 1.0,
            a31: 0.1,
            a32: 0.05,
            tex12: 1.0e4,
            tex23: 1.5e4,
        }
    }

    #[test]
    fn test_conservation() {
        let cond = Conditions::new(1.2e4, 0.3);
        let pops = three_level_populations(&sample_atom(), 2.5, &ThreeLevelExtras::default(), &cond);
        assert_relative_eq!(pops.total(), 2.5, max_relative = 1e-12);
        assert!(pops.pop2 > 0.0 && pops.pop3 > 0.0);
    }

    #[test]
    fn test_cold_without_drive_is_ground() {
        let cond = Conditions::new(100.0, 0.3);
        let pops = three_level_populations(&sample_atom(), 1.0, &ThreeLevelExtras::default(), &cond);
        assert_eq!(pops.as_array(), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_cold_with_extra_excitation_is_populated() {
        let cond = Conditions::new(100.0, 0.3);
        let extras = ThreeLevelExtras {
            excitation12: 1.0e-3,
            ..Default::default()
        };
        let pops = three_level_populations(&sample_atom(), 1.0, &extras, &cond);
        assert!(pops.pop2 > 0.0);
        assert_relative_eq!(pops.total(), 1.0, max_relative = 1e-12);
    }

    #[test]
    fn test_photo_destruction_depletes_level2() {
        let cond = Conditions::new(1.0e4, 0.3);
        let plain = three_level_populations(&sample_atom(), 1.0, &ThreeLevelExtras::default(), &cond);
        let extras = ThreeLevelExtras {
            photo_destruction2: 10.0,
            ..Default::default()
        };
        let destroyed = three_level_populations(&sample_atom(), 1.0, &extras, &cond);
        assert!(destroyed.pop2 < plain.pop2);
    }

    #[test]
    fn test_non_positive_abundance() {
        let cond = Conditions::new(1.0e4, 0.3);
        let pops = three_level_populations(&sample_atom(), 0.0, &ThreeLevelExtras::default(), &cond);
        assert_eq!(pops.total(), 0.0);
    }

    #[test]
    fn test_cold_with_excitation_to_level3_is_populated() {
        let cond = Conditions::new(100.0, 0.3);
        let extras = ThreeLevelExtras {
            excitation13: 1.0e-3,
            ..Default::default()
        };
        let pops = three_level_populations(&sample_atom(), 1.0, &extras, &cond);
        assert!(pops.pop3 > 0.0);
        // level 3 cascades into level 2
        assert!(pops.pop2 > 0.0);
        assert_relative_eq!(pops.total(), 1.0, max_relative = 1e-12);
    }

    #[test]
    #[should_panic(expected = "statistical weights must be positive")]
    fn test_bad_weight_panics_even_when_cold() {
        let cond = Conditions::new(100.0, 0.3);
        let mut atom = sample_atom();
        atom.weights[1] = 0.0;
        three_level_populations(&atom, 1.0, &ThreeLevelExtras::default(), &cond);
    }

    #[test]
    #[should_panic(expected = "transition probabilities must be non-negative")]
    fn test_negative_a_panics_for_empty_atom() {
        let cond = Conditions::new(1.0e4, 0.3);
        let mut atom = sample_atom();
        atom.a21 = -1.0;
        three_level_populations(&atom, 0.0, &ThreeLevelExtras::default(), &cond);
    }

    #[test]
    #[should_panic(expected = "transition probabilities must be non-negative")]
    fn test_negative_a_panics() {
        let cond = Conditions::new(1.0e4, 0.3);
        let mut atom = sample_atom();
        atom.a31 = -1.0;
        three_level_populations(&atom, 1.0, &ThreeLevelExtras::default(), &cond);
    }
}
