//! # levpop core
//!
//! Statistical-equilibrium level populations for model atoms and ions, and
//! the line cooling/heating bookkeeping built on top of them.
//!
//! Every species-specific cooling routine in a spectral-synthesis code ends up
//! feeding the same small family of solvers: a closed-form two-level atom, a
//! closed-form three-level atom, a general N-level rate-matrix solve, and a
//! couple of isoelectronic-sequence wrappers. This crate provides that family
//! as pure, reentrant functions: all per-call data comes in as arguments and
//! every result comes back in a caller-owned [`solver::SolvedState`].
//!
//! ## Modules
//!
//! - [`physics`]: Constants, per-call plasma [`physics::Conditions`] and the
//!   guarded Boltzmann factor.
//! - [`model`]: Levels, transitions and the exact-size N×N rate arena.
//! - [`solver`]: Two-, three-, five- and N-level solvers.
//! - [`sequence`]: Be-like four-level and B-like five-level sequence atoms.
//! - [`cooling`]: Non-negative cooling/heating split and the coolant ledger.

pub mod cooling;
pub mod model;
pub mod physics;
pub mod sequence;
pub mod solver;
