//! Heterogeneity classification and chain decomposition.
//!
//! # Modules
//!
//! - [`policy`] - Backend capability policies
//! - [`classify`] - Per-kind classification rules
//! - [`cut`] - Including-tree cut and lift rules
//! - [`decompose`] - Boundary search and segment construction

pub mod classify;
pub mod cut;
pub mod decompose;
pub mod policy;

pub use classify::{split_factors, Applicability, Classifier, FactorSplit, KindRule, Previsit};
pub use cut::{cut, lift, own_needs};
pub use decompose::{Decomposer, Segments};
pub use policy::{Capability, CapabilityPolicy, HeterogeneityPolicy};
