//! Strata: named layers of trait values and how they combine.
//!
//! A model stores one [`StratumData`] object per stratum id. The effective
//! value of a trait is computed on read by walking the strata in the order
//! given by [`StratumOrder`] and merging according to the trait's
//! [`TraitKind`].

mod order;
mod traits;

pub use order::{CommonStrata, StratumBand, StratumOrder};
pub use traits::{
    deep_merge, merge_model_references, merge_trait, reference_id, removed_id, StratumData,
    TraitKind, MEMBERS_TRAIT,
};
