//! Group analysis over recorded impacts for the Higherorder simulator.
//!
//! Measures how causally self-contained a set of entities is: how many of
//! the impact edges touching the group stay inside it, weighted and
//! compared against the fraction a random group of the same size would
//! show.
//!
//! # Modules
//!
//! - [`group`] -- Group ratio, group strength, and the greedy
//!   self-controlling group search.

pub mod group;

pub use group::{
    GroupRatio, GroupStrength, SelfControllingGroup, expected_strength,
    find_self_controlling_group, group_impact_strength, impact_group_ratio,
};
