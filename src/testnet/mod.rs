//! In-process test harness
//!
//! Helpers for spinning up sled-backed nodes and local networks in
//! temporary directories, plus forged chains for fork-choice tests.

pub mod test_utils;

pub use test_utils::*;
