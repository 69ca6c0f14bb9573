//! Drives the rotation/gating/scoring runs that keep `scores_latest`
//! and `gating_status` current for a market scope, from the selection
//! in `rotation::RotationSelector` through staged publish or rollback.

pub mod runner;

pub use runner::{JobReport, JobRunner};
