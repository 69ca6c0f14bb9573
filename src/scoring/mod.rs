pub mod confidence;
pub mod engine;
pub mod indicators;
pub mod normalize;
pub mod pillars;
pub mod quality_adjuster;
pub mod state_label;
pub mod weights;

pub use engine::ScoringEngine;
pub use quality_adjuster::QualityAdjuster;
