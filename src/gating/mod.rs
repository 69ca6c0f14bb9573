pub mod gating_engine;

pub use gating_engine::GatingEngine;
