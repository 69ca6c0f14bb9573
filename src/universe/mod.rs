pub mod universe_builder;

pub use universe_builder::{UniverseBuildReport, UniverseBuilder};
