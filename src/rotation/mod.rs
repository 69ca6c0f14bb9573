pub mod selector;

pub use selector::{RotationSelector, DEFAULT_BATCH_SIZE};
