pub mod scope;
pub mod asset;
pub mod bar;
pub mod fundamentals;
pub mod gating;
pub mod score;
pub mod job;
pub mod quota;
pub mod rotation;

pub use scope::MarketScope;
pub use asset::{Asset, AssetType, Tier};
pub use bar::{BarRow, BarSeries};
pub use fundamentals::Fundamentals;
pub use gating::GatingStatus;
pub use score::{FeatureName, PillarWeights, Score, ScoreBreakdown, StateLabel};
pub use job::{JobMode, JobRun, JobStatus, JobType, QueueItem, QueueStatus};
pub use quota::{Plan, UserQuota};
pub use rotation::RotationState;
