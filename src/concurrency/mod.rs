mod striped_lock;

pub use striped_lock::StripedLock;
