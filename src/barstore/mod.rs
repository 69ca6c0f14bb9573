mod columnar_bar_store;

pub use columnar_bar_store::{BarStoreStats, ColumnarBarStore};
