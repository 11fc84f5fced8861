mod batcher;
mod cifar;
mod imbalance;

pub use batcher::*;
pub use cifar::*;
pub use imbalance::*;
