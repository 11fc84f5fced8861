//! Long-tailed CIFAR training: imbalanced subsets, class-balanced losses (focal, LDAM),
//! deferred re-weighting and a warmup step learning rate schedule on top of Burn.

pub mod cli;
pub mod data;
pub mod error;
pub mod logging;
pub mod loss;
pub mod metric;
pub mod model;
pub mod reweight;
pub mod schedule;
pub mod training;

#[cfg(test)]
pub(crate) type TestBackend = burn::backend::NdArray;

#[cfg(test)]
pub(crate) type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;
