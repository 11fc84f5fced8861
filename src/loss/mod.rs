mod focal;
mod ldam;

pub use focal::*;
pub use ldam::*;

use burn::config::Config;
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossType {
    /// Standard cross-entropy.
    CE,
    /// Focal loss.
    Focal,
    /// Label-distribution-aware margin loss.
    LDAM,
}

impl LossType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CE => "CE",
            Self::Focal => "Focal",
            Self::LDAM => "LDAM",
        }
    }

    /// LDAM expects cosine logits, so the classifier head must be normalized.
    pub fn needs_normed_head(&self) -> bool {
        matches!(self, Self::LDAM)
    }
}

#[derive(Config, Debug)]
pub struct LossConfig {
    #[config(default = "LossType::CE")]
    pub loss_type: LossType,
    /// Focusing parameter of the focal loss.
    #[config(default = 1.0)]
    pub focal_gamma: f64,
    /// Largest class margin of the LDAM loss.
    #[config(default = 0.5)]
    pub ldam_max_m: f64,
    /// Logit scale of the LDAM loss.
    #[config(default = 30.0)]
    pub ldam_s: f64,
}

/// The loss used for one epoch, built from the class counts and the epoch's class weights.
#[derive(Clone, Debug)]
pub enum Criterion<B: Backend> {
    CrossEntropy(CrossEntropyLoss<B>),
    Focal(FocalLoss<B>),
    Ldam(LdamLoss<B>),
}

impl<B: Backend> Criterion<B> {
    pub fn new(
        config: &LossConfig,
        cls_num_list: &[usize],
        weights: Option<Vec<f32>>,
        device: &B::Device,
    ) -> Self {
        match config.loss_type {
            LossType::CE => Self::CrossEntropy(
                CrossEntropyLossConfig::new()
                    .with_weights(weights)
                    .init(device),
            ),
            LossType::Focal => Self::Focal(FocalLoss::new(
                config.focal_gamma,
                weights.as_deref(),
                device,
            )),
            LossType::LDAM => Self::Ldam(LdamLoss::new(
                cls_num_list,
                config.ldam_max_m,
                config.ldam_s,
                weights,
                device,
            )),
        }
    }

    /// Computes the scalar loss.
    ///
    /// # Shapes
    ///
    /// - logits: `[batch_size, num_classes]`
    /// - targets: `[batch_size]`
    pub fn forward(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        match self {
            Self::CrossEntropy(loss) => loss.forward(logits, targets),
            Self::Focal(loss) => loss.forward(logits, targets),
            Self::Ldam(loss) => loss.forward(logits, targets),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::assert_close;
    use crate::TestBackend;

    #[test]
    fn weighted_cross_entropy_is_normalized_by_target_weights() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[2.0, 0.0], [0.0, 0.0]], &device);
        let targets = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([0, 1]), &device);
        let criterion = Criterion::new(
            &LossConfig::new(),
            &[10, 1],
            Some(vec![1.0, 3.0]),
            &device,
        );

        let loss = criterion.forward(logits, targets);

        let ce_0 = (1.0 + (-2.0f32).exp()).ln();
        let ce_1 = core::f32::consts::LN_2;
        assert_close(loss, &[(ce_0 + 3.0 * ce_1) / 4.0], 1e-5);
    }

    #[test]
    fn criterion_follows_the_loss_type() {
        let device = Default::default();
        let cls_num_list = [100, 10];

        let focal = Criterion::<TestBackend>::new(
            &LossConfig::new().with_loss_type(LossType::Focal),
            &cls_num_list,
            None,
            &device,
        );
        let ldam = Criterion::<TestBackend>::new(
            &LossConfig::new().with_loss_type(LossType::LDAM),
            &cls_num_list,
            None,
            &device,
        );

        assert!(matches!(focal, Criterion::Focal(_)));
        assert!(matches!(ldam, Criterion::Ldam(_)));
        assert!(LossType::LDAM.needs_normed_head());
        assert!(!LossType::Focal.needs_normed_head());
    }
}
