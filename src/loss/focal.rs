use burn::prelude::*;
use burn::tensor::activation::log_softmax;

/// Focal loss over (optionally class weighted) cross-entropy.
///
/// For every sample `ce_i` is its cross-entropy scaled by the weight of its target class,
/// `p_i = exp(-ce_i)` and the loss is `mean((1 - p_i)^gamma * ce_i)`.
#[derive(Clone, Debug)]
pub struct FocalLoss<B: Backend> {
    gamma: f64,
    weights: Option<Tensor<B, 1>>,
}

impl<B: Backend> FocalLoss<B> {
    pub fn new(gamma: f64, weights: Option<&[f32]>, device: &B::Device) -> Self {
        let weights = weights.map(|weights| {
            Tensor::from_data(
                TensorData::new(weights.to_vec(), [weights.len()]).convert::<B::FloatElem>(),
                device,
            )
        });

        Self { gamma, weights }
    }

    /// # Shapes
    ///
    /// - logits: `[batch_size, num_classes]`
    /// - targets: `[batch_size]`
    pub fn forward(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let ce = per_sample_cross_entropy(logits, targets, self.weights.clone());
        let p = ce.clone().neg().exp();
        let modulator = p.neg().add_scalar(1.0).powf_scalar(self.gamma);

        (modulator * ce).mean()
    }
}

/// Cross-entropy of every sample, multiplied by the weight of its target class.
pub(crate) fn per_sample_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    weights: Option<Tensor<B, 1>>,
) -> Tensor<B, 1> {
    let [batch_size] = targets.dims();

    let ce = log_softmax(logits, 1)
        .gather(1, targets.clone().reshape([batch_size, 1]))
        .reshape([batch_size])
        .neg();

    match weights {
        Some(weights) => ce * weights.gather(0, targets),
        None => ce,
    }
}
