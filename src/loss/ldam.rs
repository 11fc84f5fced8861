use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::prelude::*;

/// Label-distribution-aware margin loss.
///
/// Every class `j` gets a margin `m_j` proportional to `n_j^(-1/4)`, rescaled so that the
/// largest margin equals `max_m`. The target logit is reduced by its class margin, all
/// logits are multiplied by `s`, and a (weighted) cross-entropy is applied.
#[derive(Clone, Debug)]
pub struct LdamLoss<B: Backend> {
    margins: Tensor<B, 1>,
    s: f64,
    cross_entropy: CrossEntropyLoss<B>,
}

/// Per-class margins `m_j = max_m * n_j^(-1/4) / max_k(n_k^(-1/4))`.
pub fn ldam_margins(cls_num_list: &[usize], max_m: f64) -> Vec<f32> {
    let raw: Vec<f64> = cls_num_list
        .iter()
        .map(|n| 1.0 / (*n as f64).sqrt().sqrt())
        .collect();
    let largest = raw.iter().cloned().fold(0.0, f64::max);

    raw.into_iter()
        .map(|m| (m * max_m / largest) as f32)
        .collect()
}

impl<B: Backend> LdamLoss<B> {
    pub fn new(
        cls_num_list: &[usize],
        max_m: f64,
        s: f64,
        weights: Option<Vec<f32>>,
        device: &B::Device,
    ) -> Self {
        let margins = ldam_margins(cls_num_list, max_m);
        let margins = Tensor::from_data(
            TensorData::new(margins, [cls_num_list.len()]).convert::<B::FloatElem>(),
            device,
        );
        let cross_entropy = CrossEntropyLossConfig::new()
            .with_weights(weights)
            .init(device);

        Self {
            margins,
            s,
            cross_entropy,
        }
    }

    /// # Shapes
    ///
    /// - logits: `[batch_size, num_classes]`
    /// - targets: `[batch_size]`
    pub fn forward(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let [batch_size, num_classes] = logits.dims();

        let batch_margins = self
            .margins
            .clone()
            .gather(0, targets.clone())
            .reshape([batch_size, 1]);
        // Only the target column receives its margin.
        let margins = Tensor::zeros([batch_size, num_classes], &logits.device()).scatter(
            1,
            targets.clone().reshape([batch_size, 1]),
            batch_margins,
        );

        let output = (logits - margins).mul_scalar(self.s);

        self.cross_entropy.forward(output, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::assert_close;
    use crate::TestBackend;
    use burn::tensor::Distribution;

    #[test]
    fn rarest_class_gets_the_largest_margin() {
        let margins = ldam_margins(&[5000, 500, 50], 0.5);

        assert!((margins[2] - 0.5).abs() < 1e-6);
        assert!(margins[0] < margins[1] && margins[1] < margins[2]);
        // 100x fewer samples gives a sqrt(10) larger margin.
        assert!((margins[2] / margins[0] - 10f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn zero_margin_unit_scale_is_cross_entropy() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::random([5, 3], Distribution::Default, &device);
        let targets = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([0, 2, 1, 1, 0]), &device);

        let ldam = LdamLoss::<TestBackend>::new(&[10, 20, 30], 0.0, 1.0, None, &device)
            .forward(logits.clone(), targets.clone());
        let ce = CrossEntropyLossConfig::new().init(&device).forward(logits, targets);

        let expected = ce.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert_close(ldam, &expected, 1e-5);
    }

    #[test]
    fn margin_only_hits_the_target_logit() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::zeros([1, 2], &device);
        let targets = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([1]), &device);

        // Counts [1, 4] give margins [max_m, max_m / sqrt(2)].
        let loss = LdamLoss::<TestBackend>::new(&[1, 4], 1.0, 2.0, None, &device)
            .forward(logits, targets);

        // Logits become [0, -2 * m_1] with m_1 = 1/sqrt(2).
        let m = core::f32::consts::FRAC_1_SQRT_2;
        let expected = (1.0 + (2.0 * m).exp()).ln();
        assert_close(loss, &[expected], 1e-4);
    }
}
