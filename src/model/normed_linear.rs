use burn::module::Param;
use burn::nn::Initializer;
use burn::prelude::*;

/// Configuration to create a [cosine normalized linear](NormedLinear) layer.
#[derive(Config, Debug)]
pub struct NormedLinearConfig {
    /// The size of the input features.
    pub d_input: usize,
    /// The size of the output features.
    pub d_output: usize,
}

/// Linear classifier whose logits are cosine similarities.
///
/// Both the input features and every weight column are L2 normalized, so each logit lies
/// in `[-1, 1]`. Margin based losses rescale these logits themselves.
#[derive(Module, Debug)]
pub struct NormedLinear<B: Backend> {
    /// Matrix of shape `[d_input, d_output]`.
    pub weight: Param<Tensor<B, 2>>,
}

impl NormedLinearConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> NormedLinear<B> {
        let weight = Initializer::Uniform {
            min: -1.0,
            max: 1.0,
        }
        .init([self.d_input, self.d_output], device);

        NormedLinear { weight }
    }
}

impl<B: Backend> NormedLinear<B> {
    /// # Shapes
    ///
    /// - input: `[batch_size, d_input]`
    /// - output: `[batch_size, d_output]`
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let input = l2_normalize(input, 1);
        let weight = l2_normalize(self.weight.val(), 0);

        input.matmul(weight)
    }
}

fn l2_normalize<B: Backend>(tensor: Tensor<B, 2>, dim: usize) -> Tensor<B, 2> {
    let norm = tensor
        .clone()
        .powf_scalar(2.0)
        .sum_dim(dim)
        .sqrt()
        .clamp_min(1e-12);

    tensor / norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::assert_close;
    use crate::TestBackend;
    use burn::tensor::Distribution;

    #[test]
    fn logits_are_cosine_similarities() {
        let device = Default::default();
        let layer = NormedLinearConfig::new(8, 5).init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 2>::random([4, 8], Distribution::Normal(0.0, 3.0), &device);

        let output = layer.forward(input);

        assert_eq!(output.dims(), [4, 5]);
        let values = output.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.abs() <= 1.0 + 1e-5));
    }

    #[test]
    fn aligned_input_gives_unit_logit() {
        let device = Default::default();
        let mut layer = NormedLinearConfig::new(2, 2).init::<TestBackend>(&device);
        layer.weight = Param::from_tensor(Tensor::from_floats([[2.0, 0.0], [0.0, 5.0]], &device));
        let input = Tensor::<TestBackend, 2>::from_floats([[3.0, 0.0], [0.0, 0.5]], &device);

        let output = layer.forward(input);

        assert_close(output, &[1.0, 0.0, 0.0, 1.0], 1e-5);
    }
}
