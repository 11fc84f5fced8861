use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Initializer, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

use super::normed_linear::{NormedLinear, NormedLinearConfig};
use crate::error::Error;

/// Channels of the three stages.
const STAGE_WIDTHS: [usize; 3] = [16, 32, 64];

fn kaiming_normal() -> Initializer {
    Initializer::KaimingNormal {
        gain: core::f64::consts::SQRT_2,
        fan_out_only: false,
    }
}

/// Projection used on the residual path when the block changes the shape.
#[derive(Module, Debug)]
pub struct Shortcut<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Shortcut<B> {
    fn new(channels_in: usize, channels_out: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([channels_in, channels_out], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .with_initializer(kaiming_normal())
                .init(device),
            bn: BatchNormConfig::new(channels_out).init(device),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(input))
    }
}

#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    shortcut: Option<Shortcut<B>>,
    activation: Relu,
}

impl<B: Backend> BasicBlock<B> {
    fn new(channels_in: usize, channels_out: usize, stride: usize, device: &B::Device) -> Self {
        let conv = |channels_in: usize, stride: usize| -> Conv2d<B> {
            Conv2dConfig::new([channels_in, channels_out], [3, 3])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .with_initializer(kaiming_normal())
                .init(device)
        };

        let shortcut = if stride != 1 || channels_in != channels_out {
            Some(Shortcut::new(channels_in, channels_out, stride, device))
        } else {
            None
        };

        Self {
            conv1: conv(channels_in, stride),
            bn1: BatchNormConfig::new(channels_out).init(device),
            conv2: conv(channels_out, 1),
            bn2: BatchNormConfig::new(channels_out).init(device),
            shortcut,
            activation: Relu::new(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.shortcut {
            Some(shortcut) => shortcut.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.conv1.forward(input);
        let x = self.activation.forward(self.bn1.forward(x));
        let x = self.bn2.forward(self.conv2.forward(x));

        self.activation.forward(x + identity)
    }
}

/// Configuration of the CIFAR [ResNet](ResNet).
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Number of classes of the classifier head.
    pub num_classes: usize,
    /// Total number of weighted layers, `6n + 2`.
    #[config(default = 32)]
    pub depth: usize,
    /// Use a [cosine normalized head](NormedLinear) instead of a linear layer.
    #[config(default = false)]
    pub use_norm: bool,
}

/// Residual network for 32x32 images with three stages of basic blocks.
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    blocks: Vec<BasicBlock<B>>,
    pool: AdaptiveAvgPool2d,
    activation: Relu,
    linear: Option<Linear<B>>,
    normed: Option<NormedLinear<B>>,
}

impl ResNetConfig {
    /// Architecture name, e.g. `resnet32`.
    pub fn arch(&self) -> String {
        format!("resnet{}", self.depth)
    }

    /// Initializes the network.
    ///
    /// # Errors
    ///
    /// An error is returned when `depth` is not of the form `6n + 2` with `n > 0`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> crate::error::Result<ResNet<B>> {
        if self.depth < 8 || (self.depth - 2) % 6 != 0 {
            return Err(Error::Config(format!(
                "ResNet depth must be 6n + 2, got {}",
                self.depth
            )));
        }
        if self.num_classes == 0 {
            return Err(Error::Config("ResNet needs at least one class".into()));
        }

        let blocks_per_stage = (self.depth - 2) / 6;
        let mut blocks = Vec::with_capacity(3 * blocks_per_stage);
        let mut channels_in = STAGE_WIDTHS[0];

        for (stage, channels_out) in STAGE_WIDTHS.into_iter().enumerate() {
            for index in 0..blocks_per_stage {
                let stride = if stage > 0 && index == 0 { 2 } else { 1 };
                blocks.push(BasicBlock::new(channels_in, channels_out, stride, device));
                channels_in = channels_out;
            }
        }

        let features = STAGE_WIDTHS[2];
        let (linear, normed) = if self.use_norm {
            (
                None,
                Some(NormedLinearConfig::new(features, self.num_classes).init(device)),
            )
        } else {
            (
                Some(
                    LinearConfig::new(features, self.num_classes)
                        .with_initializer(kaiming_normal())
                        .init(device),
                ),
                None,
            )
        };

        Ok(ResNet {
            conv: Conv2dConfig::new([3, STAGE_WIDTHS[0]], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .with_initializer(kaiming_normal())
                .init(device),
            bn: BatchNormConfig::new(STAGE_WIDTHS[0]).init(device),
            blocks,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            activation: Relu::new(),
            linear,
            normed,
        })
    }
}

impl<B: Backend> ResNet<B> {
    /// # Shapes
    ///
    /// - images: `[batch_size, 3, height, width]`
    /// - output: `[batch_size, num_classes]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.activation.forward(self.bn.forward(self.conv.forward(images)));

        for block in self.blocks.iter() {
            x = block.forward(x);
        }

        let x = self.pool.forward(x).flatten::<2>(1, 3);

        match (&self.normed, &self.linear) {
            (Some(normed), _) => normed.forward(x),
            (None, Some(linear)) => linear.forward(x),
            (None, None) => x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::Distribution;

    #[test]
    fn depth_must_be_6n_plus_2() {
        let device = Default::default();

        assert!(ResNetConfig::new(10)
            .with_depth(33)
            .init::<TestBackend>(&device)
            .is_err());
        assert!(ResNetConfig::new(10)
            .with_depth(2)
            .init::<TestBackend>(&device)
            .is_err());
    }

    #[test]
    fn resnet20_has_nine_blocks() {
        let device = Default::default();
        let model = ResNetConfig::new(10)
            .with_depth(20)
            .init::<TestBackend>(&device)
            .unwrap();

        assert_eq!(model.blocks.len(), 9);
        assert!(model.blocks[0].shortcut.is_none());
        assert!(model.blocks[3].shortcut.is_some());
        assert!(model.blocks[6].shortcut.is_some());
    }

    #[test]
    fn forward_produces_logits() {
        let device = Default::default();
        let model = ResNetConfig::new(7)
            .with_depth(8)
            .init::<TestBackend>(&device)
            .unwrap();
        let images = Tensor::<TestBackend, 4>::random([2, 3, 16, 16], Distribution::Default, &device);

        let output = model.forward(images);

        assert_eq!(output.dims(), [2, 7]);
    }

    #[test]
    fn normed_head_is_bounded() {
        let device = Default::default();
        let model = ResNetConfig::new(4)
            .with_depth(8)
            .with_use_norm(true)
            .init::<TestBackend>(&device)
            .unwrap();
        let images = Tensor::<TestBackend, 4>::random([3, 3, 8, 8], Distribution::Default, &device);

        let output = model.forward(images).into_data().convert::<f32>();

        assert!(output
            .to_vec::<f32>()
            .unwrap()
            .iter()
            .all(|v| v.abs() <= 1.0 + 1e-5));
        assert_eq!(ResNetConfig::new(4).arch(), "resnet32");
    }
}
