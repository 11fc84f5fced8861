use std::sync::{Arc, Mutex};

use burn::{data::dataloader::batcher::Batcher, prelude::*};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::cifar::{CifarItem, CHANNELS, HEIGHT, IMAGE_BYTES, WIDTH};

// CIFAR mean and std values
const MEAN: [f32; 3] = [0.4914, 0.4822, 0.4465];
const STD: [f32; 3] = [0.2023, 0.1994, 0.2010];

/// Zero padding added on every side before the random crop.
pub const CROP_PADDING: usize = 4;

/// Normalizer for the CIFAR datasets.
#[derive(Clone, Debug)]
pub struct Normalizer<B: Backend> {
    pub mean: Tensor<B, 4>,
    pub std: Tensor<B, 4>,
}

impl<B: Backend> Normalizer<B> {
    /// Creates a new normalizer.
    pub fn new(device: &Device<B>) -> Self {
        let mean = Tensor::<B, 1>::from_floats(MEAN, device).reshape([1, 3, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(STD, device).reshape([1, 3, 1, 1]);
        Self { mean, std }
    }

    /// Normalizes the input image.
    ///
    /// The input image should be in the range [0, 1].
    /// The normalization is done according to the following formula:
    /// `input = (input - mean) / std`
    pub fn normalize(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        (input - self.mean.clone()) / self.std.clone()
    }

    /// Returns a new normalizer on the given device.
    pub fn to_device(&self, device: &B::Device) -> Self {
        Self {
            mean: self.mean.clone().to_device(device),
            std: self.std.clone().to_device(device),
        }
    }
}

/// Crops a `32x32` window out of the zero padded image and optionally mirrors it.
///
/// `top` and `left` are offsets in the padded image, in `0..=2 * CROP_PADDING`.
pub fn crop_and_flip(image: &[u8], top: usize, left: usize, flip: bool) -> Vec<u8> {
    let mut output = vec![0u8; IMAGE_BYTES];

    for c in 0..CHANNELS {
        let plane = c * HEIGHT * WIDTH;
        for y in 0..HEIGHT {
            let src_y = (y + top) as isize - CROP_PADDING as isize;
            if src_y < 0 || src_y >= HEIGHT as isize {
                continue;
            }
            for x in 0..WIDTH {
                let x_crop = if flip { WIDTH - 1 - x } else { x };
                let src_x = (x_crop + left) as isize - CROP_PADDING as isize;
                if src_x < 0 || src_x >= WIDTH as isize {
                    continue;
                }
                output[plane + y * WIDTH + x] =
                    image[plane + src_y as usize * WIDTH + src_x as usize];
            }
        }
    }

    output
}

#[derive(Clone, Debug)]
pub struct CifarBatcher<B: Backend> {
    normalizer: Normalizer<B>,
    /// Source of the crop offsets and flips, shared by the clones handed to the workers.
    augment: Option<Arc<Mutex<StdRng>>>,
}

#[derive(Clone, Debug)]
pub struct CifarBatch<B: Backend> {
    /// Normalized images, `[batch_size, 3, 32, 32]`.
    pub images: Tensor<B, 4>,
    /// Class labels, `[batch_size]`.
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> CifarBatcher<B> {
    /// Batcher applying random crop and horizontal flip before normalization.
    ///
    /// The augmentation is drawn from a generator seeded with `seed`.
    pub fn train(device: &B::Device, seed: u64) -> Self {
        Self {
            normalizer: Normalizer::new(device),
            augment: Some(Arc::new(Mutex::new(StdRng::seed_from_u64(seed)))),
        }
    }

    /// Batcher applying normalization only.
    pub fn valid(device: &B::Device) -> Self {
        Self {
            normalizer: Normalizer::new(device),
            augment: None,
        }
    }
}

impl<B: Backend> Batcher<B, CifarItem, CifarBatch<B>> for CifarBatcher<B> {
    fn batch(&self, items: Vec<CifarItem>, device: &B::Device) -> CifarBatch<B> {
        let batch_size = items.len();

        let targets: Vec<i64> = items.iter().map(|item| item.label as i64).collect();

        let images: Vec<Vec<u8>> = match &self.augment {
            Some(rng) => {
                let mut rng = rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                items
                    .into_iter()
                    .map(|item| {
                        let top = rng.random_range(0..=2 * CROP_PADDING);
                        let left = rng.random_range(0..=2 * CROP_PADDING);
                        crop_and_flip(&item.image, top, left, rng.random_bool(0.5))
                    })
                    .collect()
            }
            None => items.into_iter().map(|item| item.image).collect(),
        };

        let pixels: Vec<f32> = images
            .into_iter()
            .flatten()
            // normalize between [0, 1]
            .map(|p| p as f32 / 255.0)
            .collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, CHANNELS, HEIGHT, WIDTH])
                .convert::<B::FloatElem>(),
            device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets, [batch_size]).convert::<B::IntElem>(),
            device,
        );

        let images = self.normalizer.to_device(device).normalize(images);

        CifarBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;

    fn gradient_image() -> Vec<u8> {
        // Pixel value encodes its column so crops and flips are easy to follow.
        (0..IMAGE_BYTES).map(|i| (i % WIDTH) as u8 + 1).collect()
    }

    #[test]
    fn centered_crop_is_identity() {
        let image = gradient_image();

        let output = crop_and_flip(&image, CROP_PADDING, CROP_PADDING, false);

        assert_eq!(output, image);
    }

    #[test]
    fn flip_mirrors_columns() {
        let image = gradient_image();

        let output = crop_and_flip(&image, CROP_PADDING, CROP_PADDING, true);

        assert_eq!(output[0], WIDTH as u8);
        assert_eq!(output[WIDTH - 1], 1);
    }

    #[test]
    fn shifted_crop_pads_with_zeros() {
        let image = gradient_image();

        let output = crop_and_flip(&image, 0, 0, false);

        // The first padded rows and columns are empty.
        assert!(output[..CROP_PADDING * WIDTH].iter().all(|p| *p == 0));
        let row = CROP_PADDING * WIDTH;
        assert!(output[row..row + CROP_PADDING].iter().all(|p| *p == 0));
        assert_eq!(output[row + CROP_PADDING], 1);
    }

    #[test]
    fn batch_is_normalized() {
        let device = Default::default();
        let batcher = CifarBatcher::<TestBackend>::valid(&device);
        let items = vec![
            CifarItem {
                image: vec![0; IMAGE_BYTES],
                label: 3,
            },
            CifarItem {
                image: vec![255; IMAGE_BYTES],
                label: 7,
            },
        ];

        let batch = batcher.batch(items, &device);

        assert_eq!(batch.images.dims(), [2, 3, 32, 32]);
        assert_eq!(
            batch.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap(),
            vec![3, 7]
        );

        let first = batch
            .images
            .clone()
            .slice([0..1, 0..1, 0..1, 0..1])
            .into_scalar()
            .elem::<f32>();
        let last = batch
            .images
            .slice([1..2, 2..3, 0..1, 0..1])
            .into_scalar()
            .elem::<f32>();
        assert!((first - (0.0 - MEAN[0]) / STD[0]).abs() < 1e-4);
        assert!((last - (1.0 - MEAN[2]) / STD[2]).abs() < 1e-4);
    }

    #[test]
    fn train_batch_keeps_shape() {
        let device = Default::default();
        let batcher = CifarBatcher::<TestBackend>::train(&device, 7);
        let items = (0..4)
            .map(|label| CifarItem {
                image: gradient_image(),
                label,
            })
            .collect();

        let batch = batcher.batch(items, &device);

        assert_eq!(batch.images.dims(), [4, 3, 32, 32]);
        assert_eq!(batch.targets.dims(), [4]);
    }

    #[test]
    fn augmentation_follows_the_seed() {
        let device = Default::default();
        let items = || {
            (0..8)
                .map(|label| CifarItem {
                    image: gradient_image(),
                    label,
                })
                .collect::<Vec<_>>()
        };
        let pixels = |batch: CifarBatch<TestBackend>| {
            batch.images.into_data().to_vec::<f32>().unwrap()
        };

        let first = CifarBatcher::<TestBackend>::train(&device, 2021).batch(items(), &device);
        let second = CifarBatcher::<TestBackend>::train(&device, 2021).batch(items(), &device);
        let other = CifarBatcher::<TestBackend>::train(&device, 1).batch(items(), &device);

        assert_eq!(pixels(first.clone()), pixels(second));
        assert_ne!(pixels(first), pixels(other));
    }
}
