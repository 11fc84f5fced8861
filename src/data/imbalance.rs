use core::marker::PhantomData;

use burn::config::Config;
use burn::data::dataset::Dataset;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Decay profile of the number of samples per class.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImbalanceType {
    /// Sample count decays exponentially from the first to the last class.
    Exp,
    /// The first half of the classes keep every sample, the second half is reduced.
    Step,
    /// Balanced subset.
    None,
}

impl ImbalanceType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Exp => "exp",
            Self::Step => "step",
            Self::None => "none",
        }
    }
}

/// Configuration of the long-tailed subset drawn from a balanced dataset.
#[derive(Config, Debug)]
pub struct ImbalanceConfig {
    #[config(default = "ImbalanceType::Exp")]
    pub imb_type: ImbalanceType,
    /// Ratio between the least and the most frequent class.
    #[config(default = 0.01)]
    pub imb_factor: f64,
    /// Seed of the per-class shuffle, so that every run sees the same subset.
    #[config(default = 0)]
    pub rand_number: u64,
}

/// Number of images kept for every class.
///
/// `img_max` is the per-class count of the balanced source, i.e. `total / num_classes`.
pub fn img_num_per_cls(
    total: usize,
    num_classes: usize,
    imb_type: ImbalanceType,
    imb_factor: f64,
) -> Vec<usize> {
    let img_max = total as f64 / num_classes as f64;

    match imb_type {
        ImbalanceType::Exp => (0..num_classes)
            .map(|cls_idx| {
                let exponent = if num_classes > 1 {
                    cls_idx as f64 / (num_classes as f64 - 1.0)
                } else {
                    0.0
                };
                (img_max * imb_factor.powf(exponent)) as usize
            })
            .collect(),
        ImbalanceType::Step => {
            let head = num_classes / 2;
            let mut counts = vec![img_max as usize; head];
            counts.extend(vec![(img_max * imb_factor) as usize; num_classes - head]);
            counts
        }
        ImbalanceType::None => vec![img_max as usize; num_classes],
    }
}

/// A long-tailed view of a balanced dataset.
///
/// Items are laid out class by class in ascending class order; within a class, the kept
/// items are the first `n_i` of a seeded shuffle of that class's indices.
pub struct ImbalancedDataset<D, I>
where
    D: Dataset<I>,
{
    dataset: D,
    indices: Vec<usize>,
    cls_num_list: Vec<usize>,
    input: PhantomData<I>,
}

impl<D, I> ImbalancedDataset<D, I>
where
    D: Dataset<I>,
{
    /// Draws the long-tailed subset.
    ///
    /// `targets` holds the label of every item of `dataset`, in dataset order.
    pub fn new(
        dataset: D,
        targets: &[usize],
        num_classes: usize,
        config: &ImbalanceConfig,
    ) -> crate::error::Result<Self> {
        if targets.len() != dataset.len() {
            return Err(Error::Dataset(format!(
                "{} targets provided for a dataset of {} items",
                targets.len(),
                dataset.len()
            )));
        }
        if !(config.imb_factor > 0.0 && config.imb_factor <= 1.0) {
            return Err(Error::Config(format!(
                "imbalance factor must be in (0, 1], got {}",
                config.imb_factor
            )));
        }

        let wanted = img_num_per_cls(
            dataset.len(),
            num_classes,
            config.imb_type,
            config.imb_factor,
        );

        let mut per_class: Vec<Vec<usize>> = vec![Vec::new(); num_classes];
        for (index, &label) in targets.iter().enumerate() {
            match per_class.get_mut(label) {
                Some(class_indices) => class_indices.push(index),
                None => {
                    return Err(Error::Dataset(format!(
                        "label {label} is out of range for {num_classes} classes"
                    )))
                }
            }
        }

        let mut rng = StdRng::seed_from_u64(config.rand_number);
        let mut indices = Vec::new();
        let mut cls_num_list = Vec::with_capacity(num_classes);

        for (class, (mut class_indices, wanted)) in per_class.into_iter().zip(wanted).enumerate() {
            class_indices.shuffle(&mut rng);
            class_indices.truncate(wanted);

            if class_indices.is_empty() {
                return Err(Error::Config(format!(
                    "class {class} has no sample left with the {} profile and factor {}",
                    config.imb_type.name(),
                    config.imb_factor
                )));
            }

            cls_num_list.push(class_indices.len());
            indices.extend(class_indices);
        }

        Ok(Self {
            dataset,
            indices,
            cls_num_list,
            input: PhantomData,
        })
    }

    /// Number of kept samples for every class.
    pub fn cls_num_list(&self) -> &[usize] {
        &self.cls_num_list
    }
}

impl<D, I> Dataset<I> for ImbalancedDataset<D, I>
where
    D: Dataset<I>,
    I: Send + Sync,
{
    fn get(&self, index: usize) -> Option<I> {
        self.indices
            .get(index)
            .and_then(|source_index| self.dataset.get(*source_index))
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}
