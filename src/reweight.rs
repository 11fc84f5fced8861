use burn::config::Config;
use serde::{Deserialize, Serialize};

/// When per-class loss weights are applied.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainRule {
    /// Unweighted loss for the whole run.
    None,
    /// Effective-number weights from the first epoch.
    Reweight,
    /// Deferred re-weighting: unweighted until `drw_epoch`, effective-number weights after.
    DRW,
}

impl TrainRule {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Reweight => "Reweight",
            Self::DRW => "DRW",
        }
    }
}

#[derive(Config, Debug)]
pub struct ReweightConfig {
    #[config(default = "TrainRule::None")]
    pub rule: TrainRule,
    /// Beta of the effective number of samples `(1 - beta^n) / (1 - beta)`.
    #[config(default = 0.9999)]
    pub beta: f64,
    /// First (0-based) epoch using the weighted loss under [TrainRule::DRW].
    #[config(default = 160)]
    pub drw_epoch: usize,
}

/// Class-balanced weights `(1 - beta) / (1 - beta^n_j)`, normalized to sum to the number of
/// classes.
///
/// With `beta = 0` every class with at least one sample gets a weight of one.
pub fn effective_number_weights(cls_num_list: &[usize], beta: f64) -> Vec<f32> {
    let raw: Vec<f64> = cls_num_list
        .iter()
        .map(|n| {
            let effective_num = 1.0 - beta.powf(*n as f64);
            if effective_num > 0.0 {
                (1.0 - beta) / effective_num
            } else {
                0.0
            }
        })
        .collect();

    let total: f64 = raw.iter().sum();
    let num_classes = cls_num_list.len() as f64;

    raw.into_iter()
        .map(|w| {
            if total > 0.0 {
                (w / total * num_classes) as f32
            } else {
                0.0
            }
        })
        .collect()
}

impl ReweightConfig {
    /// Per-class loss weights for the given (0-based) epoch, `None` for an unweighted loss.
    pub fn class_weights(&self, epoch: usize, cls_num_list: &[usize]) -> Option<Vec<f32>> {
        match self.rule {
            TrainRule::None => None,
            TrainRule::Reweight => Some(effective_number_weights(cls_num_list, self.beta)),
            TrainRule::DRW => {
                let beta = if epoch < self.drw_epoch { 0.0 } else { self.beta };
                Some(effective_number_weights(cls_num_list, beta))
            }
        }
    }
}
