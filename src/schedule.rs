use burn::{config::Config, LearningRate};

use crate::error::Error;

/// The configuration to create a [warmup step learning rate schedule](WarmupStepLr).
///
/// The learning rate grows linearly to `base_lr` over the first `warmup_epochs` epochs,
/// stays there until `first_decay_epoch`, is multiplied by `first_decay_factor` until
/// `second_decay_epoch`, and by `second_decay_factor` afterwards.
#[derive(Config, Debug)]
pub struct WarmupStepLrConfig {
    /// The learning rate of the plateau.
    pub base_lr: LearningRate,
    #[config(default = 5)]
    pub warmup_epochs: usize,
    /// Last epoch (1-based) of the plateau.
    #[config(default = 160)]
    pub first_decay_epoch: usize,
    /// Last epoch (1-based) of the first decay.
    #[config(default = 180)]
    pub second_decay_epoch: usize,
    #[config(default = 0.01)]
    pub first_decay_factor: f64,
    #[config(default = 0.0001)]
    pub second_decay_factor: f64,
}

impl WarmupStepLrConfig {
    /// Initializes a [warmup step learning rate schedule](WarmupStepLr).
    ///
    /// # Errors
    ///
    /// An error will be returned if the warmup overlaps the first decay or the decay epochs
    /// are not increasing.
    pub fn init(&self) -> crate::error::Result<WarmupStepLr> {
        if self.warmup_epochs > self.first_decay_epoch {
            return Err(Error::Config(format!(
                "Warmup of {} epochs overlaps the first decay at epoch {}",
                self.warmup_epochs, self.first_decay_epoch
            )));
        }
        if self.first_decay_epoch > self.second_decay_epoch {
            return Err(Error::Config(format!(
                "First decay epoch {} comes after second decay epoch {}",
                self.first_decay_epoch, self.second_decay_epoch
            )));
        }

        Ok(WarmupStepLr {
            base_lr: self.base_lr,
            warmup_epochs: self.warmup_epochs,
            first_decay_epoch: self.first_decay_epoch,
            second_decay_epoch: self.second_decay_epoch,
            first_decay_factor: self.first_decay_factor,
            second_decay_factor: self.second_decay_factor,
        })
    }
}

/// Per-epoch learning rate schedule with linear warmup and two step decays.
///
/// The schedule is a pure function of the epoch, so a resumed run needs no saved state.
#[derive(Clone, Debug)]
pub struct WarmupStepLr {
    base_lr: LearningRate,
    warmup_epochs: usize,
    first_decay_epoch: usize,
    second_decay_epoch: usize,
    first_decay_factor: f64,
    second_decay_factor: f64,
}

impl WarmupStepLr {
    /// Learning rate of the given 0-based epoch.
    pub fn lr(&self, epoch: usize) -> LearningRate {
        let epoch = epoch + 1;

        if epoch <= self.warmup_epochs {
            self.base_lr * epoch as f64 / self.warmup_epochs as f64
        } else if epoch > self.second_decay_epoch {
            self.base_lr * self.second_decay_factor
        } else if epoch > self.first_decay_epoch {
            self.base_lr * self.first_decay_factor
        } else {
            self.base_lr
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOSE_EPSILON: f64 = 1e-10;

    fn check_lr_sequence<I>(schedule: &WarmupStepLr, expected_lrs: I)
    where
        I: IntoIterator<Item = (usize, LearningRate)>,
    {
        for (epoch, expected) in expected_lrs {
            let lr = schedule.lr(epoch);
            assert!(
                (lr - expected).abs() < LOOSE_EPSILON,
                "Scheduled learning rate {lr} is not approximately equal to the expected value \
                 {expected} at epoch {epoch}",
            );
        }
    }

    #[test]
    fn test_default_schedule() {
        let schedule = WarmupStepLrConfig::new(0.1).init().unwrap();

        check_lr_sequence(
            &schedule,
            [
                (0, 0.02),
                (1, 0.04),
                (4, 0.1),
                (5, 0.1),
                (159, 0.1),
                (160, 0.001),
                (179, 0.001),
                (180, 0.00001),
                (199, 0.00001),
            ],
        );
    }

    #[test]
    fn test_no_warmup() {
        let schedule = WarmupStepLrConfig::new(0.5)
            .with_warmup_epochs(0)
            .with_first_decay_epoch(2)
            .with_second_decay_epoch(3)
            .with_first_decay_factor(0.1)
            .with_second_decay_factor(0.01)
            .init()
            .unwrap();

        check_lr_sequence(&schedule, [(0, 0.5), (1, 0.5), (2, 0.05), (3, 0.005)]);
    }

    #[test]
    fn test_config_warmup_after_decay() {
        assert!(WarmupStepLrConfig::new(0.1)
            .with_warmup_epochs(200)
            .init()
            .is_err());
    }

    #[test]
    fn test_config_decreasing_decays() {
        assert!(WarmupStepLrConfig::new(0.1)
            .with_first_decay_epoch(100)
            .with_second_decay_epoch(50)
            .init()
            .is_err());
    }
}
