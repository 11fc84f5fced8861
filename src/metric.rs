use std::fmt::{self, Display};

use burn::prelude::*;

use crate::error::{Error, Result};

/// Tracks the latest value and the running average of a metric.
#[derive(Clone, Debug)]
pub struct AverageMeter {
    name: &'static str,
    pub val: f64,
    pub sum: f64,
    pub count: usize,
    pub avg: f64,
}

impl AverageMeter {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            val: 0.0,
            sum: 0.0,
            count: 0,
            avg: 0.0,
        }
    }

    /// Records `val`, averaged over `n` samples.
    pub fn update(&mut self, val: f64, n: usize) {
        self.val = val;
        self.sum += val * n as f64;
        self.count += n;
        self.avg = if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        };
    }
}

impl Display for AverageMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.4} ({:.4})", self.name, self.val, self.avg)
    }
}

/// Number of samples whose target is among the `k` largest logits.
///
/// Rows holding a NaN logit never count as correct. With fewer than `k` classes every
/// other row does.
///
/// # Shapes
///
/// - logits: `[batch_size, num_classes]`
/// - targets: `[batch_size]`
pub fn topk_correct<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    k: usize,
) -> usize {
    let [batch_size, num_classes] = logits.dims();
    let k = k.min(num_classes);
    if batch_size == 0 || k == 0 {
        return 0;
    }

    let nan = logits.clone().is_nan();
    let valid = nan.clone().any_dim(1).bool_not().int();
    let outputs = logits
        .mask_fill(nan, 0.0)
        .argsort_descending(1)
        .narrow(1, 0, k);

    let hits = targets
        .reshape([batch_size, 1])
        .repeat_dim(1, k)
        .equal(outputs)
        .int()
        .sum_dim(1);

    (hits * valid).sum().into_scalar().elem::<i64>() as usize
}

/// Index of the largest logit of every row, `None` for rows holding a NaN logit.
pub fn argmax_rows<B: Backend>(logits: Tensor<B, 2>) -> Result<Vec<Option<usize>>> {
    let [batch_size, _] = logits.dims();

    let nan = logits.clone().is_nan();
    let classes = logits
        .mask_fill(nan.clone(), 0.0)
        .argmax(1)
        .reshape([batch_size])
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|err| Error::Tensor(format!("{err:?}")))?;
    let nan = nan
        .any_dim(1)
        .reshape([batch_size])
        .into_data()
        .to_vec::<bool>()
        .map_err(|err| Error::Tensor(format!("{err:?}")))?;

    Ok(classes
        .into_iter()
        .zip(nan)
        .map(|(class, nan)| (!nan).then_some(class as usize))
        .collect())
}

/// Counts of (target, prediction) pairs.
///
/// Samples without a prediction are kept in their class support and count as misses.
#[derive(Clone, Debug)]
pub struct ConfusionMatrix {
    num_classes: usize,
    /// Row-major `[target, prediction]` counts, the last column holding missing predictions.
    counts: Vec<u64>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            counts: vec![0; num_classes * (num_classes + 1)],
        }
    }

    fn row_len(&self) -> usize {
        self.num_classes + 1
    }

    pub fn update(&mut self, targets: &[usize], predictions: &[Option<usize>]) {
        for (target, prediction) in targets.iter().zip(predictions) {
            if *target >= self.num_classes {
                continue;
            }
            let column = match prediction {
                Some(prediction) if *prediction < self.num_classes => *prediction,
                _ => self.num_classes,
            };
            let index = target * self.row_len() + column;
            self.counts[index] += 1;
        }
    }

    pub fn get(&self, target: usize, prediction: usize) -> u64 {
        self.counts[target * self.row_len() + prediction]
    }

    /// Number of samples of every class.
    pub fn support(&self) -> Vec<u64> {
        let row_len = self.row_len();
        self.counts
            .chunks_exact(row_len)
            .map(|row| row.iter().sum())
            .collect()
    }

    /// Recall of every class; classes without samples report 0.
    pub fn per_class_accuracy(&self) -> Vec<f64> {
        self.support()
            .into_iter()
            .enumerate()
            .map(|(class, count)| {
                if count == 0 {
                    0.0
                } else {
                    self.get(class, class) as f64 / count as f64
                }
            })
            .collect()
    }

    /// Per-class accuracy rendered as `[0.912,0.954,...]`.
    pub fn format_class_accuracy(&self) -> String {
        let values: Vec<String> = self
            .per_class_accuracy()
            .iter()
            .map(|acc| format!("{acc:.3}"))
            .collect();

        format!("[{}]", values.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;

    #[test]
    fn meter_tracks_weighted_average() {
        let mut meter = AverageMeter::new("Loss");

        meter.update(2.0, 1);
        meter.update(5.0, 3);

        assert_eq!(meter.val, 5.0);
        assert_eq!(meter.count, 4);
        assert!((meter.avg - 4.25).abs() < 1e-12);
        assert_eq!(format!("{meter}"), "Loss 5.0000 (4.2500)");
    }

    #[test]
    fn topk_counts_targets_in_the_best_k() {
        let device = Default::default();
        let logits = || {
            Tensor::<TestBackend, 2>::from_data(
                [
                    [0.0, 0.2, 0.8], // 2, 1
                    [1.0, 2.0, 0.5], // 1, 0
                    [0.4, 0.1, 0.2], // 0, 2
                    [0.6, 0.7, 0.2], // 1, 0
                ],
                &device,
            )
        };
        let targets = || Tensor::<TestBackend, 1, Int>::from_data([2, 2, 1, 0], &device);

        assert_eq!(topk_correct(logits(), targets(), 1), 1);
        assert_eq!(topk_correct(logits(), targets(), 2), 2);
        assert_eq!(topk_correct(logits(), targets(), 3), 4);
        assert_eq!(topk_correct(logits(), targets(), 5), 4);
    }

    #[test]
    fn nan_rows_are_never_correct() {
        let device = Default::default();
        let logits = || {
            Tensor::<TestBackend, 2>::from_data(
                [[f32::NAN, f32::NAN], [f32::NAN, 1.0], [0.3, 0.7]],
                &device,
            )
        };
        let targets = || Tensor::<TestBackend, 1, Int>::from_data([1, 0, 1], &device);

        assert_eq!(topk_correct(logits(), targets(), 1), 1);
        assert_eq!(topk_correct(logits(), targets(), 5), 1);
        assert_eq!(argmax_rows(logits()).unwrap(), vec![None, None, Some(1)]);
    }

    #[test]
    fn argmax_picks_the_largest_logit() {
        let device = Default::default();
        let logits =
            Tensor::<TestBackend, 2>::from_data([[0.1, 0.9, 0.3], [3.0, -1.0, 2.0]], &device);

        assert_eq!(argmax_rows(logits).unwrap(), vec![Some(1), Some(0)]);
    }

    #[test]
    fn per_class_accuracy_from_confusion() {
        let mut matrix = ConfusionMatrix::new(3);

        matrix.update(
            &[0, 0, 1, 1, 1, 1],
            &[Some(0), Some(1), Some(1), Some(1), Some(1), Some(2)],
        );

        assert_eq!(matrix.support(), vec![2, 4, 0]);
        assert_eq!(matrix.per_class_accuracy(), vec![0.5, 0.75, 0.0]);
        assert_eq!(matrix.format_class_accuracy(), "[0.500,0.750,0.000]");
    }

    #[test]
    fn missing_predictions_count_as_misses() {
        let mut matrix = ConfusionMatrix::new(2);

        matrix.update(&[0, 0, 1], &[None, Some(0), None]);

        assert_eq!(matrix.support(), vec![2, 1]);
        assert_eq!(matrix.per_class_accuracy(), vec![0.5, 0.0]);
    }
}
