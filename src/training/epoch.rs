use std::sync::Arc;

use burn::{
    data::dataloader::DataLoader,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
    LearningRate,
};

use super::run_log::RunLog;
use crate::data::CifarBatch;
use crate::error::{Error, Result};
use crate::loss::Criterion;
use crate::metric::{argmax_rows, topk_correct, AverageMeter, ConfusionMatrix};
use crate::model::ResNet;

pub type CifarLoader<B> = Arc<dyn DataLoader<B, CifarBatch<B>>>;

/// Averages of one pass over a data loader.
#[derive(Debug, Clone)]
pub struct EpochMetrics {
    /// Top-1 accuracy in percent.
    pub top1: f64,
    /// Top-5 accuracy in percent.
    pub top5: f64,
    pub loss: f64,
}

/// Result of a validation pass.
#[derive(Debug, Clone)]
pub struct EvalMetrics {
    pub metrics: EpochMetrics,
    pub confusion: ConfusionMatrix,
}

/// Running loss and accuracy meters of a pass.
struct Meters {
    losses: AverageMeter,
    top1: AverageMeter,
    top5: AverageMeter,
}

impl Meters {
    fn new() -> Self {
        Self {
            losses: AverageMeter::new("Loss"),
            top1: AverageMeter::new("Prec@1"),
            top5: AverageMeter::new("Prec@5"),
        }
    }

    fn update<B: Backend>(
        &mut self,
        loss: f64,
        output: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) {
        let [batch_size, _] = output.dims();
        let percent = |correct: usize| 100.0 * correct as f64 / batch_size as f64;

        self.losses.update(loss, batch_size);
        self.top1.update(
            percent(topk_correct(output.clone(), targets.clone(), 1)),
            batch_size,
        );
        self.top5
            .update(percent(topk_correct(output, targets, 5)), batch_size);
    }

    fn progress(&self) -> String {
        format!(
            "Loss {:.4} ({:.4})\tPrec@1 {:.3} ({:.3})\tPrec@5 {:.3} ({:.3})",
            self.losses.val,
            self.losses.avg,
            self.top1.val,
            self.top1.avg,
            self.top5.val,
            self.top5.avg
        )
    }

    fn averages(&self) -> EpochMetrics {
        EpochMetrics {
            top1: self.top1.avg,
            top5: self.top5.avg,
            loss: self.losses.avg,
        }
    }
}

fn num_batches(num_items: usize, batch_size: usize) -> usize {
    num_items.div_ceil(batch_size.max(1))
}

pub(crate) fn labels_to_vec<B: Backend>(targets: Tensor<B, 1, Int>) -> Result<Vec<usize>> {
    let labels = targets
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|err| Error::Tensor(format!("{err:?}")))?;

    Ok(labels.into_iter().map(|label| label as usize).collect())
}

/// Runs one training epoch and returns the updated model.
#[allow(clippy::too_many_arguments)]
pub fn train_epoch<B, O>(
    mut model: ResNet<B>,
    optim: &mut O,
    dataloader: &CifarLoader<B>,
    criterion: &Criterion<B>,
    lr: LearningRate,
    epoch: usize,
    batch_size: usize,
    print_freq: usize,
    log: &mut RunLog,
) -> Result<(ResNet<B>, EpochMetrics)>
where
    B: AutodiffBackend,
    O: Optimizer<ResNet<B>, B>,
{
    let mut meters = Meters::new();
    let total = num_batches(dataloader.num_items(), batch_size);

    for (iteration, batch) in dataloader.iter().enumerate() {
        let output = model.forward(batch.images);
        let loss = criterion.forward(output.clone(), batch.targets.clone());

        let loss_value = loss.clone().into_scalar().elem::<f64>();
        meters.update(loss_value, output.detach(), batch.targets);

        // Gradients for the current backward pass
        let grads = loss.backward();
        // Gradients linked to each parameter of the model
        let grads = GradientsParams::from_grads(grads, &model);
        model = optim.step(lr, model, grads);

        if print_freq > 0 && iteration % print_freq == 0 {
            let line = format!(
                "Epoch: [{epoch}][{iteration}/{total}], lr: {lr:.5}\t{}",
                meters.progress()
            );
            log::info!("{line}");
            log.train_line(&line)?;
        }
    }

    Ok((model, meters.averages()))
}

/// Evaluates the model, logging overall results and per-class accuracy under `flag`.
#[allow(clippy::too_many_arguments)]
pub fn validate<B: Backend>(
    model: &ResNet<B>,
    dataloader: &CifarLoader<B>,
    criterion: &Criterion<B>,
    num_classes: usize,
    batch_size: usize,
    print_freq: usize,
    flag: &str,
    log: &mut RunLog,
) -> Result<EvalMetrics> {
    let mut meters = Meters::new();
    let mut confusion = ConfusionMatrix::new(num_classes);
    let total = num_batches(dataloader.num_items(), batch_size);

    for (iteration, batch) in dataloader.iter().enumerate() {
        let output = model.forward(batch.images);
        let loss = criterion.forward(output.clone(), batch.targets.clone());

        let predictions = argmax_rows(output.clone())?;
        let targets = labels_to_vec(batch.targets.clone())?;
        meters.update(loss.into_scalar().elem::<f64>(), output, batch.targets);
        confusion.update(&targets, &predictions);

        if print_freq > 0 && iteration % print_freq == 0 {
            log::info!("Test: [{iteration}/{total}]\t{}", meters.progress());
        }
    }

    let metrics = meters.averages();
    let results = format!(
        "{flag} Results: Prec@1 {:.3} Prec@5 {:.3} Loss {:.5}",
        metrics.top1, metrics.top5, metrics.loss
    );
    let class_accuracy = format!(
        "{flag} Class Accuracy: {}",
        confusion.format_class_accuracy()
    );
    log::info!("{results}");
    log::info!("{class_accuracy}");
    log.test_line(&results)?;
    log.test_line(&class_accuracy)?;

    Ok(EvalMetrics { metrics, confusion })
}
