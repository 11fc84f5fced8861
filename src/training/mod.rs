mod checkpoint;
mod epoch;
mod run_log;

pub use checkpoint::*;
pub use epoch::*;
pub use run_log::*;

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{decay::WeightDecayConfig, momentum::MomentumConfig, SgdConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::{
    CifarBatcher, CifarDataset, CifarVariant, ImbalanceConfig, ImbalancedDataset,
};
use crate::loss::{Criterion, LossConfig};
use crate::model::ResNetConfig;
use crate::reweight::ReweightConfig;
use crate::schedule::WarmupStepLrConfig;

#[derive(Config)]
pub struct TrainingConfig {
    pub model: ResNetConfig,
    pub optimizer: SgdConfig,
    pub schedule: WarmupStepLrConfig,
    #[config(default = "LossConfig::new()")]
    pub loss: LossConfig,
    #[config(default = "ImbalanceConfig::new()")]
    pub imbalance: ImbalanceConfig,
    #[config(default = "ReweightConfig::new()")]
    pub reweight: ReweightConfig,
    #[config(default = "CifarVariant::Cifar10")]
    pub dataset: CifarVariant,
    /// Directory holding the extracted CIFAR binary archives.
    #[config(default = "String::from(\"data\")")]
    pub data_dir: String,
    #[config(default = 200)]
    pub num_epochs: usize,
    #[config(default = 0)]
    pub start_epoch: usize,
    #[config(default = 128)]
    pub batch_size: usize,
    #[config(default = 100)]
    pub valid_batch_size: usize,
    #[config(default = 4)]
    pub num_workers: usize,
    /// Number of batches between two progress lines.
    #[config(default = 10)]
    pub print_freq: usize,
    #[config(default = 2021)]
    pub seed: u64,
    /// Free form tag distinguishing repeated experiments.
    #[config(default = "String::from(\"0\")")]
    pub exp_str: String,
    #[config(default = "String::from(\"log\")")]
    pub root_log: String,
    #[config(default = "String::from(\"checkpoint\")")]
    pub root_model: String,
    /// Checkpoint directory to resume from.
    pub resume: Option<String>,
    /// Only evaluate the (resumed) model on the test split.
    #[config(default = false)]
    pub evaluate: bool,
}

impl TrainingConfig {
    /// SGD with momentum 0.9 and weight decay 2e-4, base learning rate 0.1.
    pub fn cifar(dataset: CifarVariant) -> Self {
        let optimizer = SgdConfig::new()
            .with_momentum(Some(
                MomentumConfig::new()
                    .with_momentum(0.9)
                    .with_dampening(0.0),
            ))
            .with_weight_decay(Some(WeightDecayConfig::new(2e-4)));

        Self::new(
            ResNetConfig::new(dataset.num_classes()),
            optimizer,
            WarmupStepLrConfig::new(0.1),
        )
        .with_dataset(dataset)
    }

    /// Name of the run, e.g. `cifar10_resnet32_LDAM_DRW_exp_0.01_0`.
    pub fn store_name(&self) -> String {
        [
            self.dataset.name().to_string(),
            self.model.arch(),
            self.loss.loss_type.name().to_string(),
            self.reweight.rule.name().to_string(),
            self.imbalance.imb_type.name().to_string(),
            self.imbalance.imb_factor.to_string(),
            self.exp_str.clone(),
        ]
        .join("_")
    }

    pub fn log_dir(&self) -> PathBuf {
        Path::new(&self.root_log).join(self.store_name())
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        Path::new(&self.root_model).join(self.store_name())
    }

    /// Model configuration matching the dataset and the loss.
    pub fn model_config(&self) -> ResNetConfig {
        let mut model = self
            .model
            .clone()
            .with_use_norm(self.model.use_norm || self.loss.loss_type.needs_normed_head());
        model.num_classes = self.dataset.num_classes();
        model
    }
}

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub cls_num_list: Vec<usize>,
    /// Best test top-1 accuracy in percent.
    pub best_acc1: f64,
    /// Number of epochs trained by this invocation.
    pub epochs_run: usize,
    /// Results of the last validation pass.
    pub last: Option<EvalMetrics>,
}

pub fn run<B: AutodiffBackend>(
    config: TrainingConfig,
    device: B::Device,
) -> crate::error::Result<RunSummary> {
    let log_dir = config.log_dir();
    let checkpointer = Checkpointer::new(config.checkpoint_dir());
    std::fs::create_dir_all(&log_dir)?;
    std::fs::create_dir_all(checkpointer.directory())?;

    // Save training config
    config.save(log_dir.join("config.json"))?;
    let mut run_log = RunLog::create(&log_dir)?;

    B::seed(config.seed);

    let num_classes = config.dataset.num_classes();
    let schedule = config.schedule.init()?;

    let train_source = CifarDataset::train(&config.data_dir, config.dataset)?;
    let targets = train_source.targets();
    let dataset_train =
        ImbalancedDataset::new(train_source, &targets, num_classes, &config.imbalance)?;
    let cls_num_list = dataset_train.cls_num_list().to_vec();
    log::info!("cls num list: {cls_num_list:?}");
    let dataset_test = CifarDataset::test(&config.data_dir, config.dataset)?;

    let model_config = config.model_config();
    log::info!("=> creating model '{}'", model_config.arch());
    let mut model = model_config.init::<B>(&device)?;
    let mut optim = config.optimizer.init::<B, crate::model::ResNet<B>>();

    let mut start_epoch = config.start_epoch;
    let mut best_acc1 = 0.0;
    if let Some(resume) = &config.resume {
        let resumed = Checkpointer::new(resume);
        match resumed.load(model.clone(), optim, &device)? {
            Some((loaded_model, loaded_optim, state)) => {
                log::info!(
                    "=> loaded checkpoint '{resume}' (epoch {}, best Prec@1 {:.3})",
                    state.epoch,
                    state.best_acc1
                );
                model = loaded_model;
                optim = loaded_optim;
                start_epoch = state.epoch;
                best_acc1 = state.best_acc1;
            }
            None => {
                return Err(crate::error::Error::Config(format!(
                    "no checkpoint found at '{resume}'"
                )))
            }
        }
    }

    let mut builder_train =
        DataLoaderBuilder::new(CifarBatcher::<B>::train(&device, config.seed))
            .batch_size(config.batch_size)
            .shuffle(config.seed)
            .set_device(device.clone());
    let mut builder_test =
        DataLoaderBuilder::new(CifarBatcher::<B::InnerBackend>::valid(&device))
            .batch_size(config.valid_batch_size)
            .set_device(device.clone());
    if config.num_workers > 0 {
        builder_train = builder_train.num_workers(config.num_workers);
        builder_test = builder_test.num_workers(config.num_workers);
    }
    let dataloader_train = builder_train.build(dataset_train);
    let dataloader_test = builder_test.build(dataset_test);

    if config.evaluate {
        let weights = config.reweight.class_weights(start_epoch, &cls_num_list);
        let criterion = Criterion::new(&config.loss, &cls_num_list, weights, &device);
        let eval = validate(
            &model.valid(),
            &dataloader_test,
            &criterion,
            num_classes,
            config.valid_batch_size,
            config.print_freq,
            "val",
            &mut run_log,
        )?;

        return Ok(RunSummary {
            cls_num_list,
            best_acc1: eval.metrics.top1,
            epochs_run: 0,
            last: Some(eval),
        });
    }

    let now = Instant::now();
    let mut last = None;
    let mut epochs_run = 0;

    for epoch in start_epoch..config.num_epochs {
        let lr = schedule.lr(epoch);
        let weights = config.reweight.class_weights(epoch, &cls_num_list);

        let criterion_train =
            Criterion::<B>::new(&config.loss, &cls_num_list, weights.clone(), &device);
        let criterion_valid =
            Criterion::<B::InnerBackend>::new(&config.loss, &cls_num_list, weights, &device);

        let (trained, train_metrics) = train_epoch(
            model,
            &mut optim,
            &dataloader_train,
            &criterion_train,
            lr,
            epoch,
            config.batch_size,
            config.print_freq,
            &mut run_log,
        )?;
        model = trained;

        let eval = validate(
            &model.valid(),
            &dataloader_test,
            &criterion_valid,
            num_classes,
            config.valid_batch_size,
            config.print_freq,
            "val",
            &mut run_log,
        )?;

        run_log.scalars(&EpochScalars {
            epoch,
            train_acc: train_metrics.top1,
            test_acc: eval.metrics.top1,
            train_loss: train_metrics.loss,
            test_loss: eval.metrics.loss,
            lr,
        })?;

        // remember best acc@1 and save checkpoint
        let is_best = eval.metrics.top1 > best_acc1;
        if is_best {
            best_acc1 = eval.metrics.top1;
        }
        let best = format!("Best Prec@1: {best_acc1:.3}");
        log::info!("{best}");
        run_log.test_line(&best)?;

        checkpointer.save(
            &model,
            &optim,
            &TrainingState {
                epoch: epoch + 1,
                arch: model_config.arch(),
                best_acc1,
            },
            is_best,
        )?;

        epochs_run += 1;
        last = Some(eval);
    }

    let elapsed = now.elapsed().as_secs();
    log::info!("Training completed in {}m{}s", (elapsed / 60), elapsed % 60);

    Ok(RunSummary {
        cls_num_list,
        best_acc1,
        epochs_run,
        last,
    })
}
