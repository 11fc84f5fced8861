use burn::config::Config;
use burn::optim::{decay::WeightDecayConfig, momentum::MomentumConfig};
use clap::Parser;

use crate::data::{CifarVariant, ImbalanceType};
use crate::error::{Error, Result};
use crate::loss::LossType;
use crate::reweight::TrainRule;
use crate::training::TrainingConfig;

fn parse_dataset(s: &str) -> core::result::Result<CifarVariant, String> {
    match s.trim().to_lowercase().as_str() {
        "cifar10" => Ok(CifarVariant::Cifar10),
        "cifar100" => Ok(CifarVariant::Cifar100),
        other => Err(format!("unknown dataset: {other}")),
    }
}

fn parse_loss_type(s: &str) -> core::result::Result<LossType, String> {
    match s.trim().to_lowercase().as_str() {
        "ce" => Ok(LossType::CE),
        "focal" => Ok(LossType::Focal),
        "ldam" => Ok(LossType::LDAM),
        other => Err(format!("unknown loss type: {other}")),
    }
}

fn parse_imb_type(s: &str) -> core::result::Result<ImbalanceType, String> {
    match s.trim().to_lowercase().as_str() {
        "exp" => Ok(ImbalanceType::Exp),
        "step" => Ok(ImbalanceType::Step),
        "none" => Ok(ImbalanceType::None),
        other => Err(format!("unknown imbalance type: {other}")),
    }
}

fn parse_train_rule(s: &str) -> core::result::Result<TrainRule, String> {
    match s.trim().to_lowercase().as_str() {
        "none" => Ok(TrainRule::None),
        "reweight" => Ok(TrainRule::Reweight),
        "drw" => Ok(TrainRule::DRW),
        other => Err(format!("unknown train rule: {other}")),
    }
}

/// Depth of the ResNet, given as `32` or as the architecture name `resnet32`.
fn parse_depth(s: &str) -> core::result::Result<usize, String> {
    let s = s.trim().to_lowercase();
    let depth = s.strip_prefix("resnet").unwrap_or(&s);
    depth
        .parse()
        .map_err(|_| format!("unknown architecture: {s}"))
}

/// Train a ResNet on long-tailed CIFAR.
///
/// Every flag left out keeps the value of `--config` when given, the default of the
/// experiments otherwise.
#[derive(Parser, Debug, Default)]
#[command(version, about)]
pub struct Cli {
    /// Training config saved by a previous run (`config.json`).
    #[arg(long)]
    pub config: Option<String>,

    /// Dataset: cifar10 or cifar100.
    #[arg(long, value_parser = parse_dataset)]
    pub dataset: Option<CifarVariant>,

    /// ResNet depth, 6n + 2, or the architecture name (`resnet32`).
    #[arg(short = 'a', long, visible_alias = "arch", value_parser = parse_depth)]
    pub depth: Option<usize>,

    /// Loss: CE, Focal or LDAM.
    #[arg(long, value_parser = parse_loss_type)]
    pub loss_type: Option<LossType>,

    /// Imbalance profile: exp, step or none.
    #[arg(long, value_parser = parse_imb_type)]
    pub imb_type: Option<ImbalanceType>,

    /// Ratio between the smallest and the largest class.
    #[arg(long)]
    pub imb_factor: Option<f64>,

    /// Reweighting rule: None, Reweight or DRW.
    #[arg(long, value_parser = parse_train_rule)]
    pub train_rule: Option<TrainRule>,

    /// Seed of the long-tailed subset selection.
    #[arg(long)]
    pub rand_number: Option<u64>,

    /// Tag appended to the run name.
    #[arg(long)]
    pub exp_str: Option<String>,

    /// Directory holding `cifar-10-batches-bin` or `cifar-100-binary`.
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Number of data loading workers.
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Number of total epochs to run.
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Epoch to start from, overridden by `--resume`.
    #[arg(long)]
    pub start_epoch: Option<usize>,

    #[arg(short = 'b', long)]
    pub batch_size: Option<usize>,

    /// Initial learning rate.
    #[arg(long, visible_alias = "learning-rate")]
    pub lr: Option<f64>,

    #[arg(long)]
    pub momentum: Option<f64>,

    /// Weight decay.
    #[arg(long, visible_alias = "weight-decay")]
    pub wd: Option<f32>,

    /// Number of batches between two progress lines.
    #[arg(short = 'p', long)]
    pub print_freq: Option<usize>,

    /// Checkpoint directory to resume from.
    #[arg(long)]
    pub resume: Option<String>,

    /// Evaluate the model on the test split and exit.
    #[arg(short = 'e', long)]
    pub evaluate: bool,

    /// Seed of the backend and of the data loader shuffling.
    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long)]
    pub root_log: Option<String>,

    #[arg(long)]
    pub root_model: Option<String>,
}

impl Cli {
    /// Builds the training configuration from the loaded config file and the flags.
    pub fn into_config(self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::load(path)
                .map_err(|err| Error::Config(format!("unable to load '{path}': {err}")))?,
            None => TrainingConfig::cifar(self.dataset.unwrap_or(CifarVariant::Cifar10)),
        };

        if let Some(dataset) = self.dataset {
            config.dataset = dataset;
            config.model.num_classes = dataset.num_classes();
        }
        if let Some(depth) = self.depth {
            config.model.depth = depth;
        }
        if let Some(loss_type) = self.loss_type {
            config.loss.loss_type = loss_type;
        }
        if let Some(imb_type) = self.imb_type {
            config.imbalance.imb_type = imb_type;
        }
        if let Some(imb_factor) = self.imb_factor {
            config.imbalance.imb_factor = imb_factor;
        }
        if let Some(rule) = self.train_rule {
            config.reweight.rule = rule;
        }
        if let Some(rand_number) = self.rand_number {
            config.imbalance.rand_number = rand_number;
        }
        if let Some(exp_str) = self.exp_str {
            config.exp_str = exp_str;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(workers) = self.workers {
            config.num_workers = workers;
        }
        if let Some(epochs) = self.epochs {
            config.num_epochs = epochs;
        }
        if let Some(start_epoch) = self.start_epoch {
            config.start_epoch = start_epoch;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(lr) = self.lr {
            config.schedule.base_lr = lr;
        }
        if let Some(momentum) = self.momentum {
            config.optimizer = config.optimizer.with_momentum(Some(
                MomentumConfig::new()
                    .with_momentum(momentum)
                    .with_dampening(0.0),
            ));
        }
        if let Some(wd) = self.wd {
            config.optimizer = config
                .optimizer
                .with_weight_decay(Some(WeightDecayConfig::new(wd)));
        }
        if let Some(print_freq) = self.print_freq {
            config.print_freq = print_freq;
        }
        if self.resume.is_some() {
            config.resume = self.resume;
        }
        if self.evaluate {
            config.evaluate = true;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(root_log) = self.root_log {
            config.root_log = root_log;
        }
        if let Some(root_model) = self.root_model {
            config.root_model = root_model;
        }

        Ok(config)
    }
}
