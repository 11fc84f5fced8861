use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
use longtail::data::{img_num_per_cls, CifarVariant, ImbalanceConfig, ImbalanceType, IMAGE_BYTES};
use longtail::loss::{LossConfig, LossType};
use longtail::model::ResNetConfig;
use longtail::reweight::{ReweightConfig, TrainRule};
use longtail::training::{run, TrainingConfig, TrainingState};

type Backend = Autodiff<NdArray>;

const TRAIN_PER_CLASS: usize = 2;
const TEST_PER_CLASS: usize = 1;

/// Writes `count` records per class, the image bytes encoding the label.
fn write_batch(path: &Path, count: usize, classes: std::ops::Range<usize>) {
    let mut file = File::create(path).unwrap();
    for class in classes {
        for i in 0..count {
            file.write_all(&[class as u8]).unwrap();
            let pixel = (class * 25 + i) as u8;
            file.write_all(&vec![pixel; IMAGE_BYTES]).unwrap();
        }
    }
}

fn write_cifar10(root: &Path) {
    let dir = root.join("cifar-10-batches-bin");
    fs::create_dir_all(&dir).unwrap();

    // Two classes in every training batch file.
    for batch in 0..5 {
        write_batch(
            &dir.join(format!("data_batch_{}.bin", batch + 1)),
            TRAIN_PER_CLASS,
            2 * batch..2 * batch + 2,
        );
    }
    write_batch(&dir.join("test_batch.bin"), TEST_PER_CLASS, 0..10);
}

fn tiny_config(root: &Path) -> TrainingConfig {
    let mut config = TrainingConfig::cifar(CifarVariant::Cifar10)
        .with_loss(LossConfig::new().with_loss_type(LossType::LDAM))
        .with_reweight(
            ReweightConfig::new()
                .with_rule(TrainRule::DRW)
                .with_drw_epoch(0),
        )
        .with_imbalance(
            ImbalanceConfig::new()
                .with_imb_type(ImbalanceType::Exp)
                .with_imb_factor(0.5),
        )
        .with_data_dir(root.display().to_string())
        .with_root_log(root.join("log").display().to_string())
        .with_root_model(root.join("checkpoint").display().to_string())
        .with_num_epochs(1)
        .with_batch_size(8)
        .with_valid_batch_size(10)
        .with_num_workers(0)
        .with_print_freq(1);
    config.model = ResNetConfig::new(10).with_depth(8);
    config.schedule = config.schedule.with_warmup_epochs(1);
    config
}

#[test]
fn trains_logs_and_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    write_cifar10(dir.path());
    let config = tiny_config(dir.path());
    let log_dir = config.log_dir();
    let checkpoint_dir = config.checkpoint_dir();

    let summary = run::<Backend>(config, NdArrayDevice::Cpu).unwrap();

    assert_eq!(summary.epochs_run, 1);
    assert_eq!(
        summary.cls_num_list,
        img_num_per_cls(10 * TRAIN_PER_CLASS, 10, ImbalanceType::Exp, 0.5)
    );
    assert_eq!(summary.cls_num_list[0], TRAIN_PER_CLASS);

    let last = summary.last.unwrap();
    assert_eq!(last.confusion.support(), vec![TEST_PER_CLASS as u64; 10]);

    assert!(log_dir.ends_with("cifar10_resnet8_LDAM_DRW_exp_0.5_0"));
    for file in ["config.json", "log_train.csv", "log_test.csv", "scalars.csv"] {
        assert!(log_dir.join(file).exists(), "missing {file}");
    }

    let scalars = fs::read_to_string(log_dir.join("scalars.csv")).unwrap();
    assert_eq!(scalars.lines().count(), 2);

    let test_log = fs::read_to_string(log_dir.join("log_test.csv")).unwrap();
    assert_eq!(test_log.matches("val Class Accuracy: [").count(), 1);
    assert_eq!(test_log.matches("Best Prec@1: ").count(), 1);

    let state: TrainingState =
        serde_json::from_str(&fs::read_to_string(checkpoint_dir.join("state.json")).unwrap())
            .unwrap();
    assert_eq!(state.epoch, 1);
    assert_eq!(state.arch, "resnet8");
    assert!((state.best_acc1 - summary.best_acc1).abs() < 1e-9);
    assert!(checkpoint_dir.join("model.mpk").exists());
    assert!(checkpoint_dir.join("optim.mpk").exists());
    assert_eq!(
        checkpoint_dir.join("model_best.mpk").exists(),
        summary.best_acc1 > 0.0
    );
}

#[test]
fn resumes_and_evaluates_from_a_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    write_cifar10(dir.path());
    let config = tiny_config(dir.path());
    let checkpoint_dir = config.checkpoint_dir().display().to_string();

    run::<Backend>(config, NdArrayDevice::Cpu).unwrap();

    let resumed = run::<Backend>(
        tiny_config(dir.path())
            .with_num_epochs(2)
            .with_resume(Some(checkpoint_dir.clone())),
        NdArrayDevice::Cpu,
    )
    .unwrap();
    assert_eq!(resumed.epochs_run, 1);

    let evaluated = run::<Backend>(
        tiny_config(dir.path())
            .with_evaluate(true)
            .with_resume(Some(checkpoint_dir)),
        NdArrayDevice::Cpu,
    )
    .unwrap();
    assert_eq!(evaluated.epochs_run, 0);
    assert!(evaluated.last.is_some());
}

#[test]
fn missing_dataset_is_an_error() {
    let dir = tempfile::tempdir().unwrap();

    let result = run::<Backend>(tiny_config(dir.path()), NdArrayDevice::Cpu);

    assert!(result.is_err());
}
