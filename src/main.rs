use clap::Parser;
use longtail::{cli::Cli, logging::install_logger, training::TrainingConfig};

#[cfg(any(
    feature = "ndarray",
    feature = "ndarray-blas-netlib",
    feature = "ndarray-blas-openblas",
    feature = "ndarray-blas-accelerate",
))]
mod ndarray {
    use burn::backend::{
        ndarray::{NdArray, NdArrayDevice},
        Autodiff,
    };
    use longtail::{error::Result, training::TrainingConfig};

    pub fn run(config: TrainingConfig) -> Result<()> {
        let device = NdArrayDevice::Cpu;
        super::report(longtail::training::run::<Autodiff<NdArray>>(config, device)?);
        Ok(())
    }
}

#[cfg(any(feature = "tch-gpu", feature = "tch-cpu"))]
mod tch {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };
    use longtail::{error::Result, training::TrainingConfig};

    pub fn run(config: TrainingConfig) -> Result<()> {
        #[cfg(all(feature = "tch-gpu", not(target_os = "macos")))]
        let device = LibTorchDevice::Cuda(0);
        #[cfg(all(feature = "tch-gpu", target_os = "macos"))]
        let device = LibTorchDevice::Mps;
        #[cfg(not(feature = "tch-gpu"))]
        let device = LibTorchDevice::Cpu;

        super::report(longtail::training::run::<Autodiff<LibTorch>>(config, device)?);
        Ok(())
    }
}

#[cfg(feature = "wgpu")]
mod wgpu {
    use burn::backend::{
        wgpu::{Wgpu, WgpuDevice},
        Autodiff,
    };
    use longtail::{error::Result, training::TrainingConfig};

    pub fn run(config: TrainingConfig) -> Result<()> {
        let device = WgpuDevice::default();
        super::report(longtail::training::run::<Autodiff<Wgpu>>(config, device)?);
        Ok(())
    }
}

fn report(summary: longtail::training::RunSummary) {
    log::info!(
        "Finished {} epoch(s), best Prec@1: {:.3}",
        summary.epochs_run,
        summary.best_acc1
    );
}

#[allow(unreachable_code)]
fn dispatch(config: TrainingConfig) -> longtail::error::Result<()> {
    #[cfg(feature = "wgpu")]
    return wgpu::run(config);
    #[cfg(any(feature = "tch-gpu", feature = "tch-cpu"))]
    return tch::run(config);
    #[cfg(any(
        feature = "ndarray",
        feature = "ndarray-blas-netlib",
        feature = "ndarray-blas-openblas",
        feature = "ndarray-blas-accelerate",
    ))]
    return ndarray::run(config);

    unreachable!("At least one backend will be selected.")
}

fn main() {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    install_logger(config.log_dir().join("train.log"));
    log::info!("store name: {}", config.store_name());

    if let Err(err) = dispatch(config) {
        log::error!("{err}");
        std::process::exit(1);
    }
}
