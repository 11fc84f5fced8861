use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    optim::Optimizer,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::{AutodiffBackend, Backend},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::ResNet;

const MODEL: &str = "model";
const MODEL_BEST: &str = "model_best";
const OPTIMIZER: &str = "optim";
const STATE: &str = "state.json";

/// Persisted training state for resume support.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TrainingState {
    /// Next epoch to run.
    pub epoch: usize,
    pub arch: String,
    pub best_acc1: f64,
}

/// Saves and restores the latest model, the best model, the optimizer and the
/// [training state](TrainingState) of a run.
///
/// Records keep full precision so a resumed run continues from the exact weights and
/// momentum of the last epoch.
pub struct Checkpointer {
    directory: PathBuf,
    recorder: NamedMpkFileRecorder<FullPrecisionSettings>,
}

impl Checkpointer {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            recorder: NamedMpkFileRecorder::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Saves the latest checkpoint, and a copy of the model when it is the best so far.
    pub fn save<B, O>(
        &self,
        model: &ResNet<B>,
        optim: &O,
        state: &TrainingState,
        is_best: bool,
    ) -> Result<()>
    where
        B: AutodiffBackend,
        O: Optimizer<ResNet<B>, B>,
    {
        std::fs::create_dir_all(&self.directory)?;

        model
            .clone()
            .save_file(self.directory.join(MODEL), &self.recorder)?;
        self.recorder
            .record(optim.to_record(), self.directory.join(OPTIMIZER))?;
        std::fs::write(
            self.directory.join(STATE),
            serde_json::to_string_pretty(state)?,
        )?;

        if is_best {
            model
                .clone()
                .save_file(self.directory.join(MODEL_BEST), &self.recorder)?;
        }

        Ok(())
    }

    /// Loads the latest checkpoint, `None` when the directory holds no training state.
    pub fn load<B, O>(
        &self,
        model: ResNet<B>,
        optim: O,
        device: &B::Device,
    ) -> Result<Option<(ResNet<B>, O, TrainingState)>>
    where
        B: AutodiffBackend,
        O: Optimizer<ResNet<B>, B>,
    {
        let state_path = self.directory.join(STATE);
        if !state_path.exists() {
            return Ok(None);
        }

        let state: TrainingState = serde_json::from_str(&std::fs::read_to_string(state_path)?)?;

        let record = self.recorder.load(self.directory.join(MODEL), device)?;
        let model = model.load_record(record);

        let optim = if self.record_exists(OPTIMIZER) {
            let record = self.recorder.load(self.directory.join(OPTIMIZER), device)?;
            optim.load_record(record)
        } else {
            log::warn!(
                "No optimizer state in {}, momentum starts from zero",
                self.directory.display()
            );
            optim
        };

        Ok(Some((model, optim, state)))
    }

    /// Loads the best model for inference.
    pub fn load_best<B: Backend>(&self, model: ResNet<B>, device: &B::Device) -> Result<ResNet<B>> {
        if !self.record_exists(MODEL_BEST) {
            return Err(Error::Config(format!(
                "no best model saved in {}",
                self.directory.display()
            )));
        }

        let record = self.recorder.load(self.directory.join(MODEL_BEST), device)?;
        Ok(model.load_record(record))
    }

    /// The file recorder appends its own extension to the record name.
    fn record_exists(&self, name: &str) -> bool {
        self.directory.join(format!("{name}.mpk")).exists()
    }
}
