use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;

const SCALARS_HEADER: &str = "epoch,train_acc,test_acc,train_loss,test_loss,lr";

/// Text logs of a run, kept next to the `config.json` of the run.
///
/// - `log_train.csv`: training progress lines.
/// - `log_test.csv`: validation results, per-class accuracy and best accuracy.
/// - `scalars.csv`: one row of epoch level scalars per epoch.
pub struct RunLog {
    train: BufWriter<File>,
    test: BufWriter<File>,
    scalars: BufWriter<File>,
}

/// Epoch level scalars.
#[derive(Debug, Clone, Copy)]
pub struct EpochScalars {
    pub epoch: usize,
    pub train_acc: f64,
    pub test_acc: f64,
    pub train_loss: f64,
    pub test_loss: f64,
    pub lr: f64,
}

impl RunLog {
    pub fn create<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref();
        std::fs::create_dir_all(directory)?;

        let mut scalars = BufWriter::new(File::create(directory.join("scalars.csv"))?);
        writeln!(scalars, "{SCALARS_HEADER}")?;
        scalars.flush()?;

        Ok(Self {
            train: BufWriter::new(File::create(directory.join("log_train.csv"))?),
            test: BufWriter::new(File::create(directory.join("log_test.csv"))?),
            scalars,
        })
    }

    pub fn train_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.train, "{line}")?;
        self.train.flush()?;
        Ok(())
    }

    pub fn test_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.test, "{line}")?;
        self.test.flush()?;
        Ok(())
    }

    pub fn scalars(&mut self, scalars: &EpochScalars) -> Result<()> {
        writeln!(
            self.scalars,
            "{},{:.4},{:.4},{:.6},{:.6},{}",
            scalars.epoch,
            scalars.train_acc,
            scalars.test_acc,
            scalars.train_loss,
            scalars.test_loss,
            scalars.lr
        )?;
        self.scalars.flush()?;
        Ok(())
    }
}
