use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const WIDTH: usize = 32;
pub const HEIGHT: usize = 32;
pub const CHANNELS: usize = 3;
pub const IMAGE_BYTES: usize = WIDTH * HEIGHT * CHANNELS;

const CIFAR10_DIR: &str = "cifar-10-batches-bin";
const CIFAR10_TRAIN: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const CIFAR10_TEST: &str = "test_batch.bin";

const CIFAR100_DIR: &str = "cifar-100-binary";
const CIFAR100_TRAIN: &str = "train.bin";
const CIFAR100_TEST: &str = "test.bin";

/// Which CIFAR distribution to read.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CifarVariant {
    Cifar10,
    Cifar100,
}

impl CifarVariant {
    pub fn num_classes(&self) -> usize {
        match self {
            Self::Cifar10 => 10,
            Self::Cifar100 => 100,
        }
    }

    /// Number of label bytes in front of each record.
    fn label_bytes(&self) -> usize {
        match self {
            Self::Cifar10 => 1,
            Self::Cifar100 => 2,
        }
    }

    fn record_size(&self) -> usize {
        self.label_bytes() + IMAGE_BYTES
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cifar10 => "cifar10",
            Self::Cifar100 => "cifar100",
        }
    }

    fn files(&self, split: CifarSplit) -> Vec<PathBuf> {
        match (self, split) {
            (Self::Cifar10, CifarSplit::Train) => CIFAR10_TRAIN
                .iter()
                .map(|name| Path::new(CIFAR10_DIR).join(name))
                .collect(),
            (Self::Cifar10, CifarSplit::Test) => vec![Path::new(CIFAR10_DIR).join(CIFAR10_TEST)],
            (Self::Cifar100, CifarSplit::Train) => {
                vec![Path::new(CIFAR100_DIR).join(CIFAR100_TRAIN)]
            }
            (Self::Cifar100, CifarSplit::Test) => vec![Path::new(CIFAR100_DIR).join(CIFAR100_TEST)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CifarSplit {
    Train,
    Test,
}

/// CIFAR item.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CifarItem {
    /// Image bytes in channel-planar order: the red plane, then green, then blue.
    pub image: Vec<u8>,

    /// Label of the image (the fine label for CIFAR-100).
    pub label: usize,
}

/// The CIFAR datasets read from the binary distribution.
///
/// The archives are expected to be already extracted under `root`, e.g.
/// `root/cifar-10-batches-bin/data_batch_1.bin` or `root/cifar-100-binary/train.bin`.
/// CIFAR is small enough to be kept in memory (50,000 training images take 150Mb).
pub struct CifarDataset {
    items: Vec<CifarItem>,
    variant: CifarVariant,
}

impl Dataset<CifarItem> for CifarDataset {
    fn get(&self, index: usize) -> Option<CifarItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

impl CifarDataset {
    /// Creates a new train dataset.
    pub fn train<P: AsRef<Path>>(root: P, variant: CifarVariant) -> Result<Self> {
        Self::load(root, variant, CifarSplit::Train)
    }

    /// Creates a new test dataset.
    pub fn test<P: AsRef<Path>>(root: P, variant: CifarVariant) -> Result<Self> {
        Self::load(root, variant, CifarSplit::Test)
    }

    pub fn load<P: AsRef<Path>>(root: P, variant: CifarVariant, split: CifarSplit) -> Result<Self> {
        let mut items = Vec::new();

        for file in variant.files(split) {
            let path = root.as_ref().join(file);
            if !path.exists() {
                return Err(Error::Dataset(format!(
                    "{} not found, the {} binary archive must be extracted under {}",
                    path.display(),
                    variant.name(),
                    root.as_ref().display()
                )));
            }

            let mut bytes = Vec::new();
            File::open(&path)?.read_to_end(&mut bytes)?;
            items.extend(Self::parse_records(&bytes, variant, &path)?);
        }

        log::info!(
            "Loaded {} {} images for split {:?}",
            items.len(),
            variant.name(),
            split
        );

        Ok(Self { items, variant })
    }

    /// Builds a dataset from items already in memory.
    pub fn from_items(items: Vec<CifarItem>, variant: CifarVariant) -> Result<Self> {
        let num_classes = variant.num_classes();
        if let Some(item) = items.iter().find(|item| item.label >= num_classes) {
            return Err(Error::Dataset(format!(
                "label {} is out of range for {}",
                item.label,
                variant.name()
            )));
        }

        Ok(Self { items, variant })
    }

    fn parse_records(bytes: &[u8], variant: CifarVariant, path: &Path) -> Result<Vec<CifarItem>> {
        let record_size = variant.record_size();
        if bytes.len() % record_size != 0 {
            return Err(Error::Dataset(format!(
                "{} has {} bytes which is not a multiple of the {} bytes record size",
                path.display(),
                bytes.len(),
                record_size
            )));
        }

        let label_bytes = variant.label_bytes();
        let num_classes = variant.num_classes();

        bytes
            .chunks_exact(record_size)
            .map(|record| {
                // The last label byte is the fine label for CIFAR-100.
                let label = record[label_bytes - 1] as usize;
                if label >= num_classes {
                    return Err(Error::Dataset(format!(
                        "{} contains label {label} out of range for {}",
                        path.display(),
                        variant.name()
                    )));
                }

                Ok(CifarItem {
                    image: record[label_bytes..].to_vec(),
                    label,
                })
            })
            .collect()
    }

    pub fn variant(&self) -> CifarVariant {
        self.variant
    }

    /// Labels of every item, in dataset order.
    pub fn targets(&self) -> Vec<usize> {
        self.items.iter().map(|item| item.label).collect()
    }
}
