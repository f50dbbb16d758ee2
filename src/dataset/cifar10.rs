//! CIFAR-10 Binary Dataset
//!
//! Reads the binary release of CIFAR-10 (`cifar-10-batches-bin/`), where each
//! record is one label byte followed by 3072 pixel bytes: the 32x32 red plane,
//! then green, then blue, each row-major.
//!
//! [`ensure_available`] downloads and unpacks the archive when the extracted
//! batches are missing, and is a no-op otherwise.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;
use image::RgbImage;
use tracing::{debug, info};

use crate::utils::error::{Cifar10Error, Result, ResultExt};

/// Class names in label order
pub const CLASS_NAMES: [&str; 10] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

pub const NUM_CLASSES: usize = CLASS_NAMES.len();

/// Side length of a stored CIFAR-10 image
pub const IMAGE_SIDE: u32 = 32;

const PLANE_SIZE: usize = (IMAGE_SIDE * IMAGE_SIDE) as usize;
const IMAGE_BYTES: usize = 3 * PLANE_SIZE;
const RECORD_SIZE: usize = 1 + IMAGE_BYTES;

const ARCHIVE_URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz";
const ARCHIVE_NAME: &str = "cifar-10-binary.tar.gz";
const EXTRACTED_DIR: &str = "cifar-10-batches-bin";

const TRAIN_FILES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const TEST_FILES: [&str; 1] = ["test_batch.bin"];

/// Which half of the dataset to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Validation,
}

impl Split {
    fn files(&self) -> &'static [&'static str] {
        match self {
            Split::Train => &TRAIN_FILES,
            Split::Validation => &TEST_FILES,
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Validation => write!(f, "validation"),
        }
    }
}

/// A single CIFAR-10 sample
#[derive(Debug, Clone)]
pub struct Cifar10Item {
    pub image: RgbImage,
    pub label: usize,
}

/// In-memory CIFAR-10 split
#[derive(Debug, Clone)]
pub struct Cifar10Dataset {
    items: Vec<Cifar10Item>,
    split: Split,
}

impl Cifar10Dataset {
    /// Load a split from the directory holding the extracted `.bin` files
    pub fn load(batches_dir: &Path, split: Split) -> Result<Self> {
        let mut items = Vec::new();
        for name in split.files() {
            let path = batches_dir.join(name);
            let mut batch = load_batch_file(&path)?;
            debug!("Loaded {} records from {}", batch.len(), path.display());
            items.append(&mut batch);
        }

        info!("Loaded {} {} samples", items.len(), split);
        Ok(Self { items, split })
    }

    pub fn from_items(items: Vec<Cifar10Item>, split: Split) -> Self {
        Self { items, split }
    }

    pub fn split(&self) -> Split {
        self.split
    }

    /// Number of samples per class
    pub fn class_distribution(&self) -> [usize; NUM_CLASSES] {
        let mut counts = [0; NUM_CLASSES];
        for item in &self.items {
            counts[item.label] += 1;
        }
        counts
    }
}

impl Dataset<Cifar10Item> for Cifar10Dataset {
    fn get(&self, index: usize) -> Option<Cifar10Item> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Parse one binary batch file into samples.
///
/// The file must hold a non-zero whole number of records and every label
/// must be a valid class index.
pub fn load_batch_file(path: &Path) -> Result<Vec<Cifar10Item>> {
    let bytes = fs::read(path).dataset_context(&format!("Failed to read {}", path.display()))?;

    if bytes.is_empty() || bytes.len() % RECORD_SIZE != 0 {
        return Err(Cifar10Error::Dataset(format!(
            "{} has {} bytes, expected a multiple of {}",
            path.display(),
            bytes.len(),
            RECORD_SIZE
        )));
    }

    bytes
        .chunks_exact(RECORD_SIZE)
        .enumerate()
        .map(|(index, record)| {
            let label = record[0] as usize;
            if label >= NUM_CLASSES {
                return Err(Cifar10Error::Dataset(format!(
                    "{} record {} has label {}, expected 0..{}",
                    path.display(),
                    index,
                    label,
                    NUM_CLASSES
                )));
            }

            let image = planar_to_image(&record[1..])
                .ok_or_else(|| Cifar10Error::Image(path.to_path_buf(), index))?;
            Ok(Cifar10Item { image, label })
        })
        .collect()
}

/// Interleave the three colour planes into an RGB image
fn planar_to_image(planes: &[u8]) -> Option<RgbImage> {
    if planes.len() != IMAGE_BYTES {
        return None;
    }

    let (red, rest) = planes.split_at(PLANE_SIZE);
    let (green, blue) = rest.split_at(PLANE_SIZE);

    let mut pixels = Vec::with_capacity(IMAGE_BYTES);
    for i in 0..PLANE_SIZE {
        pixels.extend_from_slice(&[red[i], green[i], blue[i]]);
    }

    RgbImage::from_raw(IMAGE_SIDE, IMAGE_SIDE, pixels)
}

fn batches_present(batches_dir: &Path) -> bool {
    TRAIN_FILES
        .iter()
        .chain(TEST_FILES.iter())
        .all(|name| batches_dir.join(name).is_file())
}

/// Make sure the extracted binary batches exist under `data_dir`.
///
/// Returns the directory holding the `.bin` files. Downloads and unpacks the
/// archive when they are missing and `download` is set; fails otherwise.
pub fn ensure_available(data_dir: &Path, download: bool) -> Result<PathBuf> {
    let batches_dir = data_dir.join(EXTRACTED_DIR);
    if batches_present(&batches_dir) {
        debug!("CIFAR-10 batches found in {}", batches_dir.display());
        return Ok(batches_dir);
    }

    if !download {
        return Err(Cifar10Error::Dataset(format!(
            "CIFAR-10 batches not found in {} and download is disabled",
            batches_dir.display()
        )));
    }

    fs::create_dir_all(data_dir)?;
    let archive_path = data_dir.join(ARCHIVE_NAME);

    if archive_path.is_file() {
        info!("CIFAR-10 archive already exists, skipping download");
    } else {
        download_archive(&archive_path)?;
    }

    extract_tar_gz(&archive_path, data_dir)?;

    if !batches_present(&batches_dir) {
        return Err(Cifar10Error::Download(format!(
            "{} did not contain the expected batch files",
            archive_path.display()
        )));
    }

    Ok(batches_dir)
}

fn download_archive(dest: &Path) -> Result<()> {
    info!("Downloading CIFAR-10 dataset from {}...", ARCHIVE_URL);

    let bytes = reqwest::blocking::get(ARCHIVE_URL)
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.bytes())
        .map_err(|e| Cifar10Error::Download(format!("Failed to download: {}", e)))?;

    // Only a complete archive ever appears under `dest`.
    let partial = dest.with_extension("part");
    let mut file = File::create(&partial)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    fs::rename(&partial, dest)?;

    info!("Download complete ({} bytes)", bytes.len());
    Ok(())
}

fn extract_tar_gz(archive_path: &Path, output_dir: &Path) -> Result<()> {
    info!("Extracting {}...", archive_path.display());

    let tar_gz = File::open(archive_path)?;
    let decompressor = flate2::read::GzDecoder::new(tar_gz);
    let mut archive = tar::Archive::new(decompressor);
    archive
        .unpack(output_dir)
        .map_err(|e| Cifar10Error::Download(format!("Failed to extract: {}", e)))?;

    info!("Extraction complete");
    Ok(())
}
