//! Snapshot container and area-fraction log.
//!
//! Every dataset is gathered to rank 0 and written as raw little-endian
//! `f64` of shape `[nx, padded_ny]` (transform padding columns included) to
//! `<root>/<name>.f64`; `<root>/manifest.json` lists the datasets written so
//! far. Only rank 0 touches the file system, but every call here is a
//! collective: all workers call it, and an I/O failure on rank 0 is
//! reported to every worker so the group stops together.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::comm::{Communicator, ReduceOp};
use crate::field::RealField;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("manifest serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("output failed on rank 0")]
    RootFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub name: String,
    pub file: PathBuf,
    pub shape: [usize; 2],
    pub dtype: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub datasets: Vec<DatasetEntry>,
}

impl Manifest {
    pub fn load(root: &Path) -> Result<Self, OutputError> {
        let file = File::open(root.join(MANIFEST_FILE))?;
        Ok(serde_json::from_reader(file)?)
    }
}

/// Dataset name of output frame `frame` in `group`, e.g. `eta0/000003`.
pub fn frame_name(group: &str, frame: usize) -> String {
    format!("{group}/{frame:06}")
}

/// Share the outcome of a root-only operation with the whole group.
fn agree<C: Communicator>(comm: &C, result: Result<(), OutputError>) -> Result<(), OutputError> {
    let failed = comm.all_reduce(if result.is_err() { 1.0 } else { 0.0 }, ReduceOp::Max) > 0.0;
    match result {
        Err(err) => Err(err),
        Ok(()) if failed => Err(OutputError::RootFailed),
        Ok(()) => Ok(()),
    }
}

pub struct SnapshotWriter {
    root: PathBuf,
    manifest: Manifest,
}

impl SnapshotWriter {
    /// Start a fresh container at `root`, discarding a previous manifest.
    pub fn create<C: Communicator>(comm: &C, root: &Path) -> Result<Self, OutputError> {
        let writer = Self {
            root: root.to_path_buf(),
            manifest: Manifest::default(),
        };
        let result = if comm.is_root() {
            fs::create_dir_all(root)
                .map_err(OutputError::from)
                .and_then(|()| writer.save_manifest())
        } else {
            Ok(())
        };
        agree(comm, result)?;
        Ok(writer)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Gather `field` from every worker and store it under `name`.
    pub fn write<C: Communicator>(
        &mut self,
        comm: &C,
        name: &str,
        field: &RealField,
    ) -> Result<(), OutputError> {
        let grid = field.layout().grid;
        let gathered = comm.gather(field.as_slice().to_vec());
        let result = match gathered {
            Some(blocks) => self.store(name, [grid.nx, grid.padded_ny()], &blocks),
            None => Ok(()),
        };
        agree(comm, result)
    }

    fn store(&mut self, name: &str, shape: [usize; 2], blocks: &[Vec<f64>]) -> Result<(), OutputError> {
        let total: usize = blocks.iter().map(Vec::len).sum();
        if total != shape[0] * shape[1] {
            return Err(OutputError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("dataset {name}: gathered {total} values for shape {shape:?}"),
            )));
        }
        let file = PathBuf::from(format!("{name}.f64"));
        let path = self.root.join(&file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(&path)?);
        for value in blocks.iter().flatten() {
            out.write_all(&value.to_le_bytes())?;
        }
        out.flush()?;

        let entry = DatasetEntry {
            name: name.to_string(),
            file,
            shape,
            dtype: "f64le".to_string(),
        };
        match self.manifest.datasets.iter_mut().find(|d| d.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.manifest.datasets.push(entry),
        }
        self.save_manifest()
    }

    fn save_manifest(&self) -> Result<(), OutputError> {
        let file = File::create(self.root.join(MANIFEST_FILE))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.manifest)?;
        Ok(())
    }
}

/// Read back a dataset written by [`SnapshotWriter`].
pub fn read_dataset(root: &Path, entry: &DatasetEntry) -> Result<Vec<f64>, OutputError> {
    let bytes = fs::read(root.join(&entry.file))?;
    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect())
}

/// Append-only `(step, area_fraction)` text log.
pub struct AreaLog {
    path: PathBuf,
}

impl AreaLog {
    /// Truncate (or create) the log.
    pub fn create<C: Communicator>(comm: &C, path: &Path) -> Result<Self, OutputError> {
        let result = if comm.is_root() {
            truncate(path)
        } else {
            Ok(())
        };
        agree(comm, result)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append<C: Communicator>(&self, comm: &C, step: usize, area: f64) -> Result<(), OutputError> {
        let result = if comm.is_root() {
            append_line(&self.path, &format_area_line(step, area))
        } else {
            Ok(())
        };
        agree(comm, result)
    }
}

fn truncate(path: &Path) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    File::create(path)?;
    Ok(())
}

fn append_line(path: &Path, line: &str) -> Result<(), OutputError> {
    let mut file = OpenOptions::new().append(true).create(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

pub fn format_area_line(step: usize, area: f64) -> String {
    format!("{step:>10} {area:12.10}")
}
