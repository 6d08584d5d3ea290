//! Local metadata reader
//!
//! Terraform keeps the backend a working directory was initialized with in
//! `.terraform/terraform.tfstate`. `TF_DATA_DIR` relocates the `.terraform`
//! directory.

use std::path::{Path, PathBuf};

use statekeeper_core::BackendRecord;

use crate::error::{StateError, StateResult};
use crate::metadata::TerraformMetadata;

/// Reader for the metadata file of one working directory
#[derive(Debug, Clone)]
pub struct LocalMetadata {
    /// Path to the metadata file
    path: PathBuf,
}

impl LocalMetadata {
    /// Default data directory name
    pub const DEFAULT_DATA_DIR: &'static str = ".terraform";

    /// Metadata file name inside the data directory
    pub const METADATA_FILE: &'static str = "terraform.tfstate";

    /// Environment variable overriding the data directory
    pub const DATA_DIR_ENV: &'static str = "TF_DATA_DIR";

    /// Reader for `working_dir`, honouring `TF_DATA_DIR`
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        let data_dir = std::env::var_os(Self::DATA_DIR_ENV).map(PathBuf::from);
        Self::with_data_dir(working_dir, data_dir)
    }

    /// Reader with an explicit data directory (relative paths resolve against `working_dir`)
    pub fn with_data_dir(working_dir: impl AsRef<Path>, data_dir: Option<PathBuf>) -> Self {
        let working_dir = working_dir.as_ref();
        let data_dir = match data_dir {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => working_dir.join(dir),
            None => working_dir.join(Self::DEFAULT_DATA_DIR),
        };

        Self::with_path(data_dir.join(Self::METADATA_FILE))
    }

    /// Reader for a specific metadata file
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Get the metadata file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the metadata file; `None` if it does not exist
    pub fn read(&self) -> StateResult<Option<TerraformMetadata>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No backend metadata at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(StateError::Io {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let metadata: TerraformMetadata =
            serde_json::from_str(&content).map_err(|e| StateError::InvalidMetadata {
                path: self.path.clone(),
                source: e,
            })?;

        if metadata.version > TerraformMetadata::CURRENT_VERSION {
            log::warn!(
                "Backend metadata at {} has version {}, newer than the supported version {}",
                self.path.display(),
                metadata.version,
                TerraformMetadata::CURRENT_VERSION
            );
        }

        Ok(Some(metadata))
    }

    /// Read the recorded backend declaration, if any
    pub fn backend_record(&self) -> StateResult<Option<BackendRecord>> {
        Ok(self.read()?.and_then(|metadata| metadata.backend_record()))
    }
}

/// Read the backend declaration recorded in `working_dir`
pub fn read_backend_record(working_dir: impl AsRef<Path>) -> StateResult<Option<BackendRecord>> {
    LocalMetadata::new(working_dir).backend_record()
}
