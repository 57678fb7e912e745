//! Persists sanitized manifests as `<dir>/<name>-<suffix>.yaml`.

use std::path::{Component, Path, PathBuf};

use crate::harvest::traits::{HarvestStage, WriteError};
use crate::model::SanitizedManifest;

/// Writer stage: [`SanitizedManifest`] → path of the written file.
///
/// Existing files are overwritten without notice.
#[derive(Debug, Clone)]
pub struct ManifestWriter {
    output_dir: PathBuf,
}

impl ManifestWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Resolves the file a manifest is written to.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the manifest kind is unknown or its name is not a
    /// single plain path component (path traversal guard).
    pub fn manifest_path(&self, manifest: &SanitizedManifest) -> Result<PathBuf, WriteError> {
        let kind = manifest
            .object_kind()
            .ok_or_else(|| WriteError::UnknownKind(manifest.kind.clone()))?;

        let file_name = format!("{}-{}.yaml", manifest.name(), kind.file_suffix());

        let mut components = Path::new(&file_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.output_dir.join(file_name)),
            _ => Err(WriteError::InvalidName(manifest.name().to_string())),
        }
    }

    /// Creates the output directory (and its parents) if missing.
    pub fn prepare(&self) -> Result<(), WriteError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|source| WriteError::Io {
            path: self.output_dir.clone(),
            source,
        })
    }

    pub fn write(&self, manifest: &SanitizedManifest) -> Result<PathBuf, WriteError> {
        let path = self.manifest_path(manifest)?;

        let text = serde_yaml::to_string(manifest).map_err(|e| WriteError::Serialize {
            name: manifest.name().to_string(),
            message: e.to_string(),
        })?;

        self.prepare()?;
        std::fs::write(&path, text).map_err(|source| WriteError::Io {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }
}

impl HarvestStage for ManifestWriter {
    type Input = SanitizedManifest;
    type Output = PathBuf;
    type Error = WriteError;

    fn execute(&self, input: Self::Input) -> Result<Self::Output, Self::Error> {
        self.write(&input)
    }

    fn stage_name(&self) -> &'static str {
        "write"
    }
}
