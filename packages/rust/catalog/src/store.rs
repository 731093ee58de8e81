//! Atomic catalog snapshot persistence.
//!
//! A snapshot is published by writing the serialized catalog to a hidden
//! temp file next to the target and renaming it into place. A crash at any
//! point leaves either the previous snapshot or the new one — never a
//! partial file.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use ohpmatlas_shared::{AtlasError, CURRENT_SCHEMA_VERSION, Catalog, Result};

/// Read/write handle for the catalog snapshot file.
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    /// Create a store for the snapshot at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The snapshot path this store publishes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically publish a catalog snapshot.
    ///
    /// Writes to `.<name>.tmp-<run_id>` in the target directory and renames
    /// over the final path. Any failure is a [`AtlasError::Persistence`] and
    /// leaves the previously published snapshot untouched.
    pub fn write(&self, catalog: &Catalog) -> Result<()> {
        let json = serde_json::to_string_pretty(catalog)
            .map_err(|e| AtlasError::Persistence(format!("snapshot serialization failed: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AtlasError::Persistence(format!(
                    "cannot create snapshot directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                AtlasError::Persistence(format!("invalid snapshot path {}", self.path.display()))
            })?;
        let temp = self
            .path
            .with_file_name(format!(".{name}.tmp-{}", catalog.run_id));

        std::fs::write(&temp, &json).map_err(|e| {
            AtlasError::Persistence(format!("cannot write {}: {e}", temp.display()))
        })?;

        if let Err(e) = std::fs::rename(&temp, &self.path) {
            let _ = std::fs::remove_file(&temp);
            return Err(AtlasError::Persistence(format!(
                "cannot publish {}: {e}",
                self.path.display()
            )));
        }

        info!(
            path = %self.path.display(),
            packages = catalog.total_packages,
            run_id = %catalog.run_id,
            "snapshot published"
        );
        Ok(())
    }

    /// Read the published snapshot.
    ///
    /// Errors clearly when the file is absent, unparseable, missing required
    /// keys, or carries an unsupported schema version.
    pub fn read(&self) -> Result<Catalog> {
        if !self.path.exists() {
            return Err(AtlasError::validation(format!(
                "snapshot not found at {} — run `ohpm-atlas crawl` first",
                self.path.display()
            )));
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| AtlasError::io(&self.path, e))?;

        let catalog: Catalog = serde_json::from_str(&content).map_err(|e| {
            AtlasError::validation(format!("invalid snapshot {}: {e}", self.path.display()))
        })?;

        if catalog.schema_version != CURRENT_SCHEMA_VERSION {
            return Err(AtlasError::validation(format!(
                "unsupported snapshot schema_version: {} (expected {})",
                catalog.schema_version, CURRENT_SCHEMA_VERSION
            )));
        }

        debug!(
            path = %self.path.display(),
            packages = catalog.total_packages,
            "snapshot loaded"
        );
        Ok(catalog)
    }
}
