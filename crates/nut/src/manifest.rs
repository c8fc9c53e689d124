//! Image manifest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use nut_common::paths::MANIFEST_FILE;
use nut_common::{NutError, NutResult};
use serde::{Deserialize, Serialize};

/// Metadata describing a built image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Manifest {
    /// `KEY=VALUE` environment entries; later entries win.
    pub env: Vec<String>,
    /// Image labels.
    pub labels: BTreeMap<String, String>,
    /// Exposed ports, in declaration order.
    pub exposed_ports: Vec<u16>,
    /// Maintainers.
    pub maintainers: Vec<String>,
    /// Default working directory.
    pub work_dir: Option<String>,
    /// Default user.
    pub user: Option<String>,
    /// Command run when the image starts.
    pub entry_point: Vec<String>,
}

impl Manifest {
    /// Record an exposed port; repeats are ignored.
    pub fn expose(&mut self, port: u16) {
        if !self.exposed_ports.contains(&port) {
            self.exposed_ports.push(port);
        }
    }

    /// Load a manifest from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn load(path: &Path) -> NutResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        let manifest = serde_yaml::from_str(&yaml)?;

        tracing::debug!(path = %path.display(), "Loaded manifest");
        Ok(manifest)
    }

    /// Write the manifest as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> NutResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;

        tracing::debug!(path = %path.display(), "Saved manifest");
        Ok(())
    }

    /// Manifest location for a container whose root filesystem is `rootfs`:
    /// one level above it.
    ///
    /// # Errors
    ///
    /// Returns an error if `rootfs` has no parent.
    pub fn path_beside(rootfs: &Path) -> NutResult<PathBuf> {
        let dir = rootfs.parent().ok_or_else(|| NutError::Config {
            message: format!("rootfs {} has no parent directory", rootfs.display()),
        })?;
        Ok(dir.join(MANIFEST_FILE))
    }

    /// Write the manifest beside a container's rootfs and return its path.
    ///
    /// # Errors
    ///
    /// Returns an error if `rootfs` has no parent or the write fails.
    pub fn write_beside(&self, rootfs: &Path) -> NutResult<PathBuf> {
        let path = Self::path_beside(rootfs)?;
        self.save(&path)?;
        Ok(path)
    }
}
