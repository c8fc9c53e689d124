//! Driver configuration.

use std::path::PathBuf;

use nut_common::NutPaths;

/// LXC driver configuration options.
#[derive(Debug, Clone, Default)]
pub struct DriverConfig {
    /// LXC container layout.
    pub paths: NutPaths,
    /// Clone as a copy-on-write snapshot instead of a full copy.
    pub snapshot: bool,
    /// Backing store for new clones (`dir`, `overlay`, `btrfs`, ...).
    pub backing_store: Option<String>,
}

impl DriverConfig {
    /// Set the LXC container root.
    #[must_use]
    pub fn with_lxc_path(mut self, lxc_path: impl Into<PathBuf>) -> Self {
        self.paths = NutPaths::with_lxc_path(lxc_path);
        self
    }

    /// Clone containers as snapshots.
    #[must_use]
    pub fn with_snapshot(mut self) -> Self {
        self.snapshot = true;
        self
    }

    /// Set the backing store for clones.
    #[must_use]
    pub fn with_backing_store(mut self, backing_store: impl Into<String>) -> Self {
        self.backing_store = Some(backing_store.into());
        self
    }
}
