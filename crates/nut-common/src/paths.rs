//! LXC filesystem layout used by nut.

use std::path::PathBuf;

use once_cell::sync::Lazy;

/// Default LXC container root.
pub static NUT_LXC_PATH: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("NUT_LXC_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/lxc"))
});

/// File name of the manifest written next to a container's rootfs.
pub const MANIFEST_FILE: &str = "manifest.yml";

/// Paths under the LXC container root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NutPaths {
    /// LXC container root (default: /var/lib/lxc).
    pub lxc_path: PathBuf,
}

impl NutPaths {
    /// Create paths with the default location.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom LXC root.
    #[must_use]
    pub fn with_lxc_path(lxc_path: impl Into<PathBuf>) -> Self {
        Self {
            lxc_path: lxc_path.into(),
        }
    }

    /// Directory for a specific container.
    #[must_use]
    pub fn container(&self, name: &str) -> PathBuf {
        self.lxc_path.join(name)
    }

    /// Default rootfs directory of a container.
    #[must_use]
    pub fn container_rootfs(&self, name: &str) -> PathBuf {
        self.container(name).join("rootfs")
    }

    /// Image manifest of a container, one level above its rootfs.
    #[must_use]
    pub fn container_manifest(&self, name: &str) -> PathBuf {
        self.container(name).join(MANIFEST_FILE)
    }
}

impl Default for NutPaths {
    fn default() -> Self {
        Self {
            lxc_path: NUT_LXC_PATH.clone(),
        }
    }
}
