//! Per-build state threaded through directive execution.

use nut_driver::ContainerHandle;

use crate::manifest::Manifest;

/// Context of one build: the container being built and everything the
/// directives have accumulated so far.
#[derive(Debug, Clone, Default)]
pub struct BuildState {
    /// Container created by FROM.
    pub container: Option<ContainerHandle>,
    /// `KEY=VALUE` entries exported to every RUN.
    pub env: Vec<String>,
    /// Directory RUN commands start in.
    pub cwd: Option<String>,
    /// Manifest under construction.
    pub manifest: Manifest,
    /// Set once CMD or ENTRYPOINT has run.
    pub entry_point_set: bool,
}

impl BuildState {
    /// Empty state for a new build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt the manifest inherited from a base image.
    ///
    /// The inherited environment and working directory also apply to the
    /// commands run by this build.
    pub fn inherit(&mut self, manifest: Manifest) {
        self.env = manifest.env.clone();
        self.cwd = manifest.work_dir.clone();
        self.manifest = manifest;
    }

    /// Append an environment entry to both the live env and the manifest.
    pub fn push_env(&mut self, var: &str) {
        self.env.push(var.to_string());
        self.manifest.env.push(var.to_string());
    }

    /// Set the working directory for later commands and the manifest.
    pub fn set_workdir(&mut self, path: &str) {
        self.cwd = Some(path.to_string());
        self.manifest.work_dir = Some(path.to_string());
    }
}
