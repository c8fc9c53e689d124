//! Image builder.
//!
//! [`Builder::build`] replays a script's directives one at a time against a
//! container. Each directive consumes the current [`BuildState`] and hands
//! back the next one; a failing directive hands the state back inside
//! [`Halted`] so the container is never lost. Nothing is cleaned up on
//! failure: the caller decides whether to [`Builder::stop`],
//! [`Builder::destroy`] or inspect what was built so far.

use std::path::{Path, PathBuf};

use nut_common::{ContainerName, NutError, NutPaths, NutResult};
use nut_driver::{ContainerDriver, ContainerHandle, ContainerStatus, VolumeSpec};

use crate::artifact;
use crate::directive::Directive;
use crate::exec;
use crate::manifest::Manifest;
use crate::script::Script;
use crate::staging;
use crate::state::BuildState;

/// Build options.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Host directories mounted into the build container.
    pub volumes: Vec<VolumeSpec>,
    /// Host directory receiving extracted artifacts.
    pub artifact_dir: PathBuf,
    /// LXC layout, the fallback for locating base image manifests.
    pub paths: NutPaths,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            volumes: Vec::new(),
            artifact_dir: PathBuf::from("."),
            paths: NutPaths::new(),
        }
    }
}

impl BuildOptions {
    /// Mount a volume into the build container.
    #[must_use]
    pub fn with_volume(mut self, volume: VolumeSpec) -> Self {
        self.volumes.push(volume);
        self
    }

    /// Set where artifacts are extracted to.
    #[must_use]
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    /// Set the LXC layout.
    #[must_use]
    pub fn with_paths(mut self, paths: NutPaths) -> Self {
        self.paths = paths;
        self
    }
}

/// A directive failed; carries the state as it was when it failed.
#[derive(Debug, thiserror::Error)]
#[error("{directive} directive failed: {error}")]
pub struct Halted {
    /// Keyword of the failing directive.
    pub directive: &'static str,
    /// Build state at the time of failure.
    pub state: Box<BuildState>,
    /// Why the directive failed.
    #[source]
    pub error: NutError,
}

/// Image builder.
pub struct Builder<D> {
    /// Name of the container being built.
    name: ContainerName,
    /// Runtime driver.
    driver: D,
    /// Build options.
    options: BuildOptions,
    /// State left by the last build, successful or not.
    state: Option<BuildState>,
}

impl<D: ContainerDriver> Builder<D> {
    /// Create a builder with default options.
    pub fn new(name: ContainerName, driver: D) -> Self {
        Self::with_options(name, driver, BuildOptions::default())
    }

    /// Create a builder with options.
    pub fn with_options(name: ContainerName, driver: D, options: BuildOptions) -> Self {
        Self {
            name,
            driver,
            options,
            state: None,
        }
    }

    /// Name of the container being built.
    pub fn name(&self) -> &ContainerName {
        &self.name
    }

    /// Runtime driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// State left by the last build.
    pub fn state(&self) -> Option<&BuildState> {
        self.state.as_ref()
    }

    /// Build the image described by `script` and return its manifest.
    ///
    /// Every directive is validated before the first one runs.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; the partially built container is left
    /// in place.
    pub async fn build(&mut self, script: &Script) -> NutResult<Manifest> {
        let directives = script.directives()?;
        let bases = directives
            .iter()
            .filter(|d| matches!(d, Directive::From { .. }))
            .count();
        if bases > 1 {
            tracing::error!(bases, "Multiple FROM declarations");
            return Err(NutError::DuplicateFrom);
        }
        tracing::info!(container = %self.name, directives = directives.len(), "Building image");

        let mut state = BuildState::new();
        for (statement, directive) in script.statements().iter().zip(&directives) {
            tracing::info!(line = statement.line(), statement = %statement, "Processing");

            state = match self.apply(state, directive).await {
                Ok(next) => next,
                Err(halted) => {
                    self.state = Some(*halted.state);
                    return Err(halted.error);
                }
            };
        }

        let result = self.finish(&state).await;
        self.state = Some(state);
        result
    }

    /// Apply one directive to `state`, returning the next state.
    ///
    /// # Errors
    ///
    /// Returns [`Halted`] with the state as it stood when the directive
    /// failed.
    pub async fn apply(
        &self,
        mut state: BuildState,
        directive: &Directive,
    ) -> Result<BuildState, Halted> {
        match self.execute(&mut state, directive).await {
            Ok(()) => Ok(state),
            Err(error) => {
                tracing::error!(directive = %directive, error = %error, "Directive failed");
                Err(Halted {
                    directive: directive.keyword(),
                    state: Box::new(state),
                    error,
                })
            }
        }
    }

    async fn execute(&self, state: &mut BuildState, directive: &Directive) -> NutResult<()> {
        match directive {
            Directive::From { image } => self.from_base(state, image).await,
            Directive::Run { command } => {
                require_container(state, directive)?;
                tracing::debug!(?command, "Attempting to execute");
                exec::run_command(&self.driver, state, command).await
            }
            Directive::Env { vars } => {
                for var in vars {
                    state.push_env(var);
                }
                Ok(())
            }
            Directive::Workdir { path } => {
                state.set_workdir(path);
                Ok(())
            }
            Directive::Add { src, dest } | Directive::Copy { src, dest } => {
                require_container(state, directive)?;
                staging::add_files(&self.driver, state, src, dest).await
            }
            Directive::Label { entries } => {
                for entry in entries {
                    let (key, value) = entry.split_once('=').ok_or_else(|| {
                        NutError::InvalidLabel {
                            label: entry.clone(),
                        }
                    })?;
                    state
                        .manifest
                        .labels
                        .insert(key.to_string(), value.to_string());
                }
                Ok(())
            }
            Directive::Expose { ports } => {
                for port in ports {
                    match port.parse::<u16>() {
                        Ok(port) => state.manifest.expose(port),
                        Err(e) => {
                            tracing::error!(
                                port = %port,
                                error = %e,
                                "Error parsing port in EXPOSE instruction"
                            );
                        }
                    }
                }
                Ok(())
            }
            Directive::Maintainer { name } => {
                state.manifest.maintainers.push(name.clone());
                Ok(())
            }
            Directive::User { user } => {
                state.manifest.user = Some(user.clone());
                Ok(())
            }
            Directive::Volume | Directive::StopSignal => {
                tracing::debug!(directive = %directive, "Directive not supported yet, ignoring");
                Ok(())
            }
            Directive::Cmd { args } | Directive::Entrypoint { args } => {
                if state.entry_point_set {
                    return Err(NutError::DuplicateEntrypoint);
                }
                state.manifest.entry_point = args.clone();
                state.entry_point_set = true;
                Ok(())
            }
        }
    }

    async fn from_base(&self, state: &mut BuildState, image: &str) -> NutResult<()> {
        if state.container.is_some() {
            return Err(NutError::DuplicateFrom);
        }

        let base = ContainerName::from_reference(image)?;
        let handle = self
            .driver
            .clone_and_start(&base, &self.name, &self.options.volumes)
            .await?;
        state.container = Some(handle);

        let manifest_path = self.base_manifest_path(&base).await;
        match Manifest::load(&manifest_path) {
            Ok(manifest) => {
                tracing::info!(base = %base, "Inheriting manifest from base container");
                state.inherit(manifest);
            }
            Err(e) => {
                tracing::warn!(
                    base = %base,
                    path = %manifest_path.display(),
                    error = %e,
                    "Failed to load manifest from parent container"
                );
            }
        }

        Ok(())
    }

    /// Where the base's manifest was written: beside its rootfs, which for
    /// snapshot clones is not the default layout.
    async fn base_manifest_path(&self, base: &ContainerName) -> PathBuf {
        let handle = ContainerHandle::new(base.clone());
        self.driver
            .rootfs(&handle)
            .await
            .and_then(|rootfs| Manifest::path_beside(&rootfs))
            .unwrap_or_else(|e| {
                tracing::warn!(
                    base = %base,
                    error = %e,
                    "Failed to resolve base rootfs, assuming default layout"
                );
                self.options.paths.container_manifest(base.as_str())
            })
    }

    /// Extract artifacts, then persist the manifest.
    async fn finish(&self, state: &BuildState) -> NutResult<Manifest> {
        let container = state.container.as_ref().ok_or_else(|| NutError::NoContainer {
            directive: "writing the manifest".to_string(),
        })?;

        let extracted =
            artifact::fetch_artifacts(&self.driver, state, &self.options.artifact_dir).await?;

        let rootfs = self.driver.rootfs(container).await?;
        let path = state.manifest.write_beside(&rootfs)?;

        tracing::info!(
            container = %container,
            manifest = %path.display(),
            artifacts = extracted.len(),
            "Image built successfully"
        );
        Ok(state.manifest.clone())
    }

    fn container(&self) -> NutResult<&ContainerHandle> {
        self.state
            .as_ref()
            .and_then(|state| state.container.as_ref())
            .ok_or_else(|| NutError::NoContainer {
                directive: "container lifecycle operations".to_string(),
            })
    }

    async fn defined_status(&self, handle: &ContainerHandle) -> NutResult<ContainerStatus> {
        let status = self.driver.status(handle).await?;
        if !status.is_defined() {
            return Err(NutError::ContainerNotPresent {
                name: handle.name().to_string(),
            });
        }
        Ok(status)
    }

    /// Stop the build container if it is running.
    ///
    /// # Errors
    ///
    /// Fails if no container was created, it no longer exists, or the stop
    /// fails.
    pub async fn stop(&self) -> NutResult<()> {
        let handle = self.container()?;
        if self.defined_status(handle).await? == ContainerStatus::Running {
            self.driver.stop(handle).await?;
        }
        Ok(())
    }

    /// Stop (if running) and destroy the build container.
    ///
    /// # Errors
    ///
    /// Fails if no container was created, it no longer exists, or the
    /// runtime refuses to stop or destroy it.
    pub async fn destroy(&self) -> NutResult<()> {
        let handle = self.container()?;
        if self.defined_status(handle).await? == ContainerStatus::Running {
            if let Err(e) = self.driver.stop(handle).await {
                tracing::error!(container = %handle, error = %e, "Failed to stop running container");
                return Err(e);
            }
        }
        self.driver.destroy(handle).await
    }

    /// Archive the build container into `file`.
    ///
    /// # Errors
    ///
    /// Fails if no container was created or the export fails.
    pub async fn export(&self, file: &Path, sudo: bool) -> NutResult<()> {
        let handle = self.container()?;
        self.driver
            .export(handle.name().as_str(), file, sudo)
            .await
    }
}

fn require_container<'a>(
    state: &'a BuildState,
    directive: &Directive,
) -> NutResult<&'a ContainerHandle> {
    state.container.as_ref().ok_or_else(|| {
        tracing::error!(directive = %directive, "No container has been created yet. Use FROM directive");
        NutError::NoContainer {
            directive: directive.keyword().to_string(),
        }
    })
}
