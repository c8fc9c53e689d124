//! Runtime driver contract.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use nut_common::{ContainerName, NutError, NutResult};

/// Config key holding a container's root filesystem.
pub const ROOTFS_CONFIG_KEY: &str = "lxc.rootfs.path";

/// Handle to a container created by a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    name: ContainerName,
}

impl ContainerHandle {
    /// Wrap a container name.
    #[must_use]
    pub fn new(name: ContainerName) -> Self {
        Self { name }
    }

    /// Name of the container.
    #[must_use]
    pub fn name(&self) -> &ContainerName {
        &self.name
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Runtime state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    /// The runtime does not know the container.
    Undefined,
    /// Stopped.
    Stopped,
    /// Starting.
    Starting,
    /// Running.
    Running,
    /// Stopping.
    Stopping,
    /// Aborting.
    Aborting,
    /// Freezing.
    Freezing,
    /// Frozen.
    Frozen,
    /// Thawed.
    Thawed,
}

impl ContainerStatus {
    /// Whether the runtime knows the container at all.
    #[must_use]
    pub fn is_defined(self) -> bool {
        self != Self::Undefined
    }
}

impl FromStr for ContainerStatus {
    type Err = NutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "STOPPED" => Ok(Self::Stopped),
            "STARTING" => Ok(Self::Starting),
            "RUNNING" => Ok(Self::Running),
            "STOPPING" => Ok(Self::Stopping),
            "ABORTING" => Ok(Self::Aborting),
            "FREEZING" => Ok(Self::Freezing),
            "FROZEN" => Ok(Self::Frozen),
            "THAWED" => Ok(Self::Thawed),
            other => Err(NutError::driver(
                "query status",
                format!("unknown container state '{other}'"),
            )),
        }
    }
}

/// A host directory bind-mounted into the build container.
///
/// Written as `HOST:CONTAINER` on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    /// Host path.
    pub host: PathBuf,
    /// Absolute path inside the container.
    pub container: String,
}

impl VolumeSpec {
    /// Render as an `lxc.mount.entry` value.
    ///
    /// LXC resolves mount targets relative to the rootfs, so the leading
    /// slash is dropped.
    #[must_use]
    pub fn mount_entry(&self) -> String {
        format!(
            "{} {} none bind,create=dir 0 0",
            self.host.display(),
            self.container.trim_start_matches('/')
        )
    }
}

impl FromStr for VolumeSpec {
    type Err = NutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NutError::Config {
            message: format!("invalid volume '{s}', expected HOST:CONTAINER"),
        };

        let (host, container) = s.split_once(':').ok_or_else(invalid)?;
        if host.is_empty() || !container.starts_with('/') {
            return Err(invalid());
        }

        Ok(Self {
            host: PathBuf::from(host),
            container: container.to_string(),
        })
    }
}

/// Options for running a command inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachOptions {
    /// Working directory for the command.
    pub cwd: Option<String>,
    /// `KEY=VALUE` environment entries.
    pub env: Vec<String>,
    /// Drop the attaching process's environment before applying `env`.
    pub clear_env: bool,
}

/// Container runtime driver.
///
/// Each call blocks the build until the runtime finishes; there are no
/// timeouts and nothing is retried.
#[async_trait]
pub trait ContainerDriver: Send + Sync {
    /// Clone `base` into a new, stopped container called `name`.
    async fn clone_container(
        &self,
        base: &ContainerName,
        name: &ContainerName,
    ) -> NutResult<ContainerHandle>;

    /// Start a container with `volumes` bind-mounted.
    async fn start(&self, handle: &ContainerHandle, volumes: &[VolumeSpec]) -> NutResult<()>;

    /// Clone `base` into a new container called `name`, attach `volumes`,
    /// and start it.
    ///
    /// A clone that fails to start is destroyed before the start error is
    /// returned.
    async fn clone_and_start(
        &self,
        base: &ContainerName,
        name: &ContainerName,
        volumes: &[VolumeSpec],
    ) -> NutResult<ContainerHandle> {
        let handle = self.clone_container(base, name).await?;

        if let Err(e) = self.start(&handle, volumes).await {
            tracing::error!(container = %handle, error = %e, "Failed to start cloned container");
            if let Err(destroy_err) = self.destroy(&handle).await {
                tracing::error!(
                    container = %handle,
                    error = %destroy_err,
                    "Failed to destroy container that did not start"
                );
            }
            return Err(e);
        }

        Ok(handle)
    }

    /// Query the container's state.
    async fn status(&self, handle: &ContainerHandle) -> NutResult<ContainerStatus>;

    /// Stop a running container.
    async fn stop(&self, handle: &ContainerHandle) -> NutResult<()>;

    /// Remove the container and its storage.
    async fn destroy(&self, handle: &ContainerHandle) -> NutResult<()>;

    /// Run `argv` inside the container and return its exit code.
    async fn run_command(
        &self,
        handle: &ContainerHandle,
        argv: &[String],
        options: &AttachOptions,
    ) -> NutResult<i32>;

    /// Read a configuration item of the container.
    async fn config_item(&self, handle: &ContainerHandle, key: &str) -> NutResult<Vec<String>>;

    /// Archive the named container's directory into `dest`.
    async fn export(&self, name: &str, dest: &Path, sudo: bool) -> NutResult<()>;

    /// Host path of the container's root filesystem.
    async fn rootfs(&self, handle: &ContainerHandle) -> NutResult<PathBuf> {
        let values = self.config_item(handle, ROOTFS_CONFIG_KEY).await?;
        let value = values.first().ok_or_else(|| {
            NutError::driver(
                "resolve rootfs",
                format!("{ROOTFS_CONFIG_KEY} is not set for {handle}"),
            )
        })?;
        Ok(rootfs_from_config_value(value))
    }
}

/// Strip a backing-store prefix such as `dir:` from a rootfs config value.
///
/// Overlay values list several paths; the last one is the writable layer.
#[must_use]
pub fn rootfs_from_config_value(value: &str) -> PathBuf {
    match value.rsplit_once(':') {
        Some((_, path)) => PathBuf::from(path),
        None => PathBuf::from(value),
    }
}
