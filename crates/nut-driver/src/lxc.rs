//! LXC driver backed by the `lxc-*` command-line tools.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use nut_common::{ContainerName, NutError, NutResult};
use tokio::process::Command;

use crate::config::DriverConfig;
use crate::driver::{AttachOptions, ContainerDriver, ContainerHandle, ContainerStatus, VolumeSpec};

/// Shell prologue that switches directory before exec'ing the real command.
const CHDIR_WRAPPER: &str = r#"cd "$1" && shift && exec "$@""#;

/// Driver for system containers managed by LXC.
#[derive(Debug, Clone, Default)]
pub struct LxcDriver {
    config: DriverConfig,
}

impl LxcDriver {
    /// Create a driver.
    #[must_use]
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }

    /// Driver configuration.
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    fn lxc_path(&self) -> OsString {
        self.config.paths.lxc_path.clone().into_os_string()
    }

    fn copy_args(&self, base: &ContainerName, name: &ContainerName) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-P".into(),
            self.lxc_path(),
            "-n".into(),
            base.as_str().into(),
            "-N".into(),
            name.as_str().into(),
        ];
        if self.config.snapshot {
            args.push("-s".into());
        }
        if let Some(store) = &self.config.backing_store {
            args.push("-B".into());
            args.push(store.into());
        }
        args
    }

    fn start_args(&self, name: &ContainerName, volumes: &[VolumeSpec]) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-P".into(),
            self.lxc_path(),
            "-n".into(),
            name.as_str().into(),
            "-d".into(),
        ];
        for volume in volumes {
            args.push("-s".into());
            args.push(format!("lxc.mount.entry={}", volume.mount_entry()).into());
        }
        args
    }

    fn attach_args(
        &self,
        handle: &ContainerHandle,
        argv: &[String],
        options: &AttachOptions,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-P".into(),
            self.lxc_path(),
            "-n".into(),
            handle.name().as_str().into(),
        ];
        if options.clear_env {
            args.push("--clear-env".into());
        }
        for var in &options.env {
            args.push("-v".into());
            args.push(var.into());
        }
        args.push("--".into());

        if let Some(cwd) = &options.cwd {
            args.extend(["/bin/sh", "-c", CHDIR_WRAPPER, "sh"].map(OsString::from));
            args.push(cwd.into());
        }
        args.extend(argv.iter().map(OsString::from));
        args
    }

    /// Run a tool to completion, returning stdout or the stderr of a failure.
    async fn lxc(&self, operation: &str, program: &str, args: &[OsString]) -> NutResult<String> {
        tracing::debug!(program, ?args, "Running LXC tool");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| NutError::driver(operation, format!("failed to spawn {program}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NutError::driver(
                operation,
                format!(
                    "{program} exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn name_args(&self, handle: &ContainerHandle) -> Vec<OsString> {
        vec![
            "-P".into(),
            self.lxc_path(),
            "-n".into(),
            handle.name().as_str().into(),
        ]
    }
}

/// Parse `lxc-info -c KEY` output (`key = value` lines) into values.
fn parse_config_output(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

#[async_trait]
impl ContainerDriver for LxcDriver {
    async fn clone_container(
        &self,
        base: &ContainerName,
        name: &ContainerName,
    ) -> NutResult<ContainerHandle> {
        tracing::info!(base = %base, container = %name, "Cloning container");
        self.lxc("clone", "lxc-copy", &self.copy_args(base, name))
            .await?;
        Ok(ContainerHandle::new(name.clone()))
    }

    async fn start(&self, handle: &ContainerHandle, volumes: &[VolumeSpec]) -> NutResult<()> {
        tracing::info!(container = %handle, volumes = volumes.len(), "Starting container");
        self.lxc("start", "lxc-start", &self.start_args(handle.name(), volumes))
            .await?;
        Ok(())
    }

    async fn status(&self, handle: &ContainerHandle) -> NutResult<ContainerStatus> {
        let mut args = self.name_args(handle);
        args.extend(["-s", "-H"].map(OsString::from));

        let output = Command::new("lxc-info")
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| NutError::driver("query status", e))?;

        // lxc-info exits non-zero for containers it does not know.
        if !output.status.success() {
            return Ok(ContainerStatus::Undefined);
        }

        String::from_utf8_lossy(&output.stdout).parse()
    }

    async fn stop(&self, handle: &ContainerHandle) -> NutResult<()> {
        tracing::info!(container = %handle, "Stopping container");
        self.lxc("stop", "lxc-stop", &self.name_args(handle)).await?;
        Ok(())
    }

    async fn destroy(&self, handle: &ContainerHandle) -> NutResult<()> {
        tracing::info!(container = %handle, "Destroying container");
        self.lxc("destroy", "lxc-destroy", &self.name_args(handle))
            .await?;
        Ok(())
    }

    async fn run_command(
        &self,
        handle: &ContainerHandle,
        argv: &[String],
        options: &AttachOptions,
    ) -> NutResult<i32> {
        let args = self.attach_args(handle, argv, options);
        tracing::debug!(container = %handle, ?argv, "Attaching to container");

        // Build output streams straight to the terminal.
        let status = Command::new("lxc-attach")
            .args(&args)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| NutError::driver("attach", format!("failed to spawn lxc-attach: {e}")))?;

        Ok(status.code().unwrap_or(-1))
    }

    async fn config_item(&self, handle: &ContainerHandle, key: &str) -> NutResult<Vec<String>> {
        let mut args = self.name_args(handle);
        args.push("-c".into());
        args.push(key.into());

        let output = self.lxc("read config", "lxc-info", &args).await?;
        Ok(parse_config_output(&output))
    }

    async fn export(&self, name: &str, dest: &Path, sudo: bool) -> NutResult<()> {
        let dir = self.config.paths.container(name);
        let mut args: Vec<OsString> = vec![
            "--numeric-owner".into(),
            "-czpf".into(),
            dest.as_os_str().to_owned(),
            "-C".into(),
            dir.into_os_string(),
            ".".into(),
        ];

        tracing::info!(container = name, dest = %dest.display(), sudo, "Exporting container");
        if sudo {
            args.insert(0, "tar".into());
            self.lxc("export", "sudo", &args).await?;
        } else {
            self.lxc("export", "tar", &args).await?;
        }
        Ok(())
    }
}
