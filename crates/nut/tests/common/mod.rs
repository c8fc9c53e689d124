//! In-memory LXC stand-in for builder integration tests.
//!
//! Containers are plain directories under a temporary LXC root. Cloning
//! copies the base's rootfs, and the only command the mock understands
//! is `cp -r SRC DEST`, which it replays inside the rootfs. Everything
//! else succeeds unless it matches the failure marker.
//!
//! Clones of a mock share its root and log, so several builders can run
//! against the same containers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use nut::BuildOptions;
use nut::exec::SCRIPT_PATH;
use nut::staging::copy_tree;
use nut_common::{ContainerName, NutError, NutPaths, NutResult};
use nut_driver::driver::ROOTFS_CONFIG_KEY;
use nut_driver::{AttachOptions, ContainerDriver, ContainerHandle, ContainerStatus, VolumeSpec};
use tempfile::TempDir;

/// A recorded `clone_container` call.
#[derive(Debug, Clone)]
pub struct Cloned {
    pub base: String,
    pub name: String,
}

/// Everything the builder asked of the driver.
#[derive(Debug, Default)]
pub struct Log {
    pub clones: Vec<Cloned>,
    pub starts: Vec<(String, Vec<VolumeSpec>)>,
    pub scripts: Vec<String>,
    pub argv: Vec<Vec<String>>,
    pub attach: Vec<AttachOptions>,
    pub exports: Vec<(String, PathBuf, bool)>,
    pub status: HashMap<String, ContainerStatus>,
}

#[derive(Clone)]
pub struct MockDriver {
    root: Arc<TempDir>,
    failing: Option<String>,
    fail_start: bool,
    overlay: bool,
    log: Arc<Mutex<Log>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            root: Arc::new(TempDir::new().unwrap()),
            failing: None,
            fail_start: false,
            overlay: false,
            log: Arc::new(Mutex::new(Log::default())),
        }
    }

    /// Commands containing `marker` exit with status 1.
    pub fn failing_on(marker: &str) -> Self {
        Self {
            failing: Some(marker.to_string()),
            ..Self::new()
        }
    }

    /// Clones succeed but never start.
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::new()
        }
    }

    /// Root filesystems live at `<name>/overlay/delta0`, the way
    /// `lxc-copy -s` lays out snapshots of directory-backed containers.
    pub fn overlay() -> Self {
        Self {
            overlay: true,
            ..Self::new()
        }
    }

    pub fn lxc_path(&self) -> &Path {
        self.root.path()
    }

    pub fn paths(&self) -> NutPaths {
        NutPaths::with_lxc_path(self.root.path())
    }

    pub fn rootfs_of(&self, name: &str) -> PathBuf {
        if self.overlay {
            self.paths().container(name).join("overlay").join("delta0")
        } else {
            self.paths().container_rootfs(name)
        }
    }

    /// Create a base container with an empty rootfs.
    pub fn base(&self, name: &str) -> PathBuf {
        let rootfs = self.rootfs_of(name);
        std::fs::create_dir_all(rootfs.join("tmp")).unwrap();
        rootfs
    }

    /// Options pointing at this driver's LXC root, extracting artifacts
    /// into `<root>/artifacts`.
    pub fn options(&self) -> BuildOptions {
        BuildOptions::default()
            .with_paths(self.paths())
            .with_artifact_dir(self.root.path().join("artifacts"))
    }

    pub fn log(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap()
    }

    fn replay(&self, rootfs: &Path, command: &str) -> i32 {
        if self.failing.as_deref().is_some_and(|m| command.contains(m)) {
            return 1;
        }

        let tokens: Vec<&str> = command.split_whitespace().collect();
        let ["cp", "-r", src, dest] = tokens.as_slice() else {
            return 0;
        };

        let from = rootfs.join(src.trim_start_matches('/'));
        let mut to = rootfs.join(dest.trim_start_matches('/'));
        if !from.exists() {
            return 1;
        }
        if to.is_dir() {
            to = to.join(from.file_name().unwrap());
        }
        i32::from(copy_tree(&from, &to).is_err())
    }
}

#[async_trait]
impl ContainerDriver for MockDriver {
    async fn clone_container(
        &self,
        base: &ContainerName,
        name: &ContainerName,
    ) -> NutResult<ContainerHandle> {
        let source = self.rootfs_of(base.as_str());
        if !source.exists() {
            return Err(NutError::driver(
                "clone container",
                format!("{base} does not exist"),
            ));
        }
        copy_tree(&source, &self.rootfs_of(name.as_str()))?;

        let mut log = self.log();
        log.clones.push(Cloned {
            base: base.to_string(),
            name: name.to_string(),
        });
        log.status
            .insert(name.to_string(), ContainerStatus::Stopped);
        Ok(ContainerHandle::new(name.clone()))
    }

    async fn start(&self, handle: &ContainerHandle, volumes: &[VolumeSpec]) -> NutResult<()> {
        if self.fail_start {
            return Err(NutError::driver("start", "lxc-start exited with 1"));
        }

        let mut log = self.log();
        log.starts
            .push((handle.name().to_string(), volumes.to_vec()));
        log.status
            .insert(handle.name().to_string(), ContainerStatus::Running);
        Ok(())
    }

    async fn status(&self, handle: &ContainerHandle) -> NutResult<ContainerStatus> {
        Ok(self
            .log()
            .status
            .get(handle.name().as_str())
            .copied()
            .unwrap_or(ContainerStatus::Undefined))
    }

    async fn stop(&self, handle: &ContainerHandle) -> NutResult<()> {
        self.log()
            .status
            .insert(handle.name().to_string(), ContainerStatus::Stopped);
        Ok(())
    }

    async fn destroy(&self, handle: &ContainerHandle) -> NutResult<()> {
        std::fs::remove_dir_all(self.paths().container(handle.name().as_str()))?;
        self.log().status.remove(handle.name().as_str());
        Ok(())
    }

    async fn run_command(
        &self,
        handle: &ContainerHandle,
        argv: &[String],
        options: &AttachOptions,
    ) -> NutResult<i32> {
        let rootfs = self.rootfs_of(handle.name().as_str());
        let script = std::fs::read_to_string(rootfs.join(SCRIPT_PATH.trim_start_matches('/')))?;
        let command = script.lines().last().unwrap_or_default().to_string();

        {
            let mut log = self.log();
            log.scripts.push(script);
            log.argv.push(argv.to_vec());
            log.attach.push(options.clone());
        }

        Ok(self.replay(&rootfs, &command))
    }

    async fn config_item(&self, handle: &ContainerHandle, key: &str) -> NutResult<Vec<String>> {
        if key != ROOTFS_CONFIG_KEY {
            return Ok(Vec::new());
        }
        let name = handle.name().as_str();
        let rootfs = self.rootfs_of(name);
        if self.overlay {
            let lower = self.paths().container_rootfs(name);
            return Ok(vec![format!(
                "overlay:{}:{}",
                lower.display(),
                rootfs.display()
            )]);
        }
        Ok(vec![format!("dir:{}", rootfs.display())])
    }

    async fn export(&self, name: &str, dest: &Path, sudo: bool) -> NutResult<()> {
        std::fs::write(dest, format!("archive of {name}"))?;
        self.log()
            .exports
            .push((name.to_string(), dest.to_path_buf(), sudo));
        Ok(())
    }
}
