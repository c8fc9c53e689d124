//! Moving files between the host and the build container.
//!
//! Files travel through the container's `/tmp`: the host side copies into
//! `<rootfs>/tmp`, and a command inside the container moves them on. This
//! keeps ownership and final placement under the container's control.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use nut_common::{NutError, NutResult};
use nut_driver::ContainerDriver;
use walkdir::WalkDir;

use crate::exec;
use crate::state::BuildState;

/// Recursively copy `src` to `dest`, preserving permissions and symlinks.
///
/// # Errors
///
/// Returns [`NutError::Copy`] if any entry cannot be copied.
pub fn copy_tree(src: &Path, dest: &Path) -> NutResult<()> {
    copy_entries(src, dest).map_err(|e| NutError::Copy {
        from: src.display().to_string(),
        to: dest.display().to_string(),
        message: e.to_string(),
    })
}

fn copy_entries(src: &Path, dest: &Path) -> io::Result<()> {
    let mut dirs = Vec::new();

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = if relative.as_os_str().is_empty() {
            dest.to_path_buf()
        } else {
            dest.join(relative)
        };
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            dirs.push((target, entry.metadata()?.permissions()));
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            if target.symlink_metadata().is_ok() {
                fs::remove_file(&target)?;
            }
            std::os::unix::fs::symlink(link, &target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }

    // Directory modes go on last so read-only directories can be filled.
    for (dir, permissions) in dirs.into_iter().rev() {
        fs::set_permissions(dir, permissions)?;
    }

    Ok(())
}

/// Remove a file or directory tree; a missing path is not an error.
///
/// # Errors
///
/// Returns an error if the path exists but cannot be removed.
pub fn remove_tree(path: &Path) -> NutResult<()> {
    let result = match path.symlink_metadata() {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    result.map_err(Into::into)
}

/// Copy a host path into the container at `dest`.
///
/// # Errors
///
/// Fails if there is no container, the source cannot be resolved or
/// copied, the in-container move fails, or cleanup fails.
pub async fn add_files<D>(driver: &D, state: &BuildState, src: &str, dest: &str) -> NutResult<()>
where
    D: ContainerDriver + ?Sized,
{
    let container = state.container.as_ref().ok_or_else(|| NutError::NoContainer {
        directive: "ADD".to_string(),
    })?;
    let rootfs = driver.rootfs(container).await?;

    let source = std::path::absolute(src)?;
    let base = file_name(&source)?;
    let staged = staged_path(&rootfs, &base);

    tracing::debug!(src = %source.display(), staged = %staged.display(), "Staging files");
    if let Err(e) = copy_tree(&source, &staged) {
        tracing::error!(error = %e, "Failed to copy files from host to container tmp directory");
        return Err(e);
    }

    let command = [
        "cp".to_string(),
        "-r".to_string(),
        format!("/tmp/{base}"),
        dest.to_string(),
    ];
    if let Err(e) = exec::run_command(driver, state, &command).await {
        tracing::error!(error = %e, dest, "Failed to move staged files to their destination");
        return Err(e);
    }

    if let Err(e) = remove_tree(&staged) {
        tracing::error!(error = %e, path = %staged.display(), "Failed to delete staged files");
        return Err(e);
    }

    Ok(())
}

/// Final component of `path`, which must have one.
pub(crate) fn file_name(path: &Path) -> NutResult<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| NutError::Copy {
            from: path.display().to_string(),
            to: "/tmp".to_string(),
            message: "path has no file name".to_string(),
        })
}

/// Host path of `name` inside the container's `/tmp`.
pub(crate) fn staged_path(rootfs: &Path, name: &str) -> PathBuf {
    rootfs.join("tmp").join(name)
}
