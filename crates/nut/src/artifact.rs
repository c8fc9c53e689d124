//! Extraction of build artifacts named by labels.

use std::path::{Path, PathBuf};

use nut_common::{NutError, NutResult};
use nut_driver::ContainerDriver;

use crate::exec;
use crate::staging::{copy_tree, file_name, staged_path};
use crate::state::BuildState;

/// Label key prefix marking an in-container path to extract after the build.
pub const ARTIFACT_LABEL_PREFIX: &str = "nut_artifact_";

/// Copy every labelled artifact out of the container into `out_dir`.
///
/// Returns the host paths that were written. Failing to stage an artifact
/// inside the container aborts; failing to copy it to the host is logged
/// and skipped.
///
/// # Errors
///
/// Fails if there is no container or an artifact cannot be staged.
pub async fn fetch_artifacts<D>(
    driver: &D,
    state: &BuildState,
    out_dir: &Path,
) -> NutResult<Vec<PathBuf>>
where
    D: ContainerDriver + ?Sized,
{
    let mut artifacts = state
        .manifest
        .labels
        .iter()
        .filter(|(key, _)| key.starts_with(ARTIFACT_LABEL_PREFIX))
        .peekable();
    if artifacts.peek().is_none() {
        return Ok(Vec::new());
    }

    let container = state.container.as_ref().ok_or_else(|| NutError::NoContainer {
        directive: "artifact extraction".to_string(),
    })?;
    let rootfs = driver.rootfs(container).await?;
    let mut extracted = Vec::new();

    for (label, path) in artifacts {
        let name = file_name(Path::new(path))?;
        tracing::info!(label = %label, path = %path, "Fetching artifact");

        let command = [
            "cp".to_string(),
            "-r".to_string(),
            path.clone(),
            format!("/tmp/{name}"),
        ];
        if let Err(e) = exec::run_command(driver, state, &command).await {
            tracing::error!(error = %e, path = %path, "Failed to copy artifact to /tmp");
            return Err(e);
        }

        let host = out_dir.join(&name);
        match copy_tree(&staged_path(&rootfs, &name), &host) {
            Ok(()) => extracted.push(host),
            Err(e) => {
                tracing::error!(error = %e, "Failed to copy artifact from container to host");
            }
        }
    }

    Ok(extracted)
}
