//! Running shell commands inside the build container.

use std::os::unix::fs::PermissionsExt;

use nut_common::{NutError, NutResult};
use nut_driver::{AttachOptions, ContainerDriver};

use crate::state::BuildState;

/// Location of the generated script inside the container.
pub const SCRIPT_PATH: &str = "/tmp/nut-build.sh";

/// Directory the script interpreter is started in.
pub const EXEC_CWD: &str = "/root";

/// Environment given to the script interpreter; the build's own variables
/// are exported by the script itself.
pub const MINIMAL_ENV: &[&str] = &[
    "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin",
    "HOME=/root",
    "TERM=xterm",
];

/// Render the script that runs `command` under the build's env, working
/// directory and user.
#[must_use]
pub fn render_script(state: &BuildState, command: &[String]) -> String {
    let mut lines = vec!["#!/bin/bash".to_string()];
    lines.extend(state.env.iter().map(|var| format!("export {var}")));
    if let Some(cwd) = &state.cwd {
        lines.push(format!("cd {cwd}"));
    }
    if let Some(user) = &state.manifest.user {
        lines.push(format!("su - {user}"));
    }
    lines.push(command.join(" "));
    lines.join("\n")
}

/// Run `command` in the build container.
///
/// # Errors
///
/// Fails if there is no container, the script cannot be written, the
/// driver fails, or the command exits non-zero.
pub async fn run_command<D>(driver: &D, state: &BuildState, command: &[String]) -> NutResult<()>
where
    D: ContainerDriver + ?Sized,
{
    let container = state.container.as_ref().ok_or_else(|| NutError::NoContainer {
        directive: "RUN".to_string(),
    })?;
    let text = command.join(" ");

    let rootfs = driver.rootfs(container).await?;
    let script_path = rootfs.join(SCRIPT_PATH.trim_start_matches('/'));
    if let Some(parent) = script_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let script = render_script(state, command);
    if let Err(e) = std::fs::write(&script_path, &script) {
        tracing::error!(path = %script_path.display(), error = %e, "Failed to write build script");
        return Err(e.into());
    }
    std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755))?;
    tracing::debug!(script = %script, "Executing");

    let options = AttachOptions {
        cwd: Some(EXEC_CWD.to_string()),
        env: MINIMAL_ENV.iter().map(ToString::to_string).collect(),
        clear_env: true,
    };
    let argv = vec!["/bin/bash".to_string(), SCRIPT_PATH.to_string()];

    let exit_code = match driver.run_command(container, &argv, &options).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(command = %text, error = %e, "Failed to execute command");
            return Err(e);
        }
    };

    if exit_code != 0 {
        tracing::warn!(command = %text, exit_code, "Command failed");
        return Err(NutError::CommandFailed {
            command: text,
            exit_code,
        });
    }

    Ok(())
}
