//! Telemetry socket location
//!
//! Sockets live in XDG_RUNTIME_DIR when available, otherwise in a
//! user-owned data directory created with mode 0700.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

pub const SOCKET_NAME: &str = "gazerelay.sock";

/// Directory for the default socket
///
/// 1. `$XDG_RUNTIME_DIR` if it exists
/// 2. `~/.local/share/gazerelay`
pub fn get_socket_dir() -> Result<PathBuf> {
    if let Some(runtime_dir) = std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from) {
        if runtime_dir.is_dir() {
            return Ok(runtime_dir);
        }
    }

    let data_dir = dirs::home_dir()
        .context("Unable to determine home directory")?
        .join(".local")
        .join("share")
        .join("gazerelay");
    ensure_private_dir(&data_dir)?;
    Ok(data_dir)
}

/// Socket path to bind: the configured one if set, else the default location
pub fn resolve_socket_path(configured: Option<&Path>) -> Result<PathBuf> {
    match configured {
        Some(path) if path.as_os_str().is_empty() => bail!("Socket path is empty"),
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                if !parent.is_dir() {
                    ensure_private_dir(parent)?;
                }
            }
            Ok(path.to_path_buf())
        }
        None => Ok(get_socket_dir()?.join(SOCKET_NAME)),
    }
}

fn ensure_private_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create socket directory {}", dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
            .context("Failed to set socket directory permissions")?;
    }

    Ok(())
}
