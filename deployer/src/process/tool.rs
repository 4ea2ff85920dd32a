//! Locating external command-line tools

use std::path::{Path, PathBuf};

use crate::errors::DeployerError;

/// Resolve `name` to an executable path.
///
/// `preferred` locations are checked first, then every directory on `PATH`.
/// A `name` containing a path separator is checked as-is.
pub fn resolve_tool(name: &str, preferred: &[PathBuf]) -> Result<PathBuf, DeployerError> {
    resolve_tool_in(name, preferred, std::env::var_os("PATH"))
}

fn resolve_tool_in(
    name: &str,
    preferred: &[PathBuf],
    path_var: Option<std::ffi::OsString>,
) -> Result<PathBuf, DeployerError> {
    if let Some(found) = preferred.iter().find(|p| is_executable(p)) {
        return Ok(found.clone());
    }

    let direct = Path::new(name);
    if direct.components().count() > 1 {
        if is_executable(direct) {
            return Ok(direct.to_path_buf());
        }
        return Err(DeployerError::ToolMissing {
            tool: name.to_string(),
        });
    }

    if let Some(path_var) = path_var {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(name);
            if is_executable(&candidate) {
                return Ok(candidate);
            }
            #[cfg(windows)]
            {
                let exe = dir.join(format!("{name}.exe"));
                if is_executable(&exe) {
                    return Ok(exe);
                }
            }
        }
    }

    Err(DeployerError::ToolMissing {
        tool: name.to_string(),
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn make_tool(dir: &Path, name: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn test_preferred_path_wins() {
        let local = tempfile::tempdir().unwrap();
        let on_path = tempfile::tempdir().unwrap();
        let preferred = make_tool(local.path(), "lk", 0o755);
        make_tool(on_path.path(), "lk", 0o755);

        let found = resolve_tool_in(
            "lk",
            &[preferred.clone()],
            Some(on_path.path().as_os_str().to_owned()),
        )
        .unwrap();
        assert_eq!(found, preferred);
    }

    #[test]
    fn test_falls_back_to_path() {
        let on_path = tempfile::tempdir().unwrap();
        let expected = make_tool(on_path.path(), "lk", 0o755);

        let found = resolve_tool_in(
            "lk",
            &[PathBuf::from("/nonexistent/lk")],
            Some(on_path.path().as_os_str().to_owned()),
        )
        .unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_non_executable_is_missing() {
        let on_path = tempfile::tempdir().unwrap();
        make_tool(on_path.path(), "lk", 0o644);

        let err = resolve_tool_in("lk", &[], Some(on_path.path().as_os_str().to_owned()))
            .unwrap_err();
        assert!(matches!(err, DeployerError::ToolMissing { tool } if tool == "lk"));
    }
}
