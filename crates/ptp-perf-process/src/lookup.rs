//! Executable lookup.

use std::env;
use std::ffi::OsString;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Resolves `name` against the current `PATH`.
///
/// Names containing a `/` are checked directly.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    find_executable_in(name, env::var_os("PATH"))
}

/// Resolves `name` against an explicit search path.
pub fn find_executable_in(name: &str, search_path: Option<OsString>) -> Option<PathBuf> {
    if name.contains('/') {
        let path = PathBuf::from(name);
        return is_executable(&path).then_some(path);
    }

    let search_path = search_path?;
    env::split_paths(&search_path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

/// Whether `name` resolves to an executable file.
pub fn executable_in_path(name: &str) -> bool {
    find_executable(name).is_some()
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_finds_shell() {
        assert!(executable_in_path("sh"));
        assert!(!executable_in_path("definitely-not-a-ptp-daemon"));
    }

    #[test]
    fn test_search_path_requires_execute_bit() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("ptp4l");
        fs::write(&script, "#!/bin/sh\n").unwrap();

        let search = Some(dir.path().as_os_str().to_os_string());
        assert!(find_executable_in("ptp4l", search.clone()).is_none());

        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(find_executable_in("ptp4l", search), Some(script));
    }
}
