//! Privilege handling for commands that need root.

use nix::unistd::geteuid;

/// Whether the current process runs with an effective uid of 0.
pub fn is_privileged() -> bool {
    geteuid().is_root()
}

/// Prefixes `argv` with `sudo` unless the current process is already root.
pub fn elevate(argv: Vec<String>) -> Vec<String> {
    elevate_for(argv, is_privileged())
}

fn elevate_for(mut argv: Vec<String>, already_root: bool) -> Vec<String> {
    if !already_root {
        argv.insert(0, "sudo".to_string());
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevate_prefixes_sudo_for_regular_user() {
        let argv = elevate_for(vec!["ptp4l".into(), "-m".into()], false);
        assert_eq!(argv, vec!["sudo", "ptp4l", "-m"]);
    }

    #[test]
    fn test_elevate_keeps_argv_for_root() {
        let argv = elevate_for(vec!["ptp4l".into()], true);
        assert_eq!(argv, vec!["ptp4l"]);
    }
}
