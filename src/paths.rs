//! Filesystem locations for config, cache and library data.
//!
//! Resolution order follows the usual XDG conventions via `dirs`, with
//! `INLIMBO_CONFIG_HOME` taking precedence for the config directory so a
//! test or a second profile can be pointed somewhere else entirely.

use std::path::PathBuf;

/// Environment variable overriding the config directory.
pub const ENV_CONFIG_HOME: &str = "INLIMBO_CONFIG_HOME";

/// Get the config directory path.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_HOME) {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    dirs::config_dir().map(|d| d.join("inlimbo"))
}

/// Get the full path to the config file.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Cache directory (album art lives under `<cache>/art/`).
pub fn cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("inlimbo"))
}

/// Directory for the extracted album-art files.
pub fn art_cache_dir() -> Option<PathBuf> {
    cache_dir().map(|d| d.join("art"))
}

/// Data directory; the serialized library index (`lib.bin`) lives here.
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("inlimbo"))
}

/// Full path of the serialized library index.
pub fn library_index_path() -> Option<PathBuf> {
    data_dir().map(|d| d.join("lib.bin"))
}

/// Path of the single-instance lock file.
///
/// Prefers the per-user runtime directory, falls back to `/tmp`.
pub fn lock_file_path() -> PathBuf {
    let uid = unsafe { libc::getuid() };
    let run_dir = PathBuf::from(format!("/run/user/{uid}"));
    if run_dir.is_dir() {
        run_dir.join("inlimbo.lock")
    } else {
        PathBuf::from("/tmp/inlimbo.lock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_home_override() {
        // Env mutation is process-global, so keep this self-contained.
        unsafe { std::env::set_var(ENV_CONFIG_HOME, "/tmp/inlimbo-test-config") };
        let dir = config_dir().unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/inlimbo-test-config"));
        unsafe { std::env::remove_var(ENV_CONFIG_HOME) };
    }

    #[test]
    fn test_lock_path_is_absolute() {
        assert!(lock_file_path().is_absolute());
        assert!(lock_file_path().ends_with("inlimbo.lock"));
    }
}
