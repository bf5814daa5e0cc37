use std::env;
use std::path::{Path, PathBuf};

/// Locate an executable the way `which` does: names containing a directory
/// component are checked as-is, bare names are searched for in `PATH`.
pub fn find_executable(name: impl AsRef<Path>) -> Option<PathBuf> {
    let name = name.as_ref();
    if name.as_os_str().is_empty() {
        return None;
    }

    if name.is_absolute() || name.components().count() > 1 {
        return is_executable(name).then(|| name.to_path_buf());
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Expand a leading `~` to the current user's home directory
pub fn expand_home(path: &str) -> PathBuf {
    let rest = if path == "~" {
        Some("")
    } else {
        path.strip_prefix("~/")
    };

    match (rest, dirs_next::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Returns a cwd-relative path string suitable for logging
pub fn display_path(path: &Path) -> String {
    if let Ok(cwd) = env::current_dir()
        && let Ok(relative) = path.strip_prefix(&cwd)
    {
        let s = relative.to_string_lossy().to_string();
        return if s.is_empty() { ".".to_string() } else { s };
    }
    path.to_string_lossy().to_string()
}
