//! Maps file names reported by gdb onto paths the host can open.

use std::path::{Component, Path, PathBuf};

use crate::config::TargetConfig;

/// Lexically normalize a path: drop `.` and fold `..` into its parent.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Resolve a debugger-reported source name.
///
/// Relative names are tried against the working directory first, then against
/// the executable's directory. The second candidate is returned even if it
/// does not exist either.
pub fn resolve_file_name(config: &TargetConfig, file_name: &str) -> PathBuf {
    let name = Path::new(file_name);
    if name.is_absolute() {
        return clean_path(name);
    }

    let in_work_dir = clean_path(&config.work_dir.join(name));
    if in_work_dir.exists() {
        return in_work_dir;
    }

    let exe_dir = config.executable.parent().unwrap_or_else(|| Path::new(""));
    clean_path(&exe_dir.join(name))
}
