use std::path::{Component, Path};
use walkdir::WalkDir;

/// Reduce an arbitrary name to a single filesystem-safe path component.
///
/// Alphanumerics, `-`, `_` and `.` are kept; runs of anything else collapse to
/// one `_`. Names that would be empty or special (`.`, `..`) become `unnamed`.
pub fn sanitize_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
            out.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// True when `path` is relative and never steps outside its parent.
pub fn is_contained(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Recursive byte size of regular files under `root`, skipping any file whose
/// name is in `exclude`.
pub fn dir_size(root: &Path, exclude: &[&str]) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map_or(true, |name| !exclude.contains(&name))
        })
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}
