use std::path::Path;

/// Strips trailing separators so a user-supplied directory matches the
/// `dir_path` column, which never carries one.
pub fn normalize_dir(path: &str) -> String {
    let mut normalized = path.to_string();
    while normalized.len() > 1 && normalized.ends_with(is_separator) {
        // Keep drive roots like `C:\` intact.
        if normalized[..normalized.len() - 1].ends_with(':') {
            break;
        }
        normalized.pop();
    }
    normalized
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

pub fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// File name and containing directory of `path`, as stored in the catalog.
pub fn split_path(path: &Path) -> Option<(String, String)> {
    let name = path.file_name()?.to_string_lossy().to_string();
    let dir = path.parent().map(path_string).unwrap_or_default();
    Some((name, dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_trailing_slashes() {
        assert_eq!(normalize_dir("/foo/bar/"), "/foo/bar");
        assert_eq!(normalize_dir("/foo/bar///"), "/foo/bar");
        assert_eq!(normalize_dir("/"), "/");
    }

    #[test]
    fn normalize_keeps_drive_root() {
        assert_eq!(normalize_dir("C:\\"), "C:\\");
    }

    #[test]
    fn normalize_keeps_backslashes_inside() {
        assert_eq!(normalize_dir("C:\\Users\\test\\"), "C:\\Users\\test");
    }

    #[test]
    fn split_path_returns_name_and_parent() {
        let (name, dir) = split_path(Path::new("/photos/2024/a.png")).unwrap();
        assert_eq!(name, "a.png");
        assert_eq!(dir, "/photos/2024");
    }

    #[test]
    fn split_path_rejects_bare_root() {
        assert!(split_path(Path::new("/")).is_none());
    }
}
