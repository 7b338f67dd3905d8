use std::path::Path;

/// Display a path relative to the project root, or just the file name if it
/// lies outside it.
pub fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| {
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "[path]".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_display_path_within_root() {
        let root = PathBuf::from("/data/wasp39b");
        let path = PathBuf::from("/data/wasp39b/Stage2/20261017-093015-123456-0000");
        assert_eq!(
            display_path(&path, &root),
            "Stage2/20261017-093015-123456-0000"
        );
    }

    #[test]
    fn test_display_path_outside_root() {
        let root = PathBuf::from("/data/wasp39b");
        let path = PathBuf::from("/scratch/Stage2");
        assert_eq!(display_path(&path, &root), "Stage2");
    }
}
