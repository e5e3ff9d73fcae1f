use std::path::Path;

pub fn get_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
}

/// Dot-files and dot-directories are never loaded
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(get_extension(Path::new("a/Report.PDF")).as_deref(), Some("pdf"));
        assert_eq!(get_extension(Path::new("README")), None);
    }

    #[test]
    fn hidden_files_are_detected() {
        assert!(is_hidden(Path::new("source/.DS_Store")));
        assert!(!is_hidden(Path::new("source/paper.pdf")));
        assert_eq!(file_name_of(&PathBuf::from("source/paper.pdf")), "paper.pdf");
    }
}
