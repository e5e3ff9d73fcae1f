//! Document loading
//!
//! Reads the direct children of a folder:
//! - PDFs (one document per page)
//! - Text and markdown files (one document per file)

mod pdf;

pub use pdf::{parse_pdf_pages, text_quality_score, PdfPageText, MIN_PDF_TEXT_QUALITY_SCORE};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::services::ai::{Document, DocumentMetadata};
use crate::utils::{compute_sha256, file_name_of, get_extension, is_hidden};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Text,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        match get_extension(path).as_deref() {
            Some("pdf") => Some(SourceKind::Pdf),
            Some("txt") | Some("md") | Some("markdown") => Some(SourceKind::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Only `*.pdf`, everything else is ignored
    pub pdf_only: bool,
}

/// Loadable files in `folder`, sorted by path
pub fn list_source_files(folder: &Path, options: &LoadOptions) -> AppResult<Vec<(PathBuf, SourceKind)>> {
    if !folder.is_dir() {
        return Err(AppError::NotFound {
            entity: "document folder",
            path: folder.display().to_string(),
        });
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        if is_hidden(&path) || !path.is_file() {
            continue;
        }
        match SourceKind::from_path(&path) {
            Some(SourceKind::Text) if options.pdf_only => continue,
            Some(kind) => files.push((path, kind)),
            None => {
                tracing::debug!(file = %path.display(), "Skipping unsupported file type");
            }
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Parse every loadable file; a file that fails is logged and skipped.
pub fn load_documents(folder: &Path, options: &LoadOptions) -> AppResult<Vec<Document>> {
    let files = list_source_files(folder, options)?;
    let mut documents = Vec::new();

    for (path, kind) in files {
        match load_file(&path, kind) {
            Ok(mut docs) => {
                tracing::info!(file = %path.display(), documents = docs.len(), "Loaded file");
                documents.append(&mut docs);
            }
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "Failed to load file");
            }
        }
    }

    if documents.is_empty() {
        return Err(AppError::Validation(format!(
            "No files found in {}",
            folder.display()
        )));
    }

    Ok(documents)
}

fn load_file(path: &Path, kind: SourceKind) -> Result<Vec<Document>, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    let file_hash = compute_sha256(&bytes);
    let file_name = file_name_of(path);
    let file_path = path.to_string_lossy().to_string();

    match kind {
        SourceKind::Pdf => {
            let pages = parse_pdf_pages(path)?;
            Ok(pages
                .into_iter()
                .map(|page| Document {
                    doc_id: format!("{}-{}", file_hash, page.page_number),
                    text: page.text,
                    metadata: DocumentMetadata {
                        file_name: file_name.clone(),
                        file_path: file_path.clone(),
                        page_label: Some(page.page_number.to_string()),
                    },
                })
                .collect())
        }
        SourceKind::Text => {
            let text = String::from_utf8_lossy(&bytes).to_string();
            if text.trim().is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![Document {
                doc_id: file_hash,
                text,
                metadata: DocumentMetadata {
                    file_name,
                    file_path,
                    page_label: None,
                },
            }])
        }
    }
}

/// `file_name -> sha256` of the files `load_documents` would read
pub fn fingerprint_folder(folder: &Path, options: &LoadOptions) -> AppResult<BTreeMap<String, String>> {
    let mut fingerprint = BTreeMap::new();
    for (path, _) in list_source_files(folder, options)? {
        let bytes = fs::read(&path)?;
        fingerprint.insert(file_name_of(&path), compute_sha256(&bytes));
    }
    Ok(fingerprint)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn loads_text_files_in_sorted_order() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.md"), "# Beta\nsecond").unwrap();
        fs::write(dir.path().join("a.txt"), "alpha first").unwrap();
        fs::write(dir.path().join(".hidden.txt"), "secret").unwrap();
        fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let docs = load_documents(dir.path(), &LoadOptions::default()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].metadata.file_name, "a.txt");
        assert_eq!(docs[1].metadata.file_name, "b.md");
        assert_eq!(docs[0].metadata.page_label, None);
        assert_eq!(docs[0].doc_id, compute_sha256(b"alpha first"));
    }

    #[test]
    fn pdf_only_ignores_text_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();

        let err = load_documents(dir.path(), &LoadOptions { pdf_only: true }).unwrap_err();
        assert!(err.to_string().contains("No files found"));
    }

    #[test]
    fn broken_pdf_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.pdf"), b"not a pdf").unwrap();
        fs::write(dir.path().join("notes.txt"), "still here").unwrap();

        let docs = load_documents(dir.path(), &LoadOptions::default()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata.file_name, "notes.txt");
    }

    #[test]
    fn missing_folder_is_not_found() {
        let dir = tempdir().unwrap();
        let err = load_documents(&dir.path().join("source"), &LoadOptions::default()).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn fingerprint_tracks_file_hashes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        let fingerprint = fingerprint_folder(dir.path(), &LoadOptions::default()).unwrap();
        assert_eq!(fingerprint.get("a.txt"), Some(&compute_sha256(b"alpha")));
    }
}
