//! PDF parsing utilities

use std::path::Path;

use pdf_oxide::converters::ConversionOptions;

pub const MIN_PDF_TEXT_QUALITY_SCORE: f64 = 0.6;

#[derive(Debug, Clone)]
pub struct PdfPageText {
    pub page_number: usize,
    pub text: String,
}

fn markdown_options() -> ConversionOptions {
    ConversionOptions {
        include_images: false,
        ..ConversionOptions::default()
    }
}

/// 0.0..=1.0, how much of the text looks like real characters
pub fn text_quality_score(text: &str) -> f64 {
    let mut total = 0usize;
    let mut printable = 0usize;
    let mut alnum = 0usize;
    let mut control = 0usize;
    let mut replacement = 0usize;

    for ch in text.chars() {
        if ch.is_whitespace() {
            continue;
        }
        total += 1;

        if ch == '\u{FFFD}' {
            replacement += 1;
            continue;
        }
        if ch.is_control() {
            control += 1;
            continue;
        }

        printable += 1;
        if ch.is_alphanumeric() {
            alnum += 1;
        }
    }

    if total == 0 {
        return 0.0;
    }

    let printable_ratio = printable as f64 / total as f64;
    let alnum_ratio = alnum as f64 / total as f64;
    let replacement_ratio = replacement as f64 / total as f64;
    let control_ratio = control as f64 / total as f64;

    let mut score = 0.6 * printable_ratio + 0.4 * alnum_ratio;
    score -= 0.7 * replacement_ratio;
    score -= 0.5 * control_ratio;
    score.clamp(0.0, 1.0)
}

/// Extract every non-empty page as markdown, numbered from 1
pub fn parse_pdf_pages(path: &Path) -> Result<Vec<PdfPageText>, String> {
    let path_str = path.to_string_lossy();
    let mut doc = pdf_oxide::PdfDocument::open(path_str.as_ref()).map_err(|e| e.to_string())?;
    let page_count = doc.page_count().map_err(|e| e.to_string())?;
    let options = markdown_options();
    let mut pages = Vec::new();

    for page_index in 0..page_count {
        let text = doc
            .to_markdown(page_index, &options)
            .map_err(|e| e.to_string())?;
        if text.trim().is_empty() {
            continue;
        }

        let score = text_quality_score(&text);
        if score < MIN_PDF_TEXT_QUALITY_SCORE {
            tracing::warn!(
                file = %path.display(),
                page = page_index + 1,
                score,
                "PDF page text quality is low, it may be a scanned image"
            );
        }

        pages.push(PdfPageText {
            page_number: page_index + 1,
            text,
        });
    }

    if pages.is_empty() {
        return Err("PDF has no extractable text".to_string());
    }

    Ok(pages)
}
