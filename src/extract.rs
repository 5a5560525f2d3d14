//! Plain-text extraction for uploaded and linked documents.
//!
//! Callers supply raw bytes plus a MIME type; this module returns UTF-8 text
//! ready for chunking. Plain text and Markdown pass through (lossily decoded),
//! PDFs go through `pdf-extract`, and DOCX files are unzipped and their
//! `<w:t>` runs collected paragraph by paragraph.

use std::io::Read;
use std::path::Path;

use thiserror::Error;

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_OCTET: &str = "application/octet-stream";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Extracts plain text from document bytes.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match normalize_content_type(content_type).as_str() {
        MIME_TEXT | MIME_MARKDOWN | "text/csv" | "text/html" => {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        other => Err(ExtractError::UnsupportedContentType(other.to_string())),
    }
}

/// Whether [`extract_text`] can handle this MIME type.
pub fn is_supported(content_type: &str) -> bool {
    matches!(
        normalize_content_type(content_type).as_str(),
        MIME_TEXT | MIME_MARKDOWN | "text/csv" | "text/html" | MIME_PDF | MIME_DOCX
    )
}

/// Guess a MIME type from a file name or URL path.
pub fn content_type_for_path(path: &str) -> &'static str {
    // Drop any query string or fragment from URLs.
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("txt") => MIME_TEXT,
        Some("md") | Some("markdown") => MIME_MARKDOWN,
        Some("csv") => "text/csv",
        Some("html") | Some("htm") => "text/html",
        Some("pdf") => MIME_PDF,
        Some("docx") => MIME_DOCX,
        _ => MIME_OCTET,
    }
}

/// Strip parameters (`; charset=utf-8`) and lowercase.
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    extract_paragraph_text(&doc_xml)
}

/// Collect `<w:t>` text, one line per `<w:p>` paragraph.
fn extract_paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let line = current.trim();
                    if !line.is_empty() {
                        paragraphs.push(line.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => current.push('\t'),
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let tail = current.trim();
    if !tail.is_empty() {
        paragraphs.push(tail.to_string());
    }

    Ok(paragraphs.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn plain_text_passes_through() {
        let text = extract_text("hello æøå".as_bytes(), "text/plain; charset=utf-8").unwrap();
        assert_eq!(text, "hello æøå");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let text = extract_text(&[b'a', 0xff, b'b'], MIME_TEXT).unwrap();
        assert!(text.starts_with('a'));
        assert!(text.ends_with('b'));
    }

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_text(b"foo", "image/png").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", MIME_DOCX).unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let bytes = docx_with_paragraphs(&["House rules", "Quiet after 22:00 &amp; no grills"]);
        let text = extract_text(&bytes, MIME_DOCX).unwrap();
        assert_eq!(text, "House rules\nQuiet after 22:00 & no grills");
    }

    #[test]
    fn content_type_guessing() {
        assert_eq!(content_type_for_path("a/b/Report.PDF"), MIME_PDF);
        assert_eq!(content_type_for_path("notes.md"), MIME_MARKDOWN);
        assert_eq!(
            content_type_for_path("https://example.com/files/rules.docx?dl=1"),
            MIME_DOCX
        );
        assert_eq!(content_type_for_path("archive.tar.gz"), MIME_OCTET);
        assert!(is_supported("Application/PDF"));
        assert!(!is_supported(MIME_OCTET));
    }
}
