//! C1 — Text Extractor. Parses PDF/DOCX/TXT files into plain UTF-8 text.
//!
//! Dispatch is a plain match over [`FileKind`] rather than a trait-object
//! hierarchy — there are exactly four known formats and no plugin surface,
//! so an enum keeps the dispatch exhaustive and the compiler checks every
//! arm was handled when a new format is added.

use crate::error::ExtractError;
use crate::models::FileKind;
use std::path::Path;

/// Extracts plain text from `path`, dispatching on `kind`.
///
/// `doc` (legacy binary Word) is accepted as an input but always fails with
/// [`ExtractError::UnsupportedFormat`] steering the caller to DOCX.
pub fn extract(path: &Path, kind: FileKind) -> Result<String, ExtractError> {
    let raw = match kind {
        FileKind::Pdf => extract_pdf(path)?,
        FileKind::Docx => extract_docx(path)?,
        FileKind::Txt => extract_txt(path)?,
        FileKind::Doc => {
            return Err(ExtractError::UnsupportedFormat(
                "legacy .doc files are not supported; please convert to .docx".to_string(),
            ))
        }
    };

    let text = raw.trim().to_string();
    if text.is_empty() {
        return Err(ExtractError::CorruptFile(
            "extracted text is empty or whitespace-only".to_string(),
        ));
    }
    Ok(text)
}

fn io_err(path: &Path, source: std::io::Error) -> ExtractError {
    ExtractError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// PDF: concatenate page text with a single `\n` between pages.
fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    pdf_extract::extract_text(path)
        .map_err(|e| ExtractError::CorruptFile(format!("failed to parse PDF: {e}")))
}

/// DOCX: concatenate paragraph text with `\n`; headers/footers and images
/// are not visited since we only walk `document.xml`'s body paragraphs.
fn extract_docx(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    let docx = docx_rs::read_docx(&bytes)
        .map_err(|e| ExtractError::CorruptFile(format!("failed to parse DOCX: {e}")))?;

    let mut paragraphs = Vec::new();
    for child in docx.document.children {
        if let docx_rs::DocumentChild::Paragraph(p) = child {
            let mut text = String::new();
            for pc in p.children {
                if let docx_rs::ParagraphChild::Run(run) = pc {
                    for rc in run.children {
                        if let docx_rs::RunChild::Text(t) = rc {
                            text.push_str(&t.text);
                        }
                    }
                }
            }
            if !text.trim().is_empty() {
                paragraphs.push(text);
            }
        }
    }
    Ok(paragraphs.join("\n"))
}

/// TXT: try UTF-8, then CP1251, then Latin-1; first successful decode wins.
/// Latin-1 (mapped onto `windows-1252`, its WHATWG-standard superset) never
/// reports a decode error — every byte maps to some code point — so it is
/// the always-succeeding final fallback; `CorruptFile` is unreachable here
/// but kept as the documented contract for an encoding table that rejects.
fn extract_txt(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;

    if let Ok(text) = String::from_utf8(bytes.clone()) {
        return Ok(text);
    }

    let (text, _, had_errors) = encoding_rs::WINDOWS_1251.decode(&bytes);
    if !had_errors {
        return Ok(text.into_owned());
    }

    let (text, _, had_errors) = encoding_rs::WINDOWS_1252.decode(&bytes);
    if !had_errors {
        return Ok(text.into_owned());
    }
    Err(ExtractError::CorruptFile(
        "could not decode as UTF-8, CP1251, or Latin-1".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extracts_plain_utf8_txt() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "  Hello world.  \n").unwrap();
        let text = extract(f.path(), FileKind::Txt).unwrap();
        assert_eq!(text, "Hello world.");
    }

    #[test]
    fn empty_txt_is_corrupt() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let err = extract(f.path(), FileKind::Txt).unwrap_err();
        assert!(matches!(err, ExtractError::CorruptFile(_)));
    }

    #[test]
    fn doc_extension_is_unsupported() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let err = extract(f.path(), FileKind::Doc).unwrap_err();
        match err {
            ExtractError::UnsupportedFormat(msg) => assert!(msg.contains("docx")),
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn cp1251_txt_decodes() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let (bytes, _, _) = encoding_rs::WINDOWS_1251.encode("Привет");
        f.write_all(&bytes).unwrap();
        let text = extract(f.path(), FileKind::Txt).unwrap();
        assert_eq!(text, "Привет");
    }
}
