//! Text extraction for uploaded documents (PDF, DOCX, plain text).
//!
//! The intake accepts exactly these three MIME types; anything else is rejected
//! before a blob is stored, but extraction still guards against it so a row
//! written by an older build fails cleanly instead of panicking.

use std::io::Read;

use quick_xml::events::Event;
use thiserror::Error;

use docqa_core::upload::{MIME_DOCX, MIME_PDF, MIME_TEXT};

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
    #[error("text is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

impl From<ExtractError> for docqa_core::Error {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::UnsupportedContentType(ct) => docqa_core::Error::UnsupportedFormat(ct),
            other => docqa_core::Error::Parsing(other.to_string()),
        }
    }
}

/// Extract normalized plain text from a document's bytes.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    let raw = match content_type {
        MIME_PDF => extract_pdf(bytes)?,
        MIME_DOCX => extract_docx(bytes)?,
        MIME_TEXT => String::from_utf8(bytes.to_vec())?,
        _ => {
            return Err(ExtractError::UnsupportedContentType(
                content_type.to_string(),
            ))
        }
    };
    Ok(clean_text(&raw))
}

/// Normalize line endings and whitespace: CRLF and lone CR become LF, three or
/// more newlines collapse to a blank line, runs of spaces and tabs collapse to
/// one space, and the result is trimmed.
pub fn clean_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;
    let mut in_blank_run = false;
    for c in text.chars() {
        match c {
            '\n' => {
                in_blank_run = false;
                newlines += 1;
                if newlines <= 2 {
                    out.push('\n');
                }
            }
            ' ' | '\t' => {
                newlines = 0;
                if !in_blank_run {
                    out.push(' ');
                    in_blank_run = true;
                }
            }
            _ => {
                newlines = 0;
                in_blank_run = false;
                out.push(c);
            }
        }
    }
    out.trim().to_string()
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
    docx_paragraphs(&doc_xml)
}

/// Collect `w:t` runs, one line per `w:p` paragraph.
fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => current.push('\t'),
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}
