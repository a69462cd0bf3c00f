//! Turning uploaded files into [`Document`]s.
//!
//! Plain text is decoded as UTF-8, Word documents are read straight from the
//! `word/document.xml` part of the zip container, and PDFs go through
//! `pdf-extract`, which wants a file on disk. Each blob is handled on its own
//! so that one broken file never aborts the rest of a batch.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::document::{Document, DocumentFormat};
use crate::error::{RagError, Result};

/// A named file upload with an optional declared format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlob {
    pub name: String,
    pub bytes: Vec<u8>,
    /// When `None`, the format is inferred from the name's extension.
    pub format: Option<DocumentFormat>,
}

impl FileBlob {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), bytes: bytes.into(), format: None }
    }

    pub fn with_format(mut self, format: DocumentFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Read a file from disk, keeping only its file name.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = std::fs::read(path)
            .map_err(|e| RagError::LoadError { name: name.clone(), message: e.to_string() })?;
        Ok(Self::new(name, bytes))
    }

    fn resolve_format(&self) -> Result<DocumentFormat> {
        match self.format.or_else(|| DocumentFormat::from_name(&self.name)) {
            Some(format) => Ok(format),
            None => {
                let extension = Path::new(&self.name)
                    .extension()
                    .map(|e| format!("'.{}'", e.to_string_lossy()))
                    .unwrap_or_else(|| "no extension".to_string());
                Err(RagError::UnsupportedFormatError {
                    name: self.name.clone(),
                    reason: format!("{extension} is not one of .txt, .docx, .pdf"),
                })
            }
        }
    }
}

/// Why one file of a batch was skipped.
#[derive(Debug)]
pub struct LoadFailure {
    pub name: String,
    pub error: RagError,
}

/// Outcome of loading a batch: every input ends up in exactly one list.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub failures: Vec<LoadFailure>,
}

/// Extracts text from text, Word and PDF files.
#[derive(Debug, Clone, Default)]
pub struct DocumentLoader {
    temp_dir: Option<PathBuf>,
}

impl DocumentLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize PDF uploads under `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Load a single blob.
    ///
    /// # Errors
    ///
    /// [`RagError::UnsupportedFormatError`] for unknown extensions and
    /// [`RagError::LoadError`] when the contents cannot be parsed.
    pub fn load(&self, blob: &FileBlob) -> Result<Document> {
        let format = blob.resolve_format()?;
        let text = match format {
            DocumentFormat::PlainText => decode_text(blob)?,
            DocumentFormat::WordDocument => extract_docx(blob)?,
            DocumentFormat::Pdf => extract_pdf(blob, self.temp_dir.as_deref())?,
        };

        debug!(name = %blob.name, %format, chars = text.chars().count(), "loaded document");

        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), blob.name.clone());
        metadata.insert("format".to_string(), format.to_string());

        Ok(Document {
            id: document_id(&blob.name, &blob.bytes),
            origin: blob.name.clone(),
            format,
            text,
            metadata,
        })
    }

    /// Load every blob, collecting failures instead of stopping at the first.
    ///
    /// A blob with the same name and contents as an earlier one in the batch
    /// is reported as a failure so that chunk ids stay unique.
    pub fn load_batch(&self, blobs: &[FileBlob]) -> LoadReport {
        let mut report = LoadReport::default();
        let mut seen = HashSet::new();
        for blob in blobs {
            let loaded = self.load(blob).and_then(|document| {
                if seen.insert(document.id.clone()) {
                    Ok(document)
                } else {
                    Err(RagError::LoadError {
                        name: blob.name.clone(),
                        message: "duplicate of an earlier file in this batch".to_string(),
                    })
                }
            });
            match loaded {
                Ok(document) => report.documents.push(document),
                Err(error) => {
                    warn!(name = %blob.name, error = %error, "skipping file");
                    report.failures.push(LoadFailure { name: blob.name.clone(), error });
                }
            }
        }
        info!(
            loaded = report.documents.len(),
            skipped = report.failures.len(),
            "document batch loaded"
        );
        report
    }

    /// Read every regular file in `dir` (not recursive) and load the batch.
    ///
    /// Files are visited in name order so ingestion is reproducible.
    pub fn load_directory(&self, dir: impl AsRef<Path>) -> Result<LoadReport> {
        let dir = dir.as_ref();
        let read_err = |e: std::io::Error| RagError::LoadError {
            name: dir.display().to_string(),
            message: e.to_string(),
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut blobs = Vec::with_capacity(paths.len());
        let mut unreadable = Vec::new();
        for path in paths {
            match FileBlob::from_path(&path) {
                Ok(blob) => blobs.push(blob),
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "skipping unreadable file");
                    unreadable.push(LoadFailure { name: path.display().to_string(), error });
                }
            }
        }

        let mut report = self.load_batch(&blobs);
        report.failures.extend(unreadable);
        Ok(report)
    }
}

fn document_id(name: &str, bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    hasher.update(bytes);
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("doc-{hex}")
}

fn decode_text(blob: &FileBlob) -> Result<String> {
    let bytes = blob.bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&blob.bytes);
    String::from_utf8(bytes.to_vec()).map_err(|e| RagError::LoadError {
        name: blob.name.clone(),
        message: format!("not valid UTF-8: {e}"),
    })
}

static DOCX_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:tab\b[^>]*/>|<w:br\b[^>]*/>|</w:p>")
        .expect("docx token regex is valid")
});

/// Paragraph properties hold tab-stop definitions (`<w:tabs><w:tab .../>`)
/// that must not be read as content.
static PARAGRAPH_PROPERTIES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:pPr(?:\s[^>]*)?>.*?</w:pPr>").expect("paragraph properties regex is valid")
});

static XML_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(amp|lt|gt|quot|apos|#[0-9]+|#x[0-9a-fA-F]+);").expect("entity regex is valid")
});

fn extract_docx(blob: &FileBlob) -> Result<String> {
    let load_err = |message: String| RagError::LoadError { name: blob.name.clone(), message };

    let mut archive = zip::ZipArchive::new(Cursor::new(blob.bytes.as_slice()))
        .map_err(|e| load_err(format!("not a Word document: {e}")))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| load_err(format!("missing document body: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| load_err(format!("unreadable document body: {e}")))?;

    Ok(docx_xml_to_text(&xml))
}

/// Flatten WordprocessingML into text: runs are concatenated, paragraphs are
/// separated by a blank line, tabs and breaks are kept.
pub(crate) fn docx_xml_to_text(xml: &str) -> String {
    let body = PARAGRAPH_PROPERTIES.replace_all(xml, "");
    let mut text = String::new();
    for token in DOCX_TOKEN.captures_iter(&body) {
        if let Some(run) = token.get(1) {
            text.push_str(&unescape_xml(run.as_str()));
            continue;
        }
        match token.get(0).map(|m| m.as_str()) {
            Some("</w:p>") => text.push_str("\n\n"),
            Some(tag) if tag.starts_with("<w:tab") => text.push('\t'),
            Some(_) => text.push('\n'),
            None => {}
        }
    }
    text.trim_end().to_string()
}

fn unescape_xml(raw: &str) -> String {
    XML_ENTITY
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            match entity {
                "amp" => "&".to_string(),
                "lt" => "<".to_string(),
                "gt" => ">".to_string(),
                "quot" => "\"".to_string(),
                "apos" => "'".to_string(),
                _ => {
                    let code = match entity.strip_prefix("#x") {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => entity[1..].parse().ok(),
                    };
                    code.and_then(char::from_u32).map(String::from).unwrap_or_else(|| caps[0].to_string())
                }
            }
        })
        .into_owned()
}

#[cfg(feature = "pdf")]
fn extract_pdf(blob: &FileBlob, temp_dir: Option<&Path>) -> Result<String> {
    use std::io::Write;

    let load_err = |message: String| RagError::LoadError { name: blob.name.clone(), message };

    // Removed when `file` is dropped, including on the error paths below.
    let mut builder = tempfile::Builder::new();
    builder.prefix("koi-upload-").suffix(".pdf");
    let created = match temp_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    };
    let mut file = created.map_err(|e| load_err(format!("cannot create temporary file: {e}")))?;
    file.write_all(&blob.bytes)
        .and_then(|()| file.flush())
        .map_err(|e| load_err(format!("cannot write temporary file: {e}")))?;

    let path = file.path();
    // pdf-extract panics on some malformed inputs.
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text(path))
        .map_err(|_| load_err("PDF parser crashed on this file".to_string()))?
        .map_err(|e| load_err(format!("cannot extract PDF text: {e}")))?;

    Ok(extracted)
}

#[cfg(not(feature = "pdf"))]
fn extract_pdf(blob: &FileBlob, _temp_dir: Option<&Path>) -> Result<String> {
    Err(RagError::UnsupportedFormatError {
        name: blob.name.clone(),
        reason: "PDF support is not enabled in this build".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_bytes(body: &str) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("word/document.xml", options).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn loads_plain_text_and_records_source() {
        let doc = DocumentLoader::new().load(&FileBlob::new("notes.txt", "hello world")).unwrap();
        assert_eq!(doc.text, "hello world");
        assert_eq!(doc.format, DocumentFormat::PlainText);
        assert_eq!(doc.metadata["source"], "notes.txt");
        assert!(doc.id.starts_with("doc-"));
    }

    #[test]
    fn strips_utf8_bom() {
        let doc = DocumentLoader::new()
            .load(&FileBlob::new("bom.txt", b"\xEF\xBB\xBFabc".to_vec()))
            .unwrap();
        assert_eq!(doc.text, "abc");
    }

    #[test]
    fn document_ids_are_stable() {
        let loader = DocumentLoader::new();
        let a = loader.load(&FileBlob::new("a.txt", "same")).unwrap();
        let b = loader.load(&FileBlob::new("a.txt", "same")).unwrap();
        let c = loader.load(&FileBlob::new("c.txt", "same")).unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn declared_format_overrides_extension() {
        let blob = FileBlob::new("upload", "plain").with_format(DocumentFormat::PlainText);
        assert_eq!(DocumentLoader::new().load(&blob).unwrap().text, "plain");
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = DocumentLoader::new().load(&FileBlob::new("sheet.xlsx", "x")).unwrap_err();
        assert!(matches!(err, RagError::UnsupportedFormatError { ref name, .. } if name == "sheet.xlsx"));
    }

    #[test]
    fn batch_skips_bad_files_and_keeps_the_rest() {
        let blobs = vec![
            FileBlob::new("good.txt", "first"),
            FileBlob::new("bad.exe", "x"),
            FileBlob::new("broken.docx", "not a zip"),
            FileBlob::new("also-good.txt", "second"),
        ];
        let report = DocumentLoader::new().load_batch(&blobs);
        let names: Vec<_> = report.documents.iter().map(|d| d.origin.as_str()).collect();
        assert_eq!(names, ["good.txt", "also-good.txt"]);
        assert_eq!(report.failures.len(), 2);
        assert!(matches!(report.failures[1].error, RagError::LoadError { .. }));
    }

    #[test]
    fn identical_blobs_in_one_batch_load_once() {
        let blob = FileBlob::new("notes.txt", "same words");
        let report = DocumentLoader::new().load_batch(&[
            blob.clone(),
            blob,
            FileBlob::new("notes.txt", "other words"),
        ]);

        assert_eq!(report.documents.len(), 2);
        assert_ne!(report.documents[0].id, report.documents[1].id);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].error, RagError::LoadError { .. }));
    }

    #[test]
    fn extracts_docx_paragraphs() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>Refund</w:t></w:r><w:r><w:t xml:space="preserve"> policy</w:t></w:r></w:p>
            <w:p><w:r><w:t>Fish &amp; chips</w:t><w:tab/><w:t>&#169;</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let doc = DocumentLoader::new().load(&FileBlob::new("policy.docx", docx_bytes(xml))).unwrap();
        assert_eq!(doc.text, "Refund policy\n\nFish & chips\t\u{a9}");
        assert_eq!(doc.format, DocumentFormat::WordDocument);
    }

    #[test]
    fn docx_without_body_fails_to_load() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer.start_file("other.xml", zip::write::SimpleFileOptions::default()).unwrap();
            writer.write_all(b"<x/>").unwrap();
            writer.finish().unwrap();
        }
        let err = DocumentLoader::new()
            .load(&FileBlob::new("empty.docx", buffer.into_inner()))
            .unwrap_err();
        assert!(err.to_string().contains("missing document body"));
    }

    #[test]
    fn tab_stops_in_paragraph_properties_are_not_text() {
        let xml = r#"<w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr><w:r><w:t>Hello</w:t></w:r></w:p>"#;
        assert_eq!(docx_xml_to_text(xml), "Hello");

        let xml = r#"<w:p><w:pPr/><w:r><w:t>Name</w:t><w:tab/><w:t>Price</w:t></w:r></w:p>"#;
        assert_eq!(docx_xml_to_text(xml), "Name\tPrice");
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn malformed_pdf_is_a_load_error_and_leaves_no_temp_file() {
        let scratch = tempfile::tempdir().unwrap();
        let err = DocumentLoader::new()
            .with_temp_dir(scratch.path())
            .load(&FileBlob::new("scan.pdf", b"%PDF-1.4 garbage".to_vec()))
            .unwrap_err();
        assert!(matches!(err, RagError::LoadError { .. }));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn directory_loading_is_sorted_and_skips_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "bravo").unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("c.csv"), "x,y").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let report = DocumentLoader::new().load_directory(dir.path()).unwrap();
        let texts: Vec<_> = report.documents.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, ["alpha", "bravo"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "c.csv");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = DocumentLoader::new().load_directory(dir.path().join("absent"));
        assert!(result.is_err());
    }
}
