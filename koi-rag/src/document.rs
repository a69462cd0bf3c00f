//! Data types for documents, chunks, and search results.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// The file formats the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    PlainText,
    WordDocument,
    Pdf,
}

impl DocumentFormat {
    /// Map a file extension (without the dot, any case) to a format.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "txt" | "text" | "md" => Some(Self::PlainText),
            "docx" => Some(Self::WordDocument),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Path::new(name).extension().and_then(|ext| ext.to_str()).and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "text",
            Self::WordDocument => "docx",
            Self::Pdf => "pdf",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loaded source document with its extracted text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable identifier derived from the name and contents.
    pub id: String,
    /// File name or path the document came from.
    pub origin: String,
    pub format: DocumentFormat,
    /// The extracted text.
    pub text: String,
    /// Key-value metadata; always carries `source` (the original file name).
    pub metadata: HashMap<String, String>,
}

/// A bounded segment of a [`Document`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier, `{document_id}_{index}`.
    pub id: String,
    pub text: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Character offset of the chunk start within the document text.
    pub offset: usize,
    /// Metadata inherited from the parent document plus `chunk_index`.
    pub metadata: HashMap<String, String>,
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub chunk: Chunk,
    /// Higher is more relevant. The scale depends on the producing index.
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_are_detected_from_names() {
        assert_eq!(DocumentFormat::from_name("notes.TXT"), Some(DocumentFormat::PlainText));
        assert_eq!(DocumentFormat::from_name("report.docx"), Some(DocumentFormat::WordDocument));
        assert_eq!(DocumentFormat::from_name("paper.pdf"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_name("legacy.doc"), None);
        assert_eq!(DocumentFormat::from_name("README"), None);
    }
}
