//! Document content as handed to the intent extractor.

use lookout_adapters::FetchedContent;
use lookout_agent::Attachment;

use crate::error::{IntentError, Result};

/// One piece of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentPart {
    Text(String),
    /// Binary content the model reads natively (images, PDFs).
    Binary(Attachment),
}

/// A named document made of text and binary parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub parts: Vec<DocumentPart>,
}

impl Document {
    /// A plain-text document.
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parts: vec![DocumentPart::Text(text.into())],
        }
    }

    /// Convert fetched bytes according to their media type.
    ///
    /// Text-like media is decoded as UTF-8; images and PDFs become
    /// attachments. Anything else cannot be read and is a parse error.
    pub fn from_fetched(content: FetchedContent) -> Result<Self> {
        let FetchedContent {
            name,
            media_type,
            bytes,
        } = content;
        let media_type = media_type.to_ascii_lowercase();

        let part = if is_text_like(&media_type) {
            let text = String::from_utf8(bytes).map_err(|e| IntentError::Parse {
                document: name.clone(),
                reason: format!("content is not valid UTF-8: {e}"),
            })?;
            DocumentPart::Text(text)
        } else if media_type.starts_with("image/") || media_type == "application/pdf" {
            DocumentPart::Binary(Attachment::new(name.clone(), media_type, bytes))
        } else {
            return Err(IntentError::Parse {
                document: name,
                reason: format!("unsupported media type `{media_type}`"),
            });
        };

        Ok(Self {
            name,
            parts: vec![part],
        })
    }

    /// All text parts, joined by blank lines.
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                DocumentPart::Text(t) => Some(t.as_str()),
                DocumentPart::Binary(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// All binary parts.
    pub fn attachments(&self) -> Vec<Attachment> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                DocumentPart::Binary(a) => Some(a.clone()),
                DocumentPart::Text(_) => None,
            })
            .collect()
    }

    /// Whether the document has nothing to read.
    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|p| match p {
            DocumentPart::Text(t) => t.trim().is_empty(),
            DocumentPart::Binary(a) => a.data.is_empty(),
        })
    }
}

fn is_text_like(media_type: &str) -> bool {
    media_type.starts_with("text/")
        || matches!(
            media_type,
            "application/json"
                | "application/xml"
                | "application/x-yaml"
                | "application/yaml"
                | "application/toml"
                | "application/x-toml"
                | "application/csv"
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(name: &str, media_type: &str, bytes: &[u8]) -> FetchedContent {
        FetchedContent {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn text_is_decoded() {
        let doc = Document::from_fetched(fetched("notes.md", "text/markdown", b"# Plan")).unwrap();
        assert_eq!(doc.text_content(), "# Plan");
        assert!(doc.attachments().is_empty());
    }

    #[test]
    fn images_and_pdfs_become_attachments() {
        let doc = Document::from_fetched(fetched("scan.png", "image/png", &[0x89, 0x50])).unwrap();
        assert_eq!(doc.attachments().len(), 1);
        assert_eq!(doc.text_content(), "");

        let doc = Document::from_fetched(fetched("m.pdf", "Application/PDF", b"%PDF")).unwrap();
        assert_eq!(doc.attachments()[0].media_type, "application/pdf");
    }

    #[test]
    fn unsupported_media_is_a_parse_error() {
        let err = Document::from_fetched(fetched("a.zip", "application/zip", b"PK")).unwrap_err();
        assert!(err.is_parse_error());

        let err = Document::from_fetched(fetched("a.txt", "text/plain", &[0xff, 0xfe])).unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn blank_text_is_empty() {
        assert!(Document::text("a", "  \n").is_empty());
        assert!(!Document::text("a", "hi").is_empty());
    }
}
