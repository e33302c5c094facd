//! Source extraction errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Keyword \"{0}\" not found in PDF.")]
    KeywordNotFound(String),

    #[error("Page {0} text is unavailable")]
    PageUnavailable(u32),
}

impl From<lopdf::Error> for SourceError {
    fn from(e: lopdf::Error) -> Self {
        SourceError::Pdf(e.to_string())
    }
}
