//! specsum ingest: chunk splitting, PDF page layout extraction, section location.

pub mod chunking;
pub mod error;
pub mod pdf;
pub mod sections;

pub use chunking::{Chunk, ChunkSplitter};
pub use error::SourceError;
pub use pdf::{PageLayout, SpecDocument, TextFragment};
pub use sections::{locate_sections, LocatedSections, PageMatch, Section};
