//! Summarization runtime: chunk fan-out and merge, prompts, document sessions.

pub mod pipeline;
pub mod prompts;
pub mod session;

pub use pipeline::{validate_section_text, PipelineError, PipelineEvent, Summary, SummaryPipeline};
pub use session::{DocumentSession, DocumentSessions, SessionSummary};
