//! Chunked summarization: split, fan out per-chunk extraction, merge.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use specsum_chat::{ChatMessage, Completion, ServiceError, SummarizationService};
use specsum_core::{ChunkingConfig, PipelineConfig};
use specsum_ingest::ChunkSplitter;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::prompts;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Extraction of chunk {chunk} of {total} failed: {source}")]
    Extraction {
        chunk: usize,
        total: usize,
        source: ServiceError,
    },

    #[error("Merge failed: {0}")]
    Merge(#[source] ServiceError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Final summary for one input text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub text: String,
    pub chunks: usize,
    /// Whether a merge call produced `text`.
    pub merged: bool,
    pub model: String,
    pub duration_ms: u64,
}

/// Progress notifications emitted while a summary is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineEvent {
    Chunked { total: usize, chars: usize },
    ChunkDone { index: usize, total: usize },
    Merging { total: usize },
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::Chunked { .. } => "chunked",
            PipelineEvent::ChunkDone { .. } => "chunkDone",
            PipelineEvent::Merging { .. } => "merging",
        }
    }
}

/// Reject missing or blank section text before any external call.
pub fn validate_section_text(text: Option<&str>) -> Result<&str, PipelineError> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(PipelineError::InvalidInput("Section text is required".into())),
    }
}

pub struct SummaryPipeline {
    service: Arc<dyn SummarizationService>,
    splitter: ChunkSplitter,
    max_concurrency: usize,
    request_timeout: Duration,
}

impl SummaryPipeline {
    pub fn new(
        service: Arc<dyn SummarizationService>,
        chunking: ChunkingConfig,
        pipeline: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let splitter =
            ChunkSplitter::new(chunking).map_err(|e| PipelineError::Config(e.to_string()))?;
        if pipeline.max_concurrent_requests == 0 {
            return Err(PipelineError::Config(
                "max_concurrent_requests must be at least 1".into(),
            ));
        }
        Ok(Self {
            service,
            splitter,
            max_concurrency: pipeline.max_concurrent_requests,
            request_timeout: Duration::from_secs(pipeline.request_timeout_secs),
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn splitter(&self) -> &ChunkSplitter {
        &self.splitter
    }

    pub async fn summarize(&self, text: &str) -> Result<Summary, PipelineError> {
        self.summarize_with_progress(text, None).await
    }

    /// Produce the final summary, reporting progress on `progress` when given.
    ///
    /// Chunks complete in any order and are put back in index order before the
    /// merge. The first failed chunk fails the whole call, whichever chunk it
    /// is, and sibling requests still in flight are dropped.
    pub async fn summarize_with_progress(
        &self,
        text: &str,
        progress: Option<&UnboundedSender<PipelineEvent>>,
    ) -> Result<Summary, PipelineError> {
        let started = Instant::now();
        let chunks = self.splitter.split(text);
        let total = chunks.len();

        info!("Summarizing {} chars in {} chunk(s)", text.chars().count(), total);
        emit(
            progress,
            PipelineEvent::Chunked {
                total,
                chars: text.chars().count(),
            },
        );

        let chunk_futures: Vec<_> = chunks.iter().map(move |chunk| async move {
            let completion = self
                .call(prompts::extraction_messages(chunk))
                .await
                .map_err(|source| {
                    warn!("Chunk {}/{} failed: {}", chunk.index, total, source);
                    PipelineError::Extraction {
                        chunk: chunk.index,
                        total,
                        source,
                    }
                })?;
            debug!(
                "Chunk {}/{} done ({} chars in, {} chars out)",
                chunk.index,
                total,
                chunk.char_len(),
                completion.text.len()
            );
            emit(
                progress,
                PipelineEvent::ChunkDone {
                    index: chunk.index,
                    total,
                },
            );
            Ok::<_, PipelineError>((chunk.index, completion))
        }).collect();
        let mut results: Vec<(usize, Completion)> = stream::iter(chunk_futures)
        .buffer_unordered(self.max_concurrency)
        .try_collect()
        .await?;
        results.sort_by_key(|(index, _)| *index);
        let results: Vec<Completion> = results.into_iter().map(|(_, c)| c).collect();

        let (text, model, merged) = if results.len() == 1 {
            let only = results.into_iter().next().unwrap_or_else(|| Completion {
                text: String::new(),
                model: String::new(),
            });
            (only.text, only.model, false)
        } else {
            emit(progress, PipelineEvent::Merging { total });
            let texts: Vec<String> = results.into_iter().map(|c| c.text).collect();
            let completion = self
                .call(prompts::merge_messages(&texts))
                .await
                .map_err(PipelineError::Merge)?;
            (completion.text, completion.model, true)
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        info!("Summary ready: {} chunk(s), merged={}, {}ms", total, merged, duration_ms);

        Ok(Summary {
            text,
            chunks: total,
            merged,
            model,
            duration_ms,
        })
    }

    async fn call(&self, messages: Vec<ChatMessage>) -> Result<Completion, ServiceError> {
        match tokio::time::timeout(self.request_timeout, self.service.complete(messages)).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout(self.request_timeout)),
        }
    }
}

fn emit(progress: Option<&UnboundedSender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(tx) = progress {
        // Receiver gone means the client stopped listening; keep working.
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Handler = Box<dyn Fn(&[ChatMessage]) -> (u64, Result<String, ServiceError>) + Send + Sync>;

    /// Answers from a handler returning (delay in ms, result).
    struct ScriptedService {
        handler: Handler,
        requests: Mutex<Vec<Vec<ChatMessage>>>,
        finished: AtomicUsize,
    }

    impl ScriptedService {
        fn new(
            handler: impl Fn(&[ChatMessage]) -> (u64, Result<String, ServiceError>) + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                handler: Box::new(handler),
                requests: Mutex::new(Vec::new()),
                finished: AtomicUsize::new(0),
            })
        }

        fn requests(&self) -> Vec<Vec<ChatMessage>> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl SummarizationService for ScriptedService {
        async fn complete(&self, messages: Vec<ChatMessage>) -> Result<Completion, ServiceError> {
            self.requests.lock().push(messages.clone());
            let (delay, result) = (self.handler)(&messages);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            result.map(|text| Completion {
                text,
                model: "mock-model".into(),
            })
        }
    }

    fn is_merge(messages: &[ChatMessage]) -> bool {
        messages[1].content.contains("=== PORTION")
    }

    /// Part number from "part i of n", or 1 for a single-chunk prompt.
    fn part(messages: &[ChatMessage]) -> usize {
        let user = &messages[1].content;
        user.find("part ")
            .and_then(|at| user[at + 5..].split(' ').next())
            .and_then(|n| n.parse().ok())
            .unwrap_or(1)
    }

    fn pipeline(service: Arc<ScriptedService>, max: usize, overlap: usize) -> SummaryPipeline {
        let chunking = ChunkingConfig {
            max_chunk_chars: max,
            overlap_chars: overlap,
            lookback_chars: 0,
        };
        SummaryPipeline::new(service, chunking, &PipelineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_short_text_single_call_no_merge() {
        let service = ScriptedService::new(|_| (0, Ok("REPORT".into())));
        let text = "x".repeat(10_000);
        let summary = pipeline(service.clone(), 24_000, 2_000)
            .summarize(&text)
            .await
            .unwrap();

        assert_eq!(summary.text, "REPORT");
        assert_eq!(summary.chunks, 1);
        assert!(!summary.merged);
        assert_eq!(service.requests().len(), 1);
        assert!(service.requests()[0][1].content.contains(&text));
    }

    #[tokio::test]
    async fn test_empty_text_still_calls_once() {
        let service = ScriptedService::new(|_| (0, Ok(String::new())));
        let summary = pipeline(service.clone(), 24_000, 2_000)
            .summarize("")
            .await
            .unwrap();

        assert_eq!(service.requests().len(), 1);
        assert_eq!(summary.chunks, 1);
        assert!(!summary.merged);
        assert_eq!(summary.text, "");
    }

    #[tokio::test]
    async fn test_results_merged_in_chunk_order() {
        // Earlier chunks finish later.
        let service = ScriptedService::new(|messages| {
            if is_merge(messages) {
                return (0, Ok("MERGED".into()));
            }
            let n = part(messages) as u64;
            ((4 - n) * 40, Ok(format!("result {}", n)))
        });
        let text = "a".repeat(250);
        let summary = pipeline(service.clone(), 100, 10)
            .summarize(&text)
            .await
            .unwrap();

        assert_eq!(summary.text, "MERGED");
        assert_eq!(summary.chunks, 3);
        assert!(summary.merged);

        let requests = service.requests();
        let merge = requests.iter().find(|m| is_merge(m)).unwrap();
        let user = &merge[1].content;
        let p1 = user.find("=== PORTION 1 OF 3 ===\nresult 1").unwrap();
        let p2 = user.find("=== PORTION 2 OF 3 ===\nresult 2").unwrap();
        let p3 = user.find("=== PORTION 3 OF 3 ===\nresult 3").unwrap();
        assert!(p1 < p2 && p2 < p3);
        assert_eq!(requests.iter().filter(|m| is_merge(m)).count(), 1);
    }

    #[tokio::test]
    async fn test_failed_chunk_fails_operation_and_cancels_siblings() {
        let service = ScriptedService::new(|messages| match part(messages) {
            1 => (0, Ok("one".into())),
            2 => (10, Err(ServiceError::Transport("connection reset".into()))),
            _ => (400, Ok("three".into())),
        });
        let text = "a".repeat(250);
        let err = pipeline(service.clone(), 100, 10)
            .summarize(&text)
            .await
            .unwrap_err();

        match err {
            PipelineError::Extraction { chunk, total, source } => {
                assert_eq!((chunk, total), (2, 3));
                assert_eq!(source, ServiceError::Transport("connection reset".into()));
            }
            other => panic!("unexpected error: {other}"),
        }

        tokio::time::sleep(Duration::from_millis(600)).await;
        // Chunk 3 was dropped before its sleep finished.
        assert_eq!(service.finished.load(Ordering::SeqCst), 2);
        assert!(!service.requests().iter().any(|m| is_merge(m)));
    }

    #[tokio::test]
    async fn test_fast_failure_not_blocked_by_slow_earlier_chunk() {
        let service = ScriptedService::new(|messages| match part(messages) {
            1 => (800, Ok("one".into())),
            2 => (10, Err(ServiceError::Transport("reset".into()))),
            _ => (400, Ok("three".into())),
        });
        let text = "a".repeat(250);
        let started = Instant::now();
        let err = pipeline(service.clone(), 100, 10)
            .summarize(&text)
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(
            matches!(err, PipelineError::Extraction { chunk: 2, total: 3, .. }),
            "unexpected error: {err}"
        );
        assert!(elapsed < Duration::from_millis(300), "took {:?}", elapsed);

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        // Only the failing chunk ever finished; chunks 1 and 3 were dropped.
        assert_eq!(service.finished.load(Ordering::SeqCst), 1);
        assert!(!service.requests().iter().any(|m| is_merge(m)));
    }

    #[tokio::test]
    async fn test_overlapping_results_reach_merge_with_dedup_rule() {
        let service = ScriptedService::new(|messages| {
            if is_merge(messages) {
                (0, Ok("MORTAR\n- ASTM C270 Type S".into()))
            } else {
                (0, Ok("Mortar per ASTM C270 Type S".into()))
            }
        });
        let text = "b".repeat(150);
        let summary = pipeline(service.clone(), 100, 20)
            .summarize(&text)
            .await
            .unwrap();

        assert_eq!(summary.text, "MORTAR\n- ASTM C270 Type S");
        let requests = service.requests();
        let merge = &requests.iter().find(|m| is_merge(m)).unwrap()[1].content;
        assert_eq!(merge.matches("Mortar per ASTM C270 Type S").count(), 2);
        assert!(merge.contains("=== PORTION 1 OF 2 ==="));
        assert!(merge.contains("=== PORTION 2 OF 2 ==="));
        assert!(merge.contains("exactly once"));
    }

    #[tokio::test]
    async fn test_merge_failure_is_distinct() {
        let service = ScriptedService::new(|messages| {
            if is_merge(messages) {
                (0, Err(ServiceError::Api { status: 429, body: "quota".into() }))
            } else {
                (0, Ok("part".into()))
            }
        });
        let err = pipeline(service, 100, 10)
            .summarize(&"c".repeat(150))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Merge(ServiceError::Api { status: 429, .. })));
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let service = ScriptedService::new(|_| (500, Ok("late".into())));
        let err = pipeline(service, 24_000, 2_000)
            .with_request_timeout(Duration::from_millis(20))
            .summarize("short")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Extraction { source: ServiceError::Timeout(_), .. }
        ));
    }

    #[tokio::test]
    async fn test_progress_events() {
        let service = ScriptedService::new(|_| (0, Ok("ok".into())));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        pipeline(service, 100, 10)
            .summarize_with_progress(&"d".repeat(150), Some(&tx))
            .await
            .unwrap();
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.first(), Some(&PipelineEvent::Chunked { total: 2, chars: 150 }));
        assert_eq!(events.last(), Some(&PipelineEvent::Merging { total: 2 }));
        assert_eq!(
            events.iter().filter(|e| e.name() == "chunkDone").count(),
            2
        );
    }

    #[test]
    fn test_validate_section_text() {
        assert!(validate_section_text(None).is_err());
        assert!(validate_section_text(Some("   ")).is_err());
        assert_eq!(validate_section_text(Some("text")).unwrap(), "text");
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let service = ScriptedService::new(|_| (0, Ok(String::new())));
        let config = PipelineConfig {
            max_concurrent_requests: 0,
            ..Default::default()
        };
        assert!(matches!(
            SummaryPipeline::new(service, ChunkingConfig::default(), &config),
            Err(PipelineError::Config(_))
        ));
    }
}
