//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default upper bound on characters per chunk sent to the model.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 24_000;
/// Default overlap between consecutive chunks.
pub const DEFAULT_OVERLAP_CHARS: usize = 2_000;
/// How far back from a hard cut the splitter looks for a nicer boundary.
pub const DEFAULT_LOOKBACK_CHARS: usize = 1_000;
/// Keyword searched for in page footers.
pub const DEFAULT_KEYWORD: &str = "UNIT MASONRY";
/// Bottom share of the page treated as the footer region.
pub const DEFAULT_FOOTER_FRACTION: f32 = 0.10;

/// Paths to the specsum data directory and the files inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// LLM configuration (`data/llm-config.json`).
    pub llm_config_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            llm_config_file: root.join("llm-config.json"),
            root,
        })
    }
}

/// Chunk sizing for the summarization pipeline. All sizes are in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkingConfig {
    pub max_chunk_chars: usize,
    pub overlap_chars: usize,
    pub lookback_chars: usize,
}

impl ChunkingConfig {
    pub fn new(max_chunk_chars: usize, overlap_chars: usize) -> Result<Self> {
        let config = Self {
            max_chunk_chars,
            overlap_chars,
            lookback_chars: DEFAULT_LOOKBACK_CHARS,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject sizes the splitter cannot make progress with.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_chars == 0 {
            return Err(Error::Config("maxChunkChars must be greater than 0".into()));
        }
        if self.overlap_chars >= self.max_chunk_chars {
            return Err(Error::Config(format!(
                "overlapChars ({}) must be smaller than maxChunkChars ({})",
                self.overlap_chars, self.max_chunk_chars
            )));
        }
        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            overlap_chars: DEFAULT_OVERLAP_CHARS,
            lookback_chars: DEFAULT_LOOKBACK_CHARS,
        }
    }
}

/// Fan-out limits for extraction calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Maximum extraction calls in flight for one request.
    pub max_concurrent_requests: usize,
    /// Per-call timeout in seconds, applied to every model call.
    pub request_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 4,
            request_timeout_secs: 120,
        }
    }
}

/// Keyword search settings for locating sections in an uploaded PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub keyword: String,
    /// Fraction of page height, measured from the bottom, that is searched.
    pub footer_fraction: f32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            keyword: DEFAULT_KEYWORD.into(),
            footer_fraction: DEFAULT_FOOTER_FRACTION,
        }
    }
}

/// Top-level specsum configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecSumConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    pub chunking: ChunkingConfig,
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    /// Sliding idle timeout for uploaded-document sessions.
    pub session_ttl_minutes: u64,
    /// Maximum number of live document sessions.
    pub max_sessions: usize,
    /// Upload size limit in bytes.
    pub max_upload_bytes: usize,
}

impl SpecSumConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::from_lookup(data_dir, |key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup(
        data_dir: impl AsRef<Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let chunking = ChunkingConfig {
            max_chunk_chars: parse_or(&lookup, "SPECSUM_MAX_CHUNK_CHARS", DEFAULT_MAX_CHUNK_CHARS),
            overlap_chars: parse_or(&lookup, "SPECSUM_CHUNK_OVERLAP_CHARS", DEFAULT_OVERLAP_CHARS),
            lookback_chars: parse_or(&lookup, "SPECSUM_LOOKBACK_CHARS", DEFAULT_LOOKBACK_CHARS),
        };
        chunking.validate()?;

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            max_concurrent_requests: parse_or(
                &lookup,
                "SPECSUM_MAX_CONCURRENCY",
                defaults.max_concurrent_requests,
            )
            .max(1),
            request_timeout_secs: parse_or(
                &lookup,
                "SPECSUM_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            ),
        };

        let footer_fraction: f32 =
            parse_or(&lookup, "SPECSUM_FOOTER_FRACTION", DEFAULT_FOOTER_FRACTION);
        if !(footer_fraction > 0.0 && footer_fraction <= 1.0) {
            return Err(Error::Config(format!(
                "SPECSUM_FOOTER_FRACTION must be in (0, 1], got {}",
                footer_fraction
            )));
        }
        let source = SourceConfig {
            keyword: lookup("SPECSUM_KEYWORD")
                .filter(|k| !k.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_KEYWORD.into()),
            footer_fraction,
        };

        let upload_mb: usize = parse_or(&lookup, "SPECSUM_MAX_UPLOAD_MB", 50);
        let max_upload_bytes = upload_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            Error::Config(format!("SPECSUM_MAX_UPLOAD_MB is too large: {}", upload_mb))
        })?;

        let data_paths = DataPaths::new(data_dir)?;

        Ok(Self {
            port: parse_or(&lookup, "PORT", 3000),
            data_paths,
            chunking,
            pipeline,
            source,
            session_ttl_minutes: parse_or(&lookup, "SPECSUM_SESSION_TTL_MINUTES", 60),
            max_sessions: parse_or(&lookup, "SPECSUM_MAX_SESSIONS", 32usize).max(1),
            max_upload_bytes,
        })
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!("Ignoring unparseable {}={:?}", key, raw);
                default
            }
        },
        None => default,
    }
}
