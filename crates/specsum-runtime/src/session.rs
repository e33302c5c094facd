//! Session-scoped document store.
//!
//! Each upload lives under its own session id so concurrent users never see
//! each other's documents. Sessions expire after a sliding TTL, and the least
//! recently used one is evicted when the store is full.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use specsum_ingest::{LocatedSections, PageMatch, Section, SpecDocument};
use tracing::{debug, info};

/// A parsed upload and the sections located in it.
#[derive(Debug)]
pub struct DocumentSession {
    pub id: String,
    pub filename: String,
    pub keyword: String,
    pub document: SpecDocument,
    pub located: LocatedSections,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Public view of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub filename: String,
    pub keyword: String,
    pub page_count: usize,
    pub relevant_pages: Vec<PageMatch>,
    pub sections: Vec<Section>,
    pub created_at: String,
}

impl DocumentSession {
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            filename: self.filename.clone(),
            keyword: self.keyword.clone(),
            page_count: self.document.page_count(),
            relevant_pages: self.located.relevant_pages.clone(),
            sections: self.located.sections.clone(),
            created_at: self.created_at.to_rfc3339(),
        }
    }
}

struct Entry {
    session: Arc<DocumentSession>,
    last_access: Instant,
}

/// Manages document sessions with sliding TTL.
pub struct DocumentSessions {
    sessions: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
    max_sessions: usize,
}

impl DocumentSessions {
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Store a document. An existing live `session_id` has its document
    /// replaced; otherwise a fresh session is created.
    pub fn insert(
        &self,
        session_id: Option<&str>,
        filename: impl Into<String>,
        keyword: impl Into<String>,
        document: SpecDocument,
        located: LocatedSections,
    ) -> Arc<DocumentSession> {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        self.purge_locked(&mut sessions, now);

        let id = match session_id {
            Some(id) if sessions.contains_key(id) => id.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        let replacing = sessions.contains_key(&id);

        if !replacing && sessions.len() >= self.max_sessions {
            // Evict the least recently used session
            if let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(id, _)| id.clone())
            {
                sessions.remove(&oldest);
                info!("Evicted document session {}", oldest);
            }
        }

        let session = Arc::new(DocumentSession {
            id: id.clone(),
            filename: filename.into(),
            keyword: keyword.into(),
            document,
            located,
            created_at: chrono::Utc::now(),
        });
        sessions.insert(
            id.clone(),
            Entry {
                session: session.clone(),
                last_access: now,
            },
        );

        if replacing {
            info!("Document session {} replaced", id);
        } else {
            info!("Document session created: {}", id);
        }
        session
    }

    /// Get a live session, refreshing its TTL.
    pub fn get(&self, id: &str) -> Option<Arc<DocumentSession>> {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let expired = sessions
            .get(id)
            .is_some_and(|e| now.duration_since(e.last_access) >= self.ttl);
        if expired {
            sessions.remove(id);
            debug!("Document session {} expired", id);
            return None;
        }
        let entry = sessions.get_mut(id)?;
        entry.last_access = now;
        Some(entry.session.clone())
    }

    /// End a session.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().remove(id).is_some();
        if removed {
            info!("Document session ended: {}", id);
        }
        removed
    }

    /// Drop every expired session, returning how many went.
    pub fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        self.purge_locked(&mut sessions, Instant::now())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    fn purge_locked(&self, sessions: &mut HashMap<String, Entry>, now: Instant) -> usize {
        let before = sessions.len();
        sessions.retain(|_, e| now.duration_since(e.last_access) < self.ttl);
        let purged = before - sessions.len();
        if purged > 0 {
            debug!("Purged {} expired document sessions", purged);
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specsum_ingest::{PageLayout, TextFragment};

    fn document(footer: &str) -> (SpecDocument, LocatedSections) {
        let doc = SpecDocument::from_pages(vec![PageLayout {
            number: 1,
            bottom: 0.0,
            height: 792.0,
            fragments: vec![TextFragment {
                text: footer.into(),
                y: 20.0,
            }],
            readable: true,
        }]);
        let located = specsum_ingest::locate_sections(&doc, footer, 0.10).unwrap();
        (doc, located)
    }

    fn store(ttl_ms: u64, max: usize) -> DocumentSessions {
        DocumentSessions::new(Duration::from_millis(ttl_ms), max)
    }

    #[test]
    fn test_create_and_get() {
        let sessions = store(60_000, 4);
        let (doc, located) = document("UNIT MASONRY");
        let created = sessions.insert(None, "spec.pdf", "UNIT MASONRY", doc, located);

        let fetched = sessions.get(&created.id).unwrap();
        assert_eq!(fetched.filename, "spec.pdf");
        let summary = fetched.summary();
        assert_eq!(summary.page_count, 1);
        assert_eq!(summary.sections.len(), 1);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let sessions = store(60_000, 4);
        let (a_doc, a_loc) = document("UNIT MASONRY");
        let (b_doc, b_loc) = document("CONCRETE");
        let a = sessions.insert(None, "a.pdf", "UNIT MASONRY", a_doc, a_loc);
        let b = sessions.insert(None, "b.pdf", "CONCRETE", b_doc, b_loc);

        assert_ne!(a.id, b.id);
        assert_eq!(sessions.get(&a.id).unwrap().filename, "a.pdf");
        assert_eq!(sessions.get(&b.id).unwrap().filename, "b.pdf");
    }

    #[test]
    fn test_upload_replaces_document_in_same_session() {
        let sessions = store(60_000, 4);
        let (doc, located) = document("UNIT MASONRY");
        let first = sessions.insert(None, "old.pdf", "UNIT MASONRY", doc, located);
        let (doc, located) = document("UNIT MASONRY");
        let second = sessions.insert(Some(&first.id), "new.pdf", "UNIT MASONRY", doc, located);

        assert_eq!(first.id, second.id);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions.get(&first.id).unwrap().filename, "new.pdf");
    }

    #[test]
    fn test_unknown_session_id_gets_fresh_session() {
        let sessions = store(60_000, 4);
        let (doc, located) = document("UNIT MASONRY");
        let created = sessions.insert(Some("made-up"), "x.pdf", "UNIT MASONRY", doc, located);
        assert_ne!(created.id, "made-up");
    }

    #[test]
    fn test_remove_ends_session() {
        let sessions = store(60_000, 4);
        let (doc, located) = document("UNIT MASONRY");
        let created = sessions.insert(None, "x.pdf", "UNIT MASONRY", doc, located);
        assert!(sessions.remove(&created.id));
        assert!(!sessions.remove(&created.id));
        assert!(sessions.get(&created.id).is_none());
    }

    #[test]
    fn test_ttl_expiry() {
        let sessions = store(30, 4);
        let (doc, located) = document("UNIT MASONRY");
        let created = sessions.insert(None, "x.pdf", "UNIT MASONRY", doc, located);
        std::thread::sleep(Duration::from_millis(60));
        assert!(sessions.get(&created.id).is_none());
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_lru_eviction_keeps_recently_used() {
        let sessions = store(60_000, 2);
        let (doc, located) = document("UNIT MASONRY");
        let a = sessions.insert(None, "a.pdf", "UNIT MASONRY", doc, located);
        std::thread::sleep(Duration::from_millis(5));
        let (doc, located) = document("UNIT MASONRY");
        let b = sessions.insert(None, "b.pdf", "UNIT MASONRY", doc, located);
        std::thread::sleep(Duration::from_millis(5));
        // Touch a so b becomes least recently used
        sessions.get(&a.id).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        let (doc, located) = document("UNIT MASONRY");
        let c = sessions.insert(None, "c.pdf", "UNIT MASONRY", doc, located);

        assert_eq!(sessions.len(), 2);
        assert!(sessions.get(&a.id).is_some());
        assert!(sessions.get(&b.id).is_none());
        assert!(sessions.get(&c.id).is_some());
    }
}
