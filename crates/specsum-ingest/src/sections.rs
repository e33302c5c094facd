//! Keyword-based section location.
//!
//! Specification PDFs repeat the section name in each page footer
//! (e.g. "UNIT MASONRY 04 20 00 - 3"). Every maximal run of consecutive pages
//! whose footer carries the keyword becomes one [`Section`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SourceError;
use crate::pdf::SpecDocument;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// A page whose footer matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMatch {
    pub page_number: u32,
    pub matches: Vec<String>,
}

/// Consecutive pages sharing the keyword, offered to the user for selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub title: String,
    pub start_page: u32,
    pub end_page: u32,
    pub pages: Vec<u32>,
}

impl Section {
    /// "UNIT MASONRY (Pages 12-19)"
    pub fn display_title(&self) -> String {
        format!("{} (Pages {}-{})", self.title, self.start_page, self.end_page)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatedSections {
    pub relevant_pages: Vec<PageMatch>,
    pub sections: Vec<Section>,
}

/// Collapse whitespace runs so "UNIT  MASONRY" and "UNIT\nMASONRY" match.
fn normalize(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Find every run of pages whose footer region contains `keyword`.
pub fn locate_sections(
    doc: &SpecDocument,
    keyword: &str,
    footer_fraction: f32,
) -> Result<LocatedSections, SourceError> {
    let needle = normalize(keyword);
    if needle.is_empty() {
        return Err(SourceError::KeywordNotFound(keyword.to_string()));
    }

    let mut relevant_pages = Vec::new();
    let mut sections: Vec<Section> = Vec::new();
    let mut current: Option<Section> = None;

    for page in doc.pages() {
        let footer = normalize(&page.footer_text(footer_fraction));
        if footer.contains(&needle) {
            relevant_pages.push(PageMatch {
                page_number: page.number,
                matches: vec![needle.clone()],
            });
            match current.as_mut() {
                Some(section) => {
                    section.end_page = page.number;
                    section.pages.push(page.number);
                }
                None => {
                    current = Some(Section {
                        title: needle.clone(),
                        start_page: page.number,
                        end_page: page.number,
                        pages: vec![page.number],
                    });
                }
            }
        } else if let Some(section) = current.take() {
            sections.push(section);
        }
    }
    if let Some(section) = current.take() {
        sections.push(section);
    }

    if sections.is_empty() {
        return Err(SourceError::KeywordNotFound(needle));
    }

    debug!(
        "Keyword {:?}: {} pages in {} sections",
        needle,
        relevant_pages.len(),
        sections.len()
    );

    Ok(LocatedSections {
        relevant_pages,
        sections,
    })
}
