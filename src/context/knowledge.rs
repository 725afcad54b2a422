//! Knowledge base sections and budget-bound compression.

use std::path::Path;
use tracing::{debug, info};

use super::tokens::estimate_tokens;
use crate::error::Result;

/// Line that separates two sections in a knowledge base document.
const SECTION_DELIMITER: &str = "---";

/// Joins selected sections in the compressed block.
const SECTION_SEPARATOR: &str = "\n\n";

/// A self-contained unit of the knowledge base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub content: String,
    /// Estimated token cost, computed once at load
    pub tokens: usize,
}

impl Section {
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let tokens = estimate_tokens(&content);
        Self { content, tokens }
    }
}

/// Ordered knowledge base; earlier sections have higher priority.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    sections: Vec<Section>,
}

impl KnowledgeBase {
    /// Create an empty knowledge base.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from section texts already in priority order.
    pub fn from_sections<I, S>(sections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sections: sections.into_iter().map(Section::new).collect(),
        }
    }

    /// Split a document into sections on lines consisting solely of `---`.
    ///
    /// Document order is priority order. Blank sections are dropped.
    pub fn parse(document: &str) -> Self {
        let mut sections = Vec::new();
        let mut current = String::new();

        for line in document.lines() {
            if line.trim() == SECTION_DELIMITER {
                push_section(&mut sections, &current);
                current.clear();
            } else {
                current.push_str(line);
                current.push('\n');
            }
        }
        push_section(&mut sections, &current);

        Self { sections }
    }

    /// Load a knowledge base document from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading knowledge base");

        let contents = std::fs::read_to_string(path)?;
        let knowledge = Self::parse(&contents);
        info!(
            sections = knowledge.len(),
            tokens = knowledge.total_tokens(),
            "Knowledge base loaded"
        );
        Ok(knowledge)
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Estimated cost of the whole knowledge base.
    pub fn total_tokens(&self) -> usize {
        self.sections.iter().map(|s| s.tokens).sum()
    }

    /// Greedily take whole sections, highest priority first, stopping at the
    /// first one that would push the total past `budget`.
    ///
    /// Every section after the first is also charged for the separator it is
    /// joined with, so the compressed block never estimates above `budget`.
    pub fn select(&self, budget: usize) -> Vec<&Section> {
        let separator_tokens = estimate_tokens(SECTION_SEPARATOR);
        let mut used = 0;
        let mut selected = Vec::new();

        for section in &self.sections {
            let cost = if selected.is_empty() {
                section.tokens
            } else {
                section.tokens + separator_tokens
            };
            if used + cost > budget {
                debug!(
                    kept = selected.len(),
                    dropped = self.sections.len() - selected.len(),
                    used,
                    budget,
                    "Knowledge base truncated to budget"
                );
                break;
            }
            used += cost;
            selected.push(section);
        }

        selected
    }

    /// The selected sections joined into one block of text.
    ///
    /// The block is within `budget`; headings the caller wraps around it are not.
    pub fn compress(&self, budget: usize) -> String {
        self.select(budget)
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join(SECTION_SEPARATOR)
    }
}

fn push_section(sections: &mut Vec<Section>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        sections.push(Section::new(trimmed));
    }
}
