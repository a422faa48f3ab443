use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::category::ProductCategory;
use crate::text::terms;

pub const DEFAULT_CHUNK_CHARS: usize = 800;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeFile {
    pub id: String,
    pub name: String,
    pub category: Option<ProductCategory>,
    pub chunk_count: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: String,
    pub file_id: String,
    pub category: Option<ProductCategory>,
    pub position: u32,
    pub content: String,
}

/// Splits reference text into chunks on paragraph boundaries, packing
/// paragraphs until `max_chars` would be exceeded. Oversized paragraphs are
/// split on whitespace.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if paragraph.chars().count() > max_chars {
            flush(&mut current, &mut chunks);
            split_long_paragraph(paragraph, max_chars, &mut chunks);
            continue;
        }

        let needed = current.chars().count() + paragraph.chars().count() + 2;
        if !current.is_empty() && needed > max_chars {
            flush(&mut current, &mut chunks);
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    flush(&mut current, &mut chunks);
    chunks
}

fn split_long_paragraph(paragraph: &str, max_chars: usize, chunks: &mut Vec<String>) {
    let mut current = String::new();
    for word in paragraph.split_whitespace() {
        if !current.is_empty() && current.chars().count() + word.chars().count() + 1 > max_chars {
            flush(&mut current, chunks);
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    flush(&mut current, chunks);
}

/// Ranks chunks by how many distinct query terms they contain. Chunks with
/// no overlap are dropped; ties keep their input order.
pub fn rank_chunks<'a>(
    query: &str,
    chunks: &'a [KnowledgeChunk],
    limit: usize,
) -> Vec<&'a KnowledgeChunk> {
    let query_terms = content_terms(query);
    if query_terms.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, &KnowledgeChunk)> = chunks
        .iter()
        .filter_map(|chunk| {
            let chunk_terms = content_terms(&chunk.content);
            let overlap = query_terms.intersection(&chunk_terms).count();
            (overlap > 0).then_some((overlap, chunk))
        })
        .collect();
    scored.sort_by(|left, right| right.0.cmp(&left.0));
    scored.into_iter().take(limit).map(|(_, chunk)| chunk).collect()
}

/// Normalized function words that carry no topic on their own.
const STOPWORDS: &[&str] = &[
    "aos", "ate", "com", "como", "das", "dos", "ela", "ele", "essa", "esse", "esta", "este",
    "isso", "mais", "meu", "minha", "muito", "nao", "nas", "nos", "num", "numa", "para",
    "pela", "pelo", "por", "pra", "qual", "quais", "que", "quem", "sao", "seu", "sobre",
    "sua", "tem", "uma", "umas", "uns", "voce",
];

fn content_terms(text: &str) -> HashSet<String> {
    terms(text, 3)
        .into_iter()
        .filter(|term| !STOPWORDS.contains(&term.as_str()))
        .collect()
}

fn flush(current: &mut String, chunks: &mut Vec<String>) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
    }
}
