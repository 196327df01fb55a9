//! Keyword recall shared by the stateful backends.
//!
//! An entry scores by the share of query keywords found in its exchange.
//! Keywords are lowercase alphanumeric words of three or more characters,
//! minus common stopwords, with a trailing plural `s` dropped.

use std::collections::BTreeSet;

use chrono::Utc;
use handoff_core::memory::MemoryEntry;
use uuid::Uuid;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "your", "all", "any", "can", "had", "her",
    "was", "one", "our", "out", "has", "him", "his", "how", "its", "who", "did", "yes", "she",
    "what", "when", "where", "which", "with", "that", "this", "from", "they", "them", "then",
    "than", "have", "been", "will", "would", "could", "should", "about", "there", "their",
    "into", "just", "also", "some", "tell", "please",
];

/// Build a fresh entry for a completed exchange.
pub fn new_entry(user_input: &str, assistant_response: &str, user_id: &str) -> MemoryEntry {
    MemoryEntry {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        user_input: user_input.to_string(),
        assistant_response: assistant_response.to_string(),
        created_at: Utc::now(),
        score: 0.0,
    }
}

pub fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .map(|w| {
            let singular = w
                .strip_suffix('s')
                .filter(|stem| stem.len() >= 3 && !stem.ends_with('s'))
                .map(str::to_string);
            singular.unwrap_or(w)
        })
        .collect()
}

/// Share of `query` keywords present in the entry, in `0.0..=1.0`.
pub fn score(query: &BTreeSet<String>, entry: &MemoryEntry) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    let mut known = keywords(&entry.user_input);
    known.extend(keywords(&entry.assistant_response));
    let hits = query.iter().filter(|k| known.contains(*k)).count();
    hits as f32 / query.len() as f32
}

/// The top `limit` entries of `user_id` relevant to `text`, best first.
/// Ties go to the newer entry.
pub fn rank(entries: &[MemoryEntry], text: &str, user_id: &str, limit: usize) -> Vec<MemoryEntry> {
    let query = keywords(text);
    let mut hits: Vec<MemoryEntry> = entries
        .iter()
        .filter(|e| e.user_id == user_id)
        .filter_map(|e| {
            let s = score(&query, e);
            (s > 0.0).then(|| MemoryEntry {
                score: s,
                ..e.clone()
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    hits.truncate(limit);
    hits
}

/// Render ranked entries as a digest, or `None` when there are none.
pub fn digest(ranked: &[MemoryEntry]) -> Option<String> {
    if ranked.is_empty() {
        return None;
    }
    Some(
        ranked
            .iter()
            .map(MemoryEntry::digest_line)
            .collect::<Vec<_>>()
            .join("\n"),
    )
}
