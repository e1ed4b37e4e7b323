//! Similarity index and retrieval.
//!
//! Embeddings are derived deterministically from document text: the SHA-256
//! digest of the text seeds a fixed-length vector which is then
//! L2-normalized. Identical text always produces an identical vector,
//! independent of corpus size or order and across process restarts. Scoring
//! is the dot product of unit vectors, i.e. cosine similarity.

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::models::{DocMeta, Document, IndexEntry, Retrieved};

/// Characters of document text kept as the index preview.
const PREVIEW_CHARS: usize = 200;

/// Deterministic embedding of `text` with `dim` components.
///
/// Digest bytes are read most-significant-first and cycled when `dim`
/// exceeds the digest length, mapped into `[0, 1]`, then L2-normalized
/// (with a small guard against the zero vector).
pub fn embed(text: &str, dim: usize) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());

    let raw: Vec<f32> = (0..dim)
        .map(|i| digest[digest.len() - 1 - (i % digest.len())] as f32 / 255.0)
        .collect();

    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    raw.iter().map(|x| x / (norm + 1e-9)).collect()
}

/// Build a fresh index over the corpus.
///
/// The index is a cache: it is never persisted and is rebuilt on demand
/// from the documents.
pub fn build_index(docs: &[Document], dim: usize) -> Vec<IndexEntry> {
    debug!(docs = docs.len(), dim, "building similarity index");

    docs.iter()
        .map(|doc| IndexEntry {
            id: doc.id.clone(),
            embedding: embed(&doc.text, dim),
            meta: DocMeta {
                title: doc.title.clone(),
                source: doc.source.clone(),
                preview: doc.text.chars().take(PREVIEW_CHARS).collect(),
            },
        })
        .collect()
}

/// Retrieve the `top_k` most similar entries for `query`.
///
/// The query is embedded with the same dimensionality as the index entries.
/// Results are sorted by descending score; the sort is stable, so ties keep
/// their original index order.
pub fn retrieve(query: &str, index: &[IndexEntry], top_k: usize) -> Retrieved {
    let dim = index.first().map(|e| e.embedding.len()).unwrap_or(16);
    let query_emb = embed(query, dim);

    let mut scored: Vec<(DocMeta, f32)> = index
        .iter()
        .map(|entry| {
            let score: f32 = query_emb
                .iter()
                .zip(entry.embedding.iter())
                .map(|(a, b)| a * b)
                .sum();
            (entry.meta.clone(), score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);

    debug!(results = scored.len(), "retrieval complete");
    scored
}

/// Deterministic answer template over the retrieved documents.
pub fn synthesize_answer(query: &str, results: &Retrieved) -> String {
    if results.is_empty() {
        return format!("No relevant documents found for: '{}'", query);
    }

    let references: Vec<String> = results
        .iter()
        .map(|(meta, score)| {
            format!(
                "- **{}** (source: {}, relevance: {:.2})",
                meta.title, meta.source, score
            )
        })
        .collect();

    format!(
        "**Answer for:** \"{}\"\n\n**Relevant documents:**\n\n{}",
        query,
        references.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, title: &str, text: &str) -> Document {
        Document {
            id: id.to_string(),
            title: title.to_string(),
            text: text.to_string(),
            source: "manual".to_string(),
        }
    }

    #[test]
    fn test_embed_is_deterministic() {
        let a = embed("version control basics", 16);
        let b = embed("version control basics", 16);
        assert_eq!(a, b);
    }

    #[test]
    fn test_embed_is_unit_normalized() {
        let v = embed("some text", 16);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_embed_respects_dim() {
        assert_eq!(embed("x", 8).len(), 8);
        assert_eq!(embed("x", 64).len(), 64);
    }

    #[test]
    fn test_identical_text_ranks_first() {
        let docs = vec![
            doc("a", "A", "how to configure the sandbox timeout"),
            doc("b", "B", "completely unrelated cooking recipe"),
        ];
        let index = build_index(&docs, 16);

        let results = retrieve("how to configure the sandbox timeout", &index, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.title, "A");
        // Identical text gets a cosine score of 1.
        assert!((results[0].1 - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_ties_keep_index_order() {
        // Same text in both documents gives identical scores; the stable
        // sort must keep the original order.
        let docs = vec![doc("a", "First", "same"), doc("b", "Second", "same")];
        let index = build_index(&docs, 16);

        let results = retrieve("anything", &index, 2);
        assert_eq!(results[0].0.title, "First");
        assert_eq!(results[1].0.title, "Second");
    }

    #[test]
    fn test_top_k_truncates() {
        let docs = vec![
            doc("a", "A", "one"),
            doc("b", "B", "two"),
            doc("c", "C", "three"),
        ];
        let index = build_index(&docs, 16);
        assert_eq!(retrieve("one", &index, 2).len(), 2);
    }

    #[test]
    fn test_git_scenario() {
        let docs = vec![doc("d1", "Git", "version control basics")];
        let index = build_index(&docs, 16);

        let results = retrieve("git", &index, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.title, "Git");
    }

    #[test]
    fn test_preview_is_truncated() {
        let long_text = "x".repeat(500);
        let index = build_index(&[doc("a", "A", &long_text)], 16);
        assert_eq!(index[0].meta.preview.len(), 200);
    }

    #[test]
    fn test_answer_mentions_titles() {
        let docs = vec![doc("d1", "Git", "version control basics")];
        let index = build_index(&docs, 16);
        let results = retrieve("git", &index, 1);

        let answer = synthesize_answer("git", &results);
        assert!(answer.contains("**Git**"));
        assert!(answer.contains("manual"));
    }

    #[test]
    fn test_answer_for_empty_results() {
        let answer = synthesize_answer("git", &Vec::new());
        assert!(answer.contains("No relevant documents"));
    }
}
