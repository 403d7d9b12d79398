//! C6 — Retriever. Three-phase hybrid fusion: vector search first, then a
//! keyword-driven text search to pad results below the fallback threshold,
//! then a lenient substring fallback if both come up dry.

use crate::config::RetrieverConfig;
use crate::embedding::EmbeddingProvider;
use crate::models::{RankedChunk, SearchFilter, SearchType};
use crate::store::ChunkStore;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub struct Retriever {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(store: Arc<dyn ChunkStore>, embedder: Arc<dyn EmbeddingProvider>, config: RetrieverConfig) -> Self {
        Retriever { store, embedder, config }
    }

    pub async fn retrieve(&self, question: &str) -> Result<Vec<RankedChunk>, crate::error::StoreError> {
        let filter = SearchFilter::default();
        let mut seen_ids: HashSet<i64> = HashSet::new();
        let mut results: Vec<RankedChunk> = Vec::new();

        // Phase 1: vector search, overfetching 3x so the fusion has enough
        // candidates left after the similarity cutoff.
        if let Ok(embedding) = self.embedder.embed_one(question).await {
            let vector_hits = self
                .store
                .search_vector(&embedding, filter, self.config.limit * 3)
                .await?;
            for (chunk, title, similarity) in vector_hits {
                if similarity <= self.config.vector_threshold {
                    continue;
                }
                if seen_ids.insert(chunk.id) {
                    results.push(RankedChunk {
                        chunk,
                        document_title: title,
                        similarity,
                        search_type: SearchType::Vector,
                    });
                }
            }
        } else {
            debug!("vector phase skipped: question embedding failed");
        }

        // Phase 2: keyword text search, topping up below the fallback threshold.
        if results.len() < self.config.text_fallback_threshold() {
            let keywords = extract_keywords(question, &self.config.stopwords, &self.config.synonyms);
            let text_hits = self
                .store
                .search_text(&keywords, filter, self.config.limit)
                .await?;
            for (chunk, title, similarity) in text_hits {
                if seen_ids.insert(chunk.id) {
                    results.push(RankedChunk {
                        chunk,
                        document_title: title,
                        similarity,
                        search_type: SearchType::Text,
                    });
                }
            }
        }

        // Phase 3: lenient fallback only if both prior phases found nothing.
        // Similarity is fixed at 0.5 regardless of what the store reports,
        // since this is a naive substring probe rather than a real score.
        if results.is_empty() {
            let words: Vec<String> = question
                .split_whitespace()
                .map(|w| w.to_lowercase())
                .filter(|w| w.chars().count() > 2)
                .take(3)
                .collect();
            let fallback_hits = self.store.search_text(&words, filter, self.config.limit).await?;
            for (chunk, title, _similarity) in fallback_hits {
                if seen_ids.insert(chunk.id) {
                    results.push(RankedChunk {
                        chunk,
                        document_title: title,
                        similarity: 0.5,
                        search_type: SearchType::Fallback,
                    });
                }
            }
        }

        results.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(self.config.limit);
        Ok(results)
    }
}

/// Tokenizes, lowercases, drops short tokens and stopwords (keeping 1-2
/// digit numeric tokens for dates), expands configured synonyms, and caps
/// the result at 10 keywords — deterministic, no stemming.
pub fn extract_keywords(
    question: &str,
    stopwords: &[String],
    synonyms: &std::collections::HashMap<String, Vec<String>>,
) -> Vec<String> {
    let stopset: HashSet<&str> = stopwords.iter().map(String::as_str).collect();
    let mut keywords = Vec::new();
    let mut seen = HashSet::new();

    for raw in question.split_whitespace() {
        let token: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if token.is_empty() || stopset.contains(token.as_str()) {
            continue;
        }
        let is_date_digits = token.len() <= 2 && token.chars().all(|c| c.is_ascii_digit());
        if token.len() < 4 && !is_date_digits {
            continue;
        }
        if seen.insert(token.clone()) {
            keywords.push(token.clone());
        }
        if let Some(expansions) = synonyms.get(&token) {
            for syn in expansions {
                if seen.insert(syn.clone()) {
                    keywords.push(syn.clone());
                }
            }
        }
        if keywords.len() >= 10 {
            break;
        }
    }

    keywords.truncate(10);
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn drops_stopwords_and_dedups() {
        let stopwords = vec!["the".to_string(), "a".to_string()];
        let synonyms = HashMap::new();
        let kw = extract_keywords("the salary the payment a date", &stopwords, &synonyms);
        assert_eq!(kw, vec!["salary", "payment", "date"]);
    }

    #[test]
    fn expands_synonyms() {
        let stopwords = vec![];
        let mut synonyms = HashMap::new();
        synonyms.insert("salary".to_string(), vec!["wage".to_string(), "pay".to_string()]);
        let kw = extract_keywords("salary question", &stopwords, &synonyms);
        assert_eq!(kw, vec!["salary", "wage", "pay", "question"]);
    }

    #[test]
    fn keeps_short_numeric_tokens_but_drops_other_short_words() {
        let stopwords = vec![];
        let synonyms = HashMap::new();
        let kw = extract_keywords("paid on 12 of the month not by", &stopwords, &synonyms);
        assert!(kw.contains(&"12".to_string()));
        assert!(!kw.contains(&"not".to_string()));
        assert!(!kw.contains(&"by".to_string()));
    }

    #[test]
    fn caps_at_ten_keywords() {
        let stopwords = vec![];
        let synonyms = HashMap::new();
        let question = (1..=20).map(|n| format!("word{n}")).collect::<Vec<_>>().join(" ");
        let kw = extract_keywords(&question, &stopwords, &synonyms);
        assert_eq!(kw.len(), 10);
    }

    #[test]
    fn strips_punctuation() {
        let stopwords = vec![];
        let synonyms = HashMap::new();
        let kw = extract_keywords("salary, payment?", &stopwords, &synonyms);
        assert_eq!(kw, vec!["salary", "payment"]);
    }
}
