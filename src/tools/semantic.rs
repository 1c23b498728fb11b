//! Optional semantic re-ranking of search results.
//!
//! Selected by `Config::semantic_search`. When disabled, results keep the
//! backend's order. When enabled, records are ordered by cosine similarity
//! between the query and the record's text.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use crate::core::config::Config;
use crate::tools::normalizer::ServiceRecord;

const DEFAULT_DIMENSIONS: usize = 256;

/// Turns text into a fixed-length vector.
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Hashed bag-of-words embedding. Deterministic, needs no model files.
#[derive(Debug, Clone)]
pub struct HashedBagOfWords {
    dimensions: usize,
}

impl HashedBagOfWords {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Default for HashedBagOfWords {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl EmbeddingProvider for HashedBagOfWords {
    fn name(&self) -> &str {
        "hashed-bag-of-words"
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let bucket = (fnv1a(&token.to_lowercase()) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf29ce484222325u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x100000001b3)
    })
}

/// Cosine similarity; 0.0 for zero vectors or mismatched lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Query embeddings keyed by query text, each valid for `ttl`.
pub struct EmbeddingCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Vec<f32>)>>,
}

impl EmbeddingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached embedding for `key`; an expired entry is evicted and misses.
    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut entries = self.lock();
        let fresh = entries
            .get(key)
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .map(|(_, vector)| vector.clone());
        if fresh.is_none() {
            entries.remove(key);
        }
        fresh
    }

    /// Store `vector` for `key`, dropping every expired entry first.
    pub fn insert(&self, key: &str, vector: Vec<f32>) {
        let mut entries = self.lock();
        entries.retain(|_, (stored, _)| stored.elapsed() < self.ttl);
        entries.insert(key.to_string(), (Instant::now(), vector));
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (Instant, Vec<f32>)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Semantic search capability.
pub enum SemanticSearch {
    Disabled,
    Enabled {
        provider: Box<dyn EmbeddingProvider>,
        cache: Option<EmbeddingCache>,
    },
}

impl SemanticSearch {
    pub fn from_config(config: &Config) -> Self {
        if !config.semantic_search {
            return SemanticSearch::Disabled;
        }
        let cache = (!config.semantic_cache_ttl.is_zero())
            .then(|| EmbeddingCache::new(config.semantic_cache_ttl));
        SemanticSearch::Enabled {
            provider: Box::new(HashedBagOfWords::default()),
            cache,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, SemanticSearch::Enabled { .. })
    }

    /// Order `records` by similarity to `query`, best first. Ties keep their
    /// original order. A no-op when disabled.
    pub fn rerank(&self, query: &str, records: Vec<ServiceRecord>) -> Vec<ServiceRecord> {
        let SemanticSearch::Enabled { provider, cache } = self else {
            return records;
        };
        if records.len() < 2 || query.trim().is_empty() {
            return records;
        }

        let query_vector = match cache.as_ref().and_then(|cache| cache.get(query)) {
            Some(vector) => vector,
            None => {
                let vector = provider.embed(query);
                if let Some(cache) = cache {
                    cache.insert(query, vector.clone());
                    debug!("Cached embedding for query '{}' ({} cached)", query, cache.len());
                }
                vector
            }
        };

        let mut scored: Vec<(f32, ServiceRecord)> = records
            .into_iter()
            .map(|record| {
                let score = cosine_similarity(&query_vector, &provider.embed(&record_text(&record)));
                (score, record)
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        debug!(
            provider = provider.name(),
            "Re-ranked {} records for query '{}'",
            scored.len(),
            query
        );
        scored.into_iter().map(|(_, record)| record).collect()
    }
}

/// Searchable text of a record: its string and number field values.
fn record_text(record: &ServiceRecord) -> String {
    let mut parts = Vec::new();
    for value in record.data.values() {
        collect_text(value, &mut parts);
    }
    parts.join(" ")
}

fn collect_text(value: &Value, parts: &mut Vec<String>) {
    match value {
        Value::String(s) => parts.push(s.clone()),
        Value::Number(n) => parts.push(n.to_string()),
        Value::Array(items) => items.iter().for_each(|item| collect_text(item, parts)),
        Value::Object(fields) => fields.values().for_each(|item| collect_text(item, parts)),
        _ => {}
    }
}
