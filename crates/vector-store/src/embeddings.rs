use crate::error::{EmbeddingGenerationError, Result};
use async_trait::async_trait;
use context_code_scanner::{content_hash, Entity};
use ndarray::ArrayView1;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

pub const DEFAULT_EMBEDDING_DIMENSION: usize = 256;

const HASHING_MODEL_PREFIX: &str = "hashing-v1";

static SUBWORD: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"[A-Z]?[a-z]+|[A-Z]+|[0-9]+").ok());

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "def", "fn", "for", "from", "in", "is", "it",
    "of", "on", "or", "self", "that", "the", "this", "to", "with",
];

/// Source of embedding vectors.
///
/// Implementations must return one vector of length [`dimension`](Self::dimension)
/// per input text, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identifies the model; stored vectors from another model are recomputed
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingGenerationError::new("query", "empty embedding result").into())
    }
}

/// Deterministic feature-hashing embedder.
///
/// Text is split into lower-cased word and identifier sub-tokens
/// (`parseConfig`, `parse_config` → `parse`, `config`); each token adds a
/// signed unit to one of `dimension` buckets. The result is L2-normalized,
/// so texts sharing vocabulary have high cosine similarity. No model files
/// are needed; learned models plug in through [`EmbeddingProvider`].
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSION)
    }
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("{HASHING_MODEL_PREFIX}-{dimension}"),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let hash = fnv1a_64(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Text an entity is embedded from: kind, qualified name, signature, docstring
pub fn canonical_text(entity: &Entity) -> String {
    let mut text = format!("{} {}\n{}", entity.kind.as_str(), entity.qualified_name, entity.signature);
    if let Some(doc) = &entity.docstring {
        text.push('\n');
        text.push_str(doc);
    }
    text
}

pub fn text_hash(text: &str) -> String {
    content_hash(text.as_bytes())
}

/// Lower-cased word and identifier sub-tokens, without stopwords
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.unicode_words() {
        let lowered = word.to_lowercase();
        let parts: Vec<&str> = SUBWORD
            .as_ref()
            .map(|re| re.find_iter(word).map(|m| m.as_str()).collect())
            .unwrap_or_default();
        if parts.len() > 1 {
            tokens.extend(parts.iter().filter_map(|part| normalize_token(&part.to_lowercase())));
        }
        tokens.extend(normalize_token(&lowered));
    }
    tokens
}

fn normalize_token(token: &str) -> Option<String> {
    let token = token.trim_matches('_');
    if token.chars().count() < 2 || STOPWORDS.contains(&token) {
        return None;
    }
    // plural folding so `circles` and `circle` share a bucket
    let folded = match token.strip_suffix('s') {
        Some(stem) if stem.len() > 2 && !stem.ends_with('s') => stem,
        _ => token,
    };
    Some(folded.to_string())
}

#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    a.dot(&b) / (norm_a * norm_b)
}

pub(crate) fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
