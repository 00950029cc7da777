//! Text embeddings for semantic similarity.
//!
//! The engine only needs "text in, fixed-length vector out". A real
//! sentence-embedding model can be plugged in through [`Embedder`]; the
//! bundled [`HashingEmbedder`] is a dependency-free feature-hashing model
//! over stemmed unigrams, bigrams and character trigrams.

use std::sync::{Arc, OnceLock};

use crate::text;

/// Maps text to a fixed-length vector. Implementations are shared
/// read-only across concurrent evaluations.
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder returns.
    fn dimensions(&self) -> usize;

    /// Embed a piece of text.
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Cosine similarity in [-1, 1]; 0 when either vector is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Feature-hashing embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIMENSIONS: usize = 512;

    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn add(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let index = (hash % self.dimensions as u64) as usize;
        // The top bit picks a sign so collisions tend to cancel.
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSIONS)
    }
}

impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, input: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let words: Vec<String> = text::tokenize(input)
            .into_iter()
            .filter(|w| !text::is_stopword(w))
            .map(|w| text::stem(&w))
            .collect();

        for word in &words {
            self.add(&mut vector, &format!("w:{word}"), 1.0);
            let padded: Vec<char> = format!("<{word}>").chars().collect();
            for tri in padded.windows(3) {
                let gram: String = tri.iter().collect();
                self.add(&mut vector, &format!("c:{gram}"), 0.25);
            }
        }
        for pair in words.windows(2) {
            self.add(&mut vector, &format!("b:{} {}", pair[0], pair[1]), 0.5);
        }
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

type EmbedderInit = Box<dyn Fn() -> Arc<dyn Embedder> + Send + Sync>;

/// An embedder whose underlying model is built on first use, exactly once,
/// and then shared read-only by every caller holding this handle.
pub struct LazyEmbedder {
    cell: OnceLock<Arc<dyn Embedder>>,
    init: EmbedderInit,
    dimensions: usize,
}

impl LazyEmbedder {
    pub fn new<F>(dimensions: usize, init: F) -> Self
    where
        F: Fn() -> Arc<dyn Embedder> + Send + Sync + 'static,
    {
        Self {
            cell: OnceLock::new(),
            init: Box::new(init),
            dimensions,
        }
    }

    /// Lazily build the bundled hashing model.
    pub fn hashing() -> Self {
        Self::new(HashingEmbedder::DEFAULT_DIMENSIONS, || {
            tracing::info!(
                dimensions = HashingEmbedder::DEFAULT_DIMENSIONS,
                "loading hashing embedding model"
            );
            Arc::new(HashingEmbedder::default())
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    fn model(&self) -> &Arc<dyn Embedder> {
        self.cell.get_or_init(|| (self.init)())
    }
}

impl Embedder for LazyEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        self.model().embed(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn identical_text_has_similarity_one() {
        let e = HashingEmbedder::default();
        let a = e.embed("Photosynthesis converts light energy into chemical energy.");
        let b = e.embed("Photosynthesis converts light energy into chemical energy.");
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn related_text_beats_unrelated_text() {
        let e = HashingEmbedder::default();
        let model = e.embed("Plants use sunlight to make glucose from carbon dioxide and water.");
        let close = e.embed("Using sunlight, plants make glucose out of water and carbon dioxide.");
        let far = e.embed("The French revolution began with the storming of the Bastille.");
        assert!(cosine_similarity(&model, &close) > cosine_similarity(&model, &far));
    }

    #[test]
    fn empty_text_has_zero_similarity() {
        let e = HashingEmbedder::new(64);
        let a = e.embed("");
        assert_eq!(a.len(), 64);
        assert_eq!(cosine_similarity(&a, &e.embed("anything at all")), 0.0);
    }

    #[test]
    fn lazy_embedder_initializes_once() {
        static LOADS: AtomicU32 = AtomicU32::new(0);
        let lazy = LazyEmbedder::new(32, || {
            LOADS.fetch_add(1, Ordering::SeqCst);
            Arc::new(HashingEmbedder::new(32))
        });
        assert!(!lazy.is_loaded());
        let _ = lazy.embed("one");
        let _ = lazy.embed("two");
        assert!(lazy.is_loaded());
        assert_eq!(LOADS.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.dimensions(), 32);
    }
}
