//! Dictionary configuration: size ceilings, entry maxima, GC thresholds.

/// Configuration for a dictionary instance.
///
/// The size ceiling is a hard bound: every buffer refuses to grow past
/// it, and mutations refuse earlier (see [`DictConfig::mutation_margin`])
/// so that compaction always has room to complete before a true overflow.
#[derive(Debug, Clone)]
pub struct DictConfig {
    /// Maximum size in bytes of the trie buffer; the bigram and shortcut
    /// buffers each use the same ceiling.
    pub max_trie_size: u32,

    /// Maximum number of live unigram entries.
    pub max_unigram_count: u32,

    /// Maximum number of live bigram entries.
    pub max_bigram_count: u32,

    /// Locale tag stored in the header, informational only.
    pub locale: String,

    /// Soft-deleted byte percentage (of the bytes in use) at which
    /// `needs_to_run_gc` starts recommending a blocking compaction.
    pub gc_garbage_percent: u8,
}

impl Default for DictConfig {
    fn default() -> Self {
        Self {
            max_trie_size: 1 << 20,
            max_unigram_count: 10_000,
            max_bigram_count: 10_000,
            locale: String::new(),
            gc_garbage_percent: 25,
        }
    }
}

impl DictConfig {
    /// A small dictionary, useful for tests and memory-constrained
    /// callers; entry maxima are scaled down along with the byte ceiling.
    pub fn small(max_trie_size: u32) -> Self {
        Self {
            max_trie_size,
            max_unigram_count: 1_000,
            max_bigram_count: 1_000,
            ..Self::default()
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Bytes held back from the ceiling: once a buffer is within this
    /// margin, mutations are refused. Kept under a tenth of the ceiling
    /// so the 90% near-limit GC signal always fires before refusal.
    pub fn mutation_margin(&self) -> u32 {
        (self.max_trie_size / 16).min(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_stays_below_the_near_limit_band() {
        for max in [1 << 12, 1 << 14, 1 << 20, 1 << 24] {
            let config = DictConfig::small(max);
            let margin = config.mutation_margin();
            assert!(margin > 0);
            // Refusal point (max - margin) must lie above the 90% mark.
            assert!((max - margin) as u64 * 10 > max as u64 * 9, "max={max}");
        }
    }
}
