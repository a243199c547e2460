//! Probability domain and the unigram/bigram blending policy.
//!
//! Scores are bounded integers in `0..=MAX_PROBABILITY`, with
//! [`NOT_A_PROBABILITY`] marking "no signal" (absent entries and
//! soft-removed words). The exact blending of a word's standalone score
//! with a bigram-continuation score is a policy decision, so it sits
//! behind [`ProbabilityMerger`] instead of being hard-coded into the
//! lookup path.

/// Sentinel for "no probability": absent words, soft-removed entries,
/// and do-not-suggest results.
pub const NOT_A_PROBABILITY: i32 = -1;

/// Upper bound of the probability range.
pub const MAX_PROBABILITY: i32 = 255;

/// Blends a word's unigram score with an optional bigram-continuation
/// score into one bounded output value.
pub trait ProbabilityMerger: Send + Sync {
    /// Either input may be [`NOT_A_PROBABILITY`]; the output must be in
    /// `0..=MAX_PROBABILITY` or [`NOT_A_PROBABILITY`].
    fn merge(&self, unigram_probability: i32, bigram_probability: i32) -> i32;
}

/// Default policy: a bigram signal dominates the standalone score but
/// never lowers it; without one the unigram score passes through.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProbabilityMerger;

impl ProbabilityMerger for DefaultProbabilityMerger {
    fn merge(&self, unigram_probability: i32, bigram_probability: i32) -> i32 {
        if unigram_probability == NOT_A_PROBABILITY {
            return NOT_A_PROBABILITY;
        }
        if bigram_probability == NOT_A_PROBABILITY {
            return unigram_probability.clamp(0, MAX_PROBABILITY);
        }
        unigram_probability
            .max(bigram_probability)
            .clamp(0, MAX_PROBABILITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_merger_biases_toward_the_bigram_signal() {
        let merger = DefaultProbabilityMerger;
        assert_eq!(merger.merge(80, 200), 200);
        assert_eq!(merger.merge(200, 80), 200);
        assert_eq!(merger.merge(80, NOT_A_PROBABILITY), 80);
        assert_eq!(merger.merge(NOT_A_PROBABILITY, 200), NOT_A_PROBABILITY);
        assert_eq!(merger.merge(500, 700), MAX_PROBABILITY);
    }
}
