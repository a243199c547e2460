//! Dictionary-level concerns: the public facade, configuration,
//! probability policy, and compaction.

pub mod config;
pub mod dict;
pub mod gc;
pub mod probability;

pub use config::DictConfig;
pub use dict::{
    BigramProperty, ChildNode, Health, PatriciaDict, ShortcutProperty, UnigramProperty,
    WordProperty,
};
pub use gc::GcStats;
pub use probability::{
    DefaultProbabilityMerger, ProbabilityMerger, MAX_PROBABILITY, NOT_A_PROBABILITY,
};
