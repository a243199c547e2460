//! Per-terminal association lists: bigram continuations and shortcut
//! (alternate spelling) targets, each stored in its own buffer.

pub mod bigram;
pub mod shortcut;

pub use bigram::{
    add_bigram_entry, find_bigram_probability, for_each_bigram_entry, remove_all_bigram_entries,
    remove_bigram_entry, BigramAddOutcome, BigramEntry,
};
pub use shortcut::{
    add_shortcut_entry, for_each_shortcut_entry, ShortcutAddOutcome, ShortcutEntry,
};
