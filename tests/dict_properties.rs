//! Behavioral tests of the in-memory dictionary: prefix sharing, lookup,
//! counters, bigrams, shortcuts, enumeration, and capacity refusal.

use patricia_dict::{
    to_code_points, BigramProperty, DictConfig, DictError, PatriciaDict, Result,
    ShortcutProperty, UnigramProperty, NOT_A_PROBABILITY,
};

fn dict() -> Result<PatriciaDict> {
    PatriciaDict::new(DictConfig::default().with_locale("en"))
}

fn add(dict: &PatriciaDict, word: &str, probability: i32) -> Result<()> {
    dict.add_unigram_entry(&to_code_points(word), &UnigramProperty::new(probability))
}

fn lookup(dict: &PatriciaDict, word: &str) -> Option<u32> {
    dict.terminal_position_of_word(&to_code_points(word), false)
        .expect("lookup")
}

#[test]
fn divergent_words_share_a_prefix_node() -> Result<()> {
    let dict = dict()?;
    add(&dict, "cat", 120)?;
    add(&dict, "car", 100)?;

    assert!(lookup(&dict, "cat").is_some());
    assert!(lookup(&dict, "car").is_some());
    // The shared prefix is structural, not a word.
    assert_eq!(lookup(&dict, "ca"), None);
    assert_eq!(dict.unigram_count(), 2);

    // Root holds exactly one child spelling "ca", itself not terminal.
    let roots = dict.all_child_nodes(None)?;
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].code_points, to_code_points("ca"));
    assert!(!roots[0].is_terminal);

    let children = dict.all_child_nodes(Some(roots[0].position))?;
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|c| c.is_terminal));
    Ok(())
}

#[test]
fn adding_an_existing_word_updates_in_place() -> Result<()> {
    let dict = dict()?;
    add(&dict, "run", 80)?;
    add(&dict, "run", 95)?;
    assert_eq!(dict.unigram_count(), 1);
    let pos = lookup(&dict, "run").expect("run stored");
    assert_eq!(dict.probability_of_pt_node(None, pos)?, 95);
    Ok(())
}

#[test]
fn prefix_of_a_stored_word_can_become_a_word() -> Result<()> {
    let dict = dict()?;
    add(&dict, "inside", 30)?;
    add(&dict, "in", 50)?;
    add(&dict, "inn", 40)?;
    for (word, prob) in [("in", 50), ("inn", 40), ("inside", 30)] {
        let pos = lookup(&dict, word).unwrap_or_else(|| panic!("{word} missing"));
        assert_eq!(dict.probability_of_pt_node(None, pos)?, prob, "{word}");
    }
    assert_eq!(dict.unigram_count(), 3);
    Ok(())
}

#[test]
fn bigram_raises_the_continuation_probability() -> Result<()> {
    let dict = dict()?;
    add(&dict, "run", 80)?;
    add(&dict, "fast", 90)?;
    assert!(dict.add_ngram_entry(
        &to_code_points("run"),
        &BigramProperty {
            code_points: to_code_points("fast"),
            probability: 200,
        },
    )?);
    assert_eq!(dict.bigram_count(), 1);

    let run_pos = lookup(&dict, "run").expect("run");
    let fast_pos = lookup(&dict, "fast").expect("fast");
    assert_eq!(dict.probability_of_pt_node(None, fast_pos)?, 90);
    assert_eq!(dict.probability_of_pt_node(Some(run_pos), fast_pos)?, 200);

    let mut seen = Vec::new();
    dict.iterate_ngram_entries(run_pos, |target_pos, probability| {
        seen.push((target_pos, probability));
    })?;
    assert_eq!(seen, vec![(fast_pos, 200)]);

    // Duplicate target updates in place without growing the count.
    assert!(dict.add_ngram_entry(
        &to_code_points("run"),
        &BigramProperty {
            code_points: to_code_points("fast"),
            probability: 210,
        },
    )?);
    assert_eq!(dict.bigram_count(), 1);
    assert_eq!(dict.probability_of_pt_node(Some(run_pos), fast_pos)?, 210);
    Ok(())
}

#[test]
fn ngram_entries_require_both_words() -> Result<()> {
    let dict = dict()?;
    add(&dict, "run", 80)?;
    let added = dict.add_ngram_entry(
        &to_code_points("run"),
        &BigramProperty {
            code_points: to_code_points("missing"),
            probability: 100,
        },
    )?;
    assert!(!added);
    assert_eq!(dict.bigram_count(), 0);
    Ok(())
}

#[test]
fn removed_word_stops_resolving_but_siblings_survive() -> Result<()> {
    let dict = dict()?;
    add(&dict, "cat", 120)?;
    add(&dict, "car", 100)?;
    assert!(dict.remove_unigram_entry(&to_code_points("cat"))?);
    assert!(!dict.remove_unigram_entry(&to_code_points("cat"))?);

    assert_eq!(lookup(&dict, "cat"), None);
    assert!(lookup(&dict, "car").is_some());
    assert_eq!(dict.unigram_count(), 1);

    // Re-adding revives the word.
    add(&dict, "cat", 90)?;
    assert_eq!(dict.unigram_count(), 2);
    let pos = lookup(&dict, "cat").expect("revived");
    assert_eq!(dict.probability_of_pt_node(None, pos)?, 90);
    Ok(())
}

#[test]
fn removing_a_word_drops_its_outgoing_bigrams() -> Result<()> {
    let dict = dict()?;
    add(&dict, "run", 80)?;
    add(&dict, "fast", 90)?;
    add(&dict, "slow", 70)?;
    for target in ["fast", "slow"] {
        dict.add_ngram_entry(
            &to_code_points("run"),
            &BigramProperty {
                code_points: to_code_points(target),
                probability: 150,
            },
        )?;
    }
    assert_eq!(dict.bigram_count(), 2);
    dict.remove_unigram_entry(&to_code_points("run"))?;
    assert_eq!(dict.bigram_count(), 0);
    Ok(())
}

#[test]
fn remove_ngram_entry_is_exact() -> Result<()> {
    let dict = dict()?;
    add(&dict, "run", 80)?;
    add(&dict, "fast", 90)?;
    dict.add_ngram_entry(
        &to_code_points("run"),
        &BigramProperty {
            code_points: to_code_points("fast"),
            probability: 150,
        },
    )?;
    assert!(!dict.remove_ngram_entry(&to_code_points("fast"), &to_code_points("run"))?);
    assert!(dict.remove_ngram_entry(&to_code_points("run"), &to_code_points("fast"))?);
    assert!(!dict.remove_ngram_entry(&to_code_points("run"), &to_code_points("fast"))?);
    assert_eq!(dict.bigram_count(), 0);
    Ok(())
}

#[test]
fn shortcuts_are_attached_to_the_terminal() -> Result<()> {
    let dict = dict()?;
    let mut property = UnigramProperty::new(120);
    property.shortcuts.push(ShortcutProperty {
        code_points: to_code_points("you"),
        probability: 140,
        is_whitelist: false,
    });
    property.shortcuts.push(ShortcutProperty {
        code_points: to_code_points("your"),
        probability: 90,
        is_whitelist: true,
    });
    dict.add_unigram_entry(&to_code_points("u"), &property)?;

    let pos = lookup(&dict, "u").expect("u stored");
    assert!(dict.shortcut_position_of_pt_node(pos)?.is_some());
    let mut seen = Vec::new();
    dict.iterate_shortcut_entries(pos, |cps, probability, whitelist| {
        seen.push((cps.to_vec(), probability, whitelist));
    })?;
    assert_eq!(
        seen,
        vec![
            (to_code_points("you"), 140, false),
            (to_code_points("your"), 90, true),
        ]
    );
    Ok(())
}

#[test]
fn blacklisted_and_not_a_word_entries_score_nothing() -> Result<()> {
    let dict = dict()?;
    let mut blacklisted = UnigramProperty::new(120);
    blacklisted.is_blacklisted = true;
    dict.add_unigram_entry(&to_code_points("darn"), &blacklisted)?;
    let mut not_a_word = UnigramProperty::new(120);
    not_a_word.is_not_a_word = true;
    dict.add_unigram_entry(&to_code_points("ims"), &not_a_word)?;

    for word in ["darn", "ims"] {
        let pos = lookup(&dict, word).expect("stored");
        assert_eq!(dict.probability_of_pt_node(None, pos)?, NOT_A_PROBABILITY);
    }
    let property = dict
        .get_word_property(&to_code_points("darn"))?
        .expect("property");
    assert!(property.is_blacklisted);
    assert!(!property.is_not_a_word);
    Ok(())
}

#[test]
fn lowercase_fallback_is_opt_in() -> Result<()> {
    let dict = dict()?;
    add(&dict, "hello", 100)?;
    assert!(dict
        .terminal_position_of_word(&to_code_points("Hello"), false)?
        .is_none());
    assert!(dict
        .terminal_position_of_word(&to_code_points("Hello"), true)?
        .is_some());
    // An exact-case entry always wins over folding.
    add(&dict, "Paris", 110)?;
    let pos = dict
        .terminal_position_of_word(&to_code_points("Paris"), true)?
        .expect("Paris");
    assert_eq!(dict.probability_of_pt_node(None, pos)?, 110);
    Ok(())
}

#[test]
fn reconstructs_words_from_terminal_positions() -> Result<()> {
    let dict = dict()?;
    for (word, prob) in [("cat", 120), ("car", 100), ("dog", 90)] {
        add(&dict, word, prob)?;
    }
    for (word, prob) in [("cat", 120), ("car", 100), ("dog", 90)] {
        let pos = lookup(&dict, word).expect("stored");
        let (cps, probability) = dict
            .get_code_points_and_probability(pos, 48)?
            .expect("reconstructed");
        assert_eq!(cps, to_code_points(word), "{word}");
        assert_eq!(probability, prob, "{word}");
    }
    // A too-small bound is an error, never a silent truncation.
    let pos = lookup(&dict, "cat").expect("cat");
    assert!(matches!(
        dict.get_code_points_and_probability(pos, 2),
        Err(DictError::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn enumeration_visits_every_live_word_once() -> Result<()> {
    let dict = dict()?;
    let words = ["cat", "car", "ca", "dog", "do", "done"];
    for word in words {
        add(&dict, word, 50)?;
    }
    dict.remove_unigram_entry(&to_code_points("do"))?;

    let mut seen = Vec::new();
    let mut token = 0;
    loop {
        let (word, next) = dict.get_next_word_and_next_token(token)?;
        match word {
            Some(cps) => seen.push(patricia_dict::from_code_points(&cps)),
            None => break,
        }
        if next == 0 {
            break;
        }
        token = next;
    }
    let mut expected: Vec<String> = words
        .iter()
        .filter(|w| **w != "do")
        .map(|w| w.to_string())
        .collect();
    expected.sort();
    seen.sort();
    assert_eq!(seen, expected);
    Ok(())
}

#[test]
fn enumeration_resnapshots_after_a_mutation() -> Result<()> {
    let dict = dict()?;
    add(&dict, "ant", 50)?;
    add(&dict, "bee", 50)?;
    add(&dict, "cow", 50)?;

    let (first, token) = dict.get_next_word_and_next_token(0)?;
    assert_eq!(first, Some(to_code_points("ant")));
    assert_eq!(token, 1);

    // Removing a word mid-pass invalidates the snapshot; the next call
    // indexes into the rebuilt one, so the shortened pass ends here
    // instead of carrying a token for the dropped word.
    dict.remove_unigram_entry(&to_code_points("cow"))?;
    let (second, token) = dict.get_next_word_and_next_token(token)?;
    assert_eq!(second, Some(to_code_points("bee")));
    assert_eq!(token, 0);

    // A fresh pass after another mutation sees the new live set.
    add(&dict, "doe", 50)?;
    let mut seen = Vec::new();
    let mut token = 0;
    loop {
        let (word, next) = dict.get_next_word_and_next_token(token)?;
        match word {
            Some(cps) => seen.push(patricia_dict::from_code_points(&cps)),
            None => break,
        }
        if next == 0 {
            break;
        }
        token = next;
    }
    seen.sort();
    assert_eq!(seen, ["ant", "bee", "doe"]);
    Ok(())
}

#[test]
fn word_property_resolves_bigram_targets() -> Result<()> {
    let dict = dict()?;
    add(&dict, "run", 80)?;
    add(&dict, "fast", 90)?;
    dict.add_ngram_entry(
        &to_code_points("run"),
        &BigramProperty {
            code_points: to_code_points("fast"),
            probability: 150,
        },
    )?;
    let property = dict
        .get_word_property(&to_code_points("run"))?
        .expect("run stored");
    assert_eq!(property.probability, 80);
    assert_eq!(property.bigrams.len(), 1);
    assert_eq!(property.bigrams[0].code_points, to_code_points("fast"));
    assert_eq!(property.bigrams[0].probability, 150);
    assert!(dict.get_word_property(&to_code_points("nope"))?.is_none());
    Ok(())
}

#[test]
fn reports_counters_through_get_property() -> Result<()> {
    let dict = dict()?;
    add(&dict, "cat", 120)?;
    add(&dict, "car", 100)?;
    assert_eq!(dict.get_property("UNIGRAM_COUNT"), "2");
    assert_eq!(dict.get_property("BIGRAM_COUNT"), "0");
    assert_eq!(dict.get_property("MAX_UNIGRAM_COUNT"), "10000");
    assert_eq!(dict.get_property("NO_SUCH_QUERY"), "");
    Ok(())
}

#[test]
fn rejects_invalid_arguments() -> Result<()> {
    let dict = dict()?;
    assert!(matches!(
        dict.add_unigram_entry(&[], &UnigramProperty::new(50)),
        Err(DictError::InvalidArgument(_))
    ));
    assert!(matches!(
        add(&dict, "word", 300),
        Err(DictError::InvalidArgument(_))
    ));
    let long = "a".repeat(49);
    assert!(matches!(
        add(&dict, &long, 50),
        Err(DictError::InvalidArgument(_))
    ));
    assert_eq!(dict.unigram_count(), 0);
    Ok(())
}

#[test]
fn gc_is_recommended_before_mutations_are_refused() -> Result<()> {
    let dict = PatriciaDict::new(DictConfig::small(1 << 12))?;
    let mut refused = None;
    for i in 0..1000u32 {
        let word = format!("word{i:04}");
        match add(&dict, &word, 50) {
            Ok(()) => {}
            Err(e) => {
                refused = Some(e);
                break;
            }
        }
    }
    let err = refused.expect("a 4 KiB dictionary must fill up");
    assert!(matches!(err, DictError::CapacityExceeded(_)));
    // The near-limit signal must already have fired when refusal starts.
    assert!(dict.needs_to_run_gc(true));
    assert!(!dict.is_corrupted());
    // Reads still work at capacity.
    assert!(lookup(&dict, "word0000").is_some());
    Ok(())
}

#[test]
fn garbage_ratio_recommends_gc_only_when_blocking_is_acceptable() -> Result<()> {
    let dict = PatriciaDict::new(DictConfig::small(1 << 14))?;
    for i in 0..40u32 {
        add(&dict, &format!("word{i:02}"), 50)?;
    }
    assert!(!dict.needs_to_run_gc(false));
    for i in 0..30u32 {
        dict.remove_unigram_entry(&to_code_points(&format!("word{i:02}")))?;
    }
    assert!(dict.needs_to_run_gc(false));
    assert!(!dict.needs_to_run_gc(true));
    Ok(())
}
