//! Scoring - the pure functions of the engine
//!
//! Both scorers are deterministic given their inputs and perform no I/O.
//! The importance scorer decides how strongly a fresh memory is retained;
//! the conversation scorer decides whether an exchange keeps going. They
//! share the topic detector below.

pub mod conversation;
pub mod importance;

/// Keyword lexicon for topics the simulation cares about. A topic also
/// matches when its own name appears in the text, so persona-specific topics
/// outside this table still work.
const TOPIC_LEXICON: &[(&str, &[&str])] = &[
    (
        "magic",
        &["magic", "spell", "spellbook", "wizard", "enchant", "arcane", "potion", "ritual", "rune"],
    ),
    ("gossip", &["gossip", "rumor", "rumour", "scandal", "whisper"]),
    ("travel", &["travel", "journey", "road", "voyage", "caravan", "map"]),
    ("stories", &["story", "stories", "tale", "legend", "ballad"]),
    ("local_news", &["news", "town", "market", "festival", "tavern"]),
    ("books", &["book", "books", "library", "scroll", "tome"]),
];

/// Whether `topic` is mentioned in `text_lower` (pre-lowercased), either by
/// name or through its lexicon keywords.
pub(crate) fn topic_mentioned(topic: &str, text_lower: &str) -> bool {
    if text_lower.contains(&topic.to_lowercase()) {
        return true;
    }
    TOPIC_LEXICON
        .iter()
        .find(|(name, _)| *name == topic)
        .is_some_and(|(_, keywords)| keywords.iter().any(|k| text_lower.contains(k)))
}
