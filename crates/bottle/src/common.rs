//! 📦 Common data structures, the building blocks of bottle.
//!
//! 🎬 COLD OPEN: INT. MESSAGE QUEUE, 3:47 AM
//!
//! A sentence arrives. Alone. Twelve words long, written by author #7 about Nature.
//! It has no idea it will become line four of a poem nobody asked for.
//! Neither do we. That's the beauty of it. 🦆
//!
//! This module holds the two things that travel through the pipeline:
//! - [`Fragment`]: one line, one author, one topic. Decoded from a broker payload.
//! - [`Poem`]: what comes out the other end when a topic's accumulator fills up.

use std::collections::BTreeSet;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::topics::TopicRegistry;

/// 🧵 The glue between lines. One newline, no trailing newline. Poets hate trailing whitespace.
pub const LINE_SEPARATOR: &str = "\n";

/// 🎯 A single submitted line of poetry.
///
/// Decoded once per delivery attempt, never mutated afterwards.
/// `deny_unknown_fields` because a payload with surprise fields is a payload
/// from a producer we don't understand, and we fail fast on those.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fragment {
    /// 🔢 Who wrote it. Must be > 0.
    pub author: u64,
    /// 📝 The line itself.
    pub content: String,
    /// 🏷️ Which topic it belongs to.
    pub topic: String,
}

impl Fragment {
    pub fn new(author: u64, content: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            author,
            content: content.into(),
            topic: topic.into(),
        }
    }

    /// 📥 Decode and validate a raw broker payload.
    ///
    /// Fails when the bytes are not a JSON object with exactly `author`, `content`
    /// and `topic`, when `author` is zero, when `content` is blank, or when `topic`
    /// is not one of the topics the registry knows about.
    ///
    /// Whether the topic is the *right* topic for the queue it arrived on is the
    /// worker's business, not ours.
    pub fn from_payload(payload: &[u8], registry: &TopicRegistry) -> Result<Self> {
        let fragment: Fragment = serde_json::from_slice(payload).context(
            "💀 The payload is not a fragment. We expected {author, content, topic} \
             and got something else entirely. Modern art, maybe.",
        )?;
        fragment.validate(registry)?;
        Ok(fragment)
    }

    fn validate(&self, registry: &TopicRegistry) -> Result<()> {
        if self.author == 0 {
            bail!("💀 Fragment author must be a positive integer, got 0. Anonymous poets need not apply.");
        }
        if self.content.trim().is_empty() {
            bail!("💀 Fragment content is empty. A poem of silence is still not a poem.");
        }
        if registry.route(&self.topic).is_none() {
            bail!(
                "💀 Fragment topic '{}' is not one of the known topics {:?}",
                self.topic,
                registry.topic_names().collect::<Vec<_>>()
            );
        }
        Ok(())
    }
}

/// 📜 A finished poem: every line of one completed cycle, plus who wrote them.
///
/// Built exactly once per cycle by the accumulator, then handed to the sink by value.
/// The core keeps no reference afterwards. History lives in storage, not in RAM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Poem {
    pub topic: String,
    /// 🧵 Lines joined with [`LINE_SEPARATOR`], in arrival order.
    pub content: String,
    /// 👥 Deduplicated contributors. Sorted, because a set has no favourite child.
    pub authors: BTreeSet<u64>,
    /// 📏 How many lines went in. `content.lines().count()` lies when a line has a `\n` in it.
    pub line_count: usize,
    pub created_at: DateTime<Utc>,
}

impl Poem {
    pub fn new(topic: impl Into<String>, lines: &[String], authors: BTreeSet<u64>) -> Self {
        Self {
            topic: topic.into(),
            content: lines.join(LINE_SEPARATOR),
            authors,
            line_count: lines.len(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::TopicRegistry;

    fn registry() -> TopicRegistry {
        TopicRegistry::default_topics()
    }

    #[test]
    fn the_one_where_a_well_formed_payload_becomes_a_fragment() -> Result<()> {
        let payload = br#"{"author":7,"content":"the fern unfurls","topic":"Nature"}"#;
        let fragment = Fragment::from_payload(payload, &registry())?;
        assert_eq!(fragment, Fragment::new(7, "the fern unfurls", "Nature"));
        Ok(())
    }

    #[test]
    fn the_one_where_empty_content_is_turned_away_at_the_door() {
        let payload = br#"{"author":1,"content":"","topic":"Nature"}"#;
        assert!(Fragment::from_payload(payload, &registry()).is_err());
        let blank = br#"{"author":1,"content":"   ","topic":"Nature"}"#;
        assert!(Fragment::from_payload(blank, &registry()).is_err());
    }

    #[test]
    fn the_one_where_author_zero_and_negative_authors_are_rejected() {
        let zero = br#"{"author":0,"content":"hi","topic":"Love"}"#;
        let negative = br#"{"author":-3,"content":"hi","topic":"Love"}"#;
        assert!(Fragment::from_payload(zero, &registry()).is_err());
        assert!(Fragment::from_payload(negative, &registry()).is_err());
    }

    #[test]
    fn the_one_where_missing_unknown_and_garbage_fields_fail_fast() {
        let missing = br#"{"author":1,"topic":"Love"}"#;
        let unknown = br#"{"author":1,"content":"hi","topic":"Love","mood":"sad"}"#;
        let garbage = b"definitely not json";
        let unknown_topic = br#"{"author":1,"content":"hi","topic":"Taxes"}"#;
        for payload in [&missing[..], &unknown[..], &garbage[..], &unknown_topic[..]] {
            assert!(
                Fragment::from_payload(payload, &registry()).is_err(),
                "payload {:?} should not decode",
                String::from_utf8_lossy(payload)
            );
        }
    }

    #[test]
    fn the_one_where_a_poem_joins_lines_without_a_trailing_newline() {
        let lines = vec!["roses".to_string(), "violets".to_string()];
        let poem = Poem::new("Love", &lines, BTreeSet::from([2, 1]));
        assert_eq!(poem.content, "roses\nviolets");
        assert_eq!(poem.line_count, 2);
        assert_eq!(poem.authors.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }
}
