//! 🧺 The Accumulator: one topic's basket of lines, waiting to become a poem.
//!
//! 🎬 *[a basket sits on a table. lines drop in, one by one.]*
//! *[somewhere a die was rolled. it said 7. the basket does not know this yet.]*
//!
//! ```text
//!            add_fragment()              count >= target
//!   ┌──────────────┐ ───────────▶ ┌────────────┐ ──────────▶ ┌──────────┐
//!   │ ACCUMULATING │              │  (count++) │             │ FLUSHING │
//!   └──────────────┘ ◀─────────── └────────────┘             └──────────┘
//!          ▲                                                      │
//!          └────────── reset: empty basket, fresh target ◀────────┘
//! ```
//!
//! No terminal state. The basket runs until the process dies. 🦆
//!
//! The accumulator never talks to storage itself. Flushing *produces* a [`Poem`] and
//! resets in the same breath; the owning worker stores that poem before it looks at
//! the next message, so from the outside the flush is still synchronous.

use std::collections::BTreeSet;

use anyhow::{Result, bail};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::common::{Fragment, Poem};

/// 🎲 The dice every accumulator rolls. Seedable, so tests can load them.
pub type TopicRng = ChaCha8Rng;

/// 📏 Inclusive `[min, max]` bounds for how many lines a poem gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetRange {
    min: usize,
    max: usize,
}

impl TargetRange {
    /// 🔒 Zero-line poems and backwards ranges are refused here, once, at startup.
    pub fn new(min: usize, max: usize) -> Result<Self> {
        if min == 0 {
            bail!("💀 min_lines must be at least 1. A zero-line poem is a blank page with ambitions.");
        }
        if min > max {
            bail!("💀 min_lines ({min}) is greater than max_lines ({max}). The range is inside out.");
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// 🎲 Uniform draw, both ends inclusive.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        rng.gen_range(self.min..=self.max)
    }

    pub fn contains(&self, value: usize) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// 🧺 Per-topic accumulation state.
///
/// `count` is not stored; it *is* `collected.len()`, so the two can never disagree.
#[derive(Debug)]
pub struct Accumulator<R = TopicRng> {
    topic: String,
    collected: Vec<String>,
    authors: BTreeSet<u64>,
    target: usize,
    range: TargetRange,
    rng: R,
}

impl<R: Rng> Accumulator<R> {
    /// 🏗️ A fresh basket. The first target is drawn right here, like every later one.
    pub fn new(topic: impl Into<String>, range: TargetRange, mut rng: R) -> Self {
        let target = range.draw(&mut rng);
        let topic = topic.into();
        info!("🎲 accumulator for '{topic}' starts its first cycle aiming for {target} lines");
        Self {
            topic,
            // -- grows with arrivals, the target may be far larger than any real cycle
            collected: Vec::new(),
            authors: BTreeSet::new(),
            target,
            range,
            rng,
        }
    }

    /// 📥 Drop one line into the basket.
    ///
    /// Returns the finished poem when this line completed the cycle. In that case the
    /// basket has already been emptied and a new target drawn by the time you see it.
    pub fn add_fragment(&mut self, fragment: Fragment) -> Option<Poem> {
        self.collected.push(fragment.content);
        self.authors.insert(fragment.author);
        debug!(
            "🧺 '{}' has {}/{} lines (latest from author #{})",
            self.topic,
            self.count(),
            self.target,
            fragment.author
        );
        self.flush()
    }

    /// 🚿 Complete the cycle if it is complete, otherwise do nothing.
    ///
    /// Only a non-empty basket at or past its target produces a poem, so calling this
    /// twice in a row hands out at most one.
    pub fn flush(&mut self) -> Option<Poem> {
        if self.collected.is_empty() || self.count() < self.target {
            return None;
        }
        let poem = Poem::new(
            self.topic.clone(),
            &self.collected,
            std::mem::take(&mut self.authors),
        );
        self.reset();
        Some(poem)
    }

    fn reset(&mut self) {
        self.collected.clear();
        self.authors.clear();
        self.target = self.range.draw(&mut self.rng);
        info!(
            "🔄 accumulator for '{}' reset, next poem wants {} lines",
            self.topic, self.target
        );
    }

    pub fn count(&self) -> usize {
        self.collected.len()
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn authors(&self) -> &BTreeSet<u64> {
        &self.authors
    }

    pub fn collected(&self) -> &[String] {
        &self.collected
    }
}
