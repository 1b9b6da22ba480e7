//! src/highlight.rs
//! ============================================================================
//! # Highlighter: Actionable Spans in Free Text
//!
//! Every highlight pattern scans the text on its own, left to right, yielding
//! non-overlapping matches. The per-pattern streams are merged lazily: the
//! earliest start wins, then the longer match, then the pattern registered
//! first. Matches overlapping an emitted one are dropped.
//!
//! Offsets are byte offsets into the text. Empty regex matches are never
//! reported.

use std::iter::FusedIterator;
use std::sync::Arc;

use crate::model::{ActionDescriptor, AssociationKey};
use crate::registry::{DescriptorStore, Snapshot};

/// One actionable span.
#[derive(Debug, Clone)]
pub struct Match {
    /// Byte offset of the first byte.
    pub start: usize,

    /// Length in bytes.
    pub length: usize,

    pub text: String,

    /// Name of the pattern that produced the span.
    pub pattern: String,

    /// Actions declaring `x-highlight/<pattern>`, in load order.
    pub actions: Vec<Arc<ActionDescriptor>>,
}

impl Match {
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn key(&self) -> String {
        AssociationKey::highlight(&self.pattern)
    }
}

pub struct Highlighter {
    store: Arc<DescriptorStore>,
}

impl Highlighter {
    pub fn new(store: Arc<DescriptorStore>) -> Self {
        Self { store }
    }

    /// Scan `text` against the patterns of the current snapshot. Each call
    /// starts a fresh scan.
    pub fn highlight<'t>(&self, text: &'t str) -> Highlights<'t> {
        Highlights::new(self.store.snapshot(), text)
    }
}

/// Lazy, single-pass sequence of [`Match`]es.
pub struct Highlights<'t> {
    snapshot: Arc<Snapshot>,

    text: &'t str,

    /// Next unconsumed `(start, end)` of every pattern, in registration order.
    heads: Vec<Option<(usize, usize)>>,
}

impl<'t> Highlights<'t> {
    fn new(snapshot: Arc<Snapshot>, text: &'t str) -> Self {
        let mut highlights = Self {
            heads: Vec::with_capacity(snapshot.highlights().len()),
            snapshot,
            text,
        };

        for i in 0..highlights.snapshot.highlights().len() {
            let head = highlights.find_from(i, 0);
            highlights.heads.push(head);
        }

        highlights
    }

    /// Next non-empty match of pattern `i` starting the search at `from`.
    fn find_from(&self, i: usize, mut from: usize) -> Option<(usize, usize)> {
        let regex = &self.snapshot.highlights()[i].regex;

        loop {
            if from > self.text.len() {
                return None;
            }

            let m = regex.find_at(self.text, from)?;
            if m.start() < m.end() {
                return Some((m.start(), m.end()));
            }

            // Step over the empty match, staying on a char boundary.
            from = m.end()
                + self.text[m.end()..]
                    .chars()
                    .next()
                    .map_or(1, char::len_utf8);
        }
    }

    fn best_head(&self) -> Option<(usize, usize, usize)> {
        let mut best: Option<(usize, usize, usize)> = None;

        for (i, head) in self.heads.iter().enumerate() {
            let Some((start, end)) = *head else {
                continue;
            };

            let better = match best {
                None => true,
                Some((b_start, b_end, _)) => {
                    start < b_start || (start == b_start && end - start > b_end - b_start)
                }
            };

            if better {
                best = Some((start, end, i));
            }
        }

        best
    }
}

impl Iterator for Highlights<'_> {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        let (start, end, winner) = self.best_head()?;

        // Drop every queued match overlapping the winner, the winner included.
        for i in 0..self.heads.len() {
            while let Some((s, e)) = self.heads[i] {
                if s >= end {
                    break;
                }
                self.heads[i] = self.find_from(i, e);
            }
        }

        let pattern = &self.snapshot.highlights()[winner];
        let key = pattern.key();

        Some(Match {
            start,
            length: end - start,
            text: self.text[start..end].to_string(),
            pattern: pattern.name.clone(),
            actions: self.snapshot.actions_for_keys(&[key]),
        })
    }
}

impl FusedIterator for Highlights<'_> {}
