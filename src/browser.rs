use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;

use crate::error::Result;
use crate::index::index::Index;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseType {
    Boolean,
}

/// Runs conjunctive (AND) boolean queries against a loaded index and records
/// the wall-clock duration of each query for benchmarking.
pub struct Browser<'a> {
    index: &'a Index,
    browse_type: BrowseType,
    last_browse: Option<Duration>,
}

impl<'a> Browser<'a> {
    pub fn new(index: &'a Index, browse_type: BrowseType) -> Self {
        Self {
            index,
            browse_type,
            last_browse: None,
        }
    }

    /// Wall-clock duration of the last `browse` call.
    pub fn get_benchmark(&self) -> Option<Duration> {
        self.last_browse
    }

    /// Splits the text on whitespace, trims, lowercases and deduplicates the
    /// tokens, then intersects the matching postings. Returns the matching
    /// docIds in ascending order; an empty token set yields no matches.
    pub fn browse(&mut self, text: &str) -> Result<Vec<u32>> {
        let mut terms: Vec<String> = text
            .split_whitespace()
            .map(|token| token.trim().to_lowercase())
            .filter(|token| !token.is_empty())
            .collect();
        terms.sort();
        terms.dedup();

        let started = Instant::now();
        let docs = match self.browse_type {
            BrowseType::Boolean => self.browse_boolean(&terms),
        };
        self.last_browse = Some(started.elapsed());
        docs
    }

    fn browse_boolean(&self, terms: &[String]) -> Result<Vec<u32>> {
        let Some((first, rest)) = terms.split_first() else {
            return Ok(Vec::new());
        };
        // A term missing from the index contributes the empty set, which
        // collapses the whole intersection.
        let mut docs: FxHashSet<u32> = self
            .index
            .get_posting_by_term(first)?
            .keys()
            .copied()
            .collect();
        for term in rest {
            if docs.is_empty() {
                break;
            }
            let posting = self.index.get_posting_by_term(term)?;
            docs.retain(|doc_id| posting.contains_key(doc_id));
        }
        let mut result: Vec<u32> = docs.into_iter().collect();
        result.sort_unstable();
        Ok(result)
    }
}
