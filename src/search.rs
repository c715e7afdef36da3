//! Block map search
//!
//! Answers "which pages use a block with these classes?" against the block
//! map: exact matches return page URLs, and fuzzy matches rank the distinct
//! class-name combinations by similarity to the query.

use crate::model::ContentBlock;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Default number of similar combinations reported
pub const DEFAULT_TOP_K: usize = 5;

/// A class-name combination ranked against a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinationMatch {
    /// Sorted, lowercase class names joined by a space
    pub combination: String,

    /// Similarity from 0 to 100
    pub score: u32,

    /// Hash of the first block with this combination
    pub hash: String,
}

/// Result of a block map search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    pub exact_urls: Vec<String>,
    pub similar: Vec<CombinationMatch>,
}

impl fmt::Display for SearchResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Exact match (all keywords):")?;
        if self.exact_urls.is_empty() {
            writeln!(f, "(none)")?;
        }
        for url in &self.exact_urls {
            writeln!(f, "{}", url)?;
        }

        writeln!(f)?;
        writeln!(f, "Top {} similar class name combinations:", self.similar.len())?;
        if self.similar.is_empty() {
            writeln!(f, "(none)")?;
        }
        for combo in &self.similar {
            writeln!(f, "{} ({})", combo.combination, combo.score)?;
        }

        Ok(())
    }
}

/// Splits a query into lowercase tokens
pub fn tokenize_query(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// URLs of every block whose class set contains all `tokens`
///
/// URLs are returned in first-seen order without duplicates. No tokens means
/// no matches.
pub fn exact_match_urls(block_map: &BTreeMap<String, ContentBlock>, tokens: &[String]) -> Vec<String> {
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for block in block_map.values() {
        let classes: HashSet<String> = block.class_names.iter().map(|c| c.to_lowercase()).collect();
        if !tokens.iter().all(|t| classes.contains(t)) {
            continue;
        }

        for url in &block.urls {
            if seen.insert(url.as_str()) {
                urls.push(url.clone());
            }
        }
    }

    urls
}

/// Ranks the distinct class-name combinations against `query`
///
/// Returns at most `top_k` combinations, best first; ties keep block map
/// order. An empty query returns nothing.
pub fn top_similar_combinations(
    block_map: &BTreeMap<String, ContentBlock>,
    query: &str,
    top_k: usize,
) -> Vec<CombinationMatch> {
    let query = query.trim().to_lowercase();
    if query.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut matches: Vec<CombinationMatch> = Vec::new();

    for (hash, block) in block_map {
        let mut classes: Vec<String> = block
            .class_names
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        classes.sort();
        let combination = classes.join(" ");

        if combination.is_empty() || !seen.insert(combination.clone()) {
            continue;
        }

        matches.push(CombinationMatch {
            score: token_set_ratio(&query, &combination),
            combination,
            hash: hash.clone(),
        });
    }

    // Stable sort keeps block map order among equal scores
    matches.sort_by(|a, b| b.score.cmp(&a.score));
    matches.truncate(top_k);
    matches
}

/// Runs both searches for one query
pub fn search(
    block_map: &BTreeMap<String, ContentBlock>,
    query: &str,
    url_limit: usize,
    top_k: usize,
) -> SearchResults {
    let tokens = tokenize_query(query);
    let mut exact_urls = exact_match_urls(block_map, &tokens);
    if url_limit > 0 {
        exact_urls.truncate(url_limit);
    }

    SearchResults {
        exact_urls,
        similar: top_similar_combinations(block_map, query, top_k),
    }
}

/// Token-set similarity from 0 to 100
///
/// Both strings are split into token sets. The shared tokens and each side's
/// leftovers are compared pairwise and the best similarity wins, so a query
/// whose tokens are a subset of the other side scores 100.
pub fn token_set_ratio(a: &str, b: &str) -> u32 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0;
    }

    let intersection: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !intersection.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100;
    }

    let sect = intersection.join(" ");
    let combined_a = join_nonempty(&sect, &only_a.join(" "));
    let combined_b = join_nonempty(&sect, &only_b.join(" "));

    let mut best = strsim::normalized_levenshtein(&combined_a, &combined_b);
    if !sect.is_empty() {
        best = best
            .max(strsim::normalized_levenshtein(&sect, &combined_a))
            .max(strsim::normalized_levenshtein(&sect, &combined_b));
    }

    (best * 100.0).round() as u32
}

fn join_nonempty(left: &str, right: &str) -> String {
    match (left.is_empty(), right.is_empty()) {
        (true, _) => right.to_string(),
        (_, true) => left.to_string(),
        _ => format!("{} {}", left, right),
    }
}
