// 🔎 Series Search
// Fuzzy title matching (0-100 score), plus keyword and category lookups.
//
// Scoring is the best of three comparisons on lowercased text:
// - full ratio: whole query vs whole title
// - partial ratio: query vs the best same-length window of the title (scaled 0.9)
// - token-sort ratio: both sides with words sorted (scaled 0.95)

use crate::db::{find_series_by_group, find_series_by_keyword, get_all_series_titles, SeriesMetadata};
use crate::error::Result;
use rusqlite::Connection;
use serde::Serialize;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

const PARTIAL_SCALE: f64 = 0.9;
const TOKEN_SCALE: f64 = 0.95;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub series_id: String,
    pub series_title: String,
    pub score: f64,
}

// ============================================================================
// FUZZY SEARCH
// ============================================================================

/// Fuzzy search over every stored series title, best matches first
pub fn fuzzy_search(conn: &Connection, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
    let titles = get_all_series_titles(conn)?;
    Ok(rank_titles(&titles, query, limit))
}

/// Rank (series_id, title) pairs against a query.
/// Ties are broken by series_id so the order is stable.
pub fn rank_titles(titles: &[(String, String)], query: &str, limit: usize) -> Vec<SearchHit> {
    let query = query.trim().to_lowercase();
    if query.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut hits: Vec<SearchHit> = titles
        .iter()
        .map(|(series_id, title)| SearchHit {
            series_id: series_id.clone(),
            series_title: title.clone(),
            score: match_score(&query, &title.to_lowercase()),
        })
        .filter(|hit| hit.score > 0.0)
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.series_id.cmp(&b.series_id))
    });
    hits.truncate(limit);
    hits
}

/// Similarity of two strings on a 0-100 scale
pub fn match_score(query: &str, title: &str) -> f64 {
    let full = ratio(query, title);
    let partial = partial_ratio(query, title) * PARTIAL_SCALE;
    let tokens = ratio(&sorted_tokens(query), &sorted_tokens(title)) * TOKEN_SCALE;

    full.max(partial).max(tokens)
}

fn ratio(s1: &str, s2: &str) -> f64 {
    let len = s1.chars().count().max(s2.chars().count());
    if len == 0 {
        return 100.0;
    }

    let distance = levenshtein_distance(s1, s2);
    (1.0 - distance as f64 / len as f64) * 100.0
}

fn partial_ratio(s1: &str, s2: &str) -> f64 {
    let (short, long): (Vec<char>, Vec<char>) = if s1.chars().count() <= s2.chars().count() {
        (s1.chars().collect(), s2.chars().collect())
    } else {
        (s2.chars().collect(), s1.chars().collect())
    };

    if short.is_empty() {
        return 0.0;
    }

    let short: String = short.into_iter().collect();
    let mut best: f64 = 0.0;

    for window in long.windows(short.chars().count()) {
        let window: String = window.iter().collect();
        best = best.max(ratio(&short, &window));
        if best >= 100.0 {
            break;
        }
    }

    best
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Minimum number of single-character edits
/// (insertions, deletions, substitutions) to turn one string into another
fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();
    let len1 = s1_chars.len();
    let len2 = s2_chars.len();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut matrix = vec![vec![0; len2 + 1]; len1 + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    for i in 1..=len1 {
        for j in 1..=len2 {
            let cost = if s1_chars[i - 1] == s2_chars[j - 1] { 0 } else { 1 };

            matrix[i][j] = std::cmp::min(
                std::cmp::min(
                    matrix[i - 1][j] + 1, // deletion
                    matrix[i][j - 1] + 1, // insertion
                ),
                matrix[i - 1][j - 1] + cost, // substitution
            );
        }
    }

    matrix[len1][len2]
}

// ============================================================================
// KEYWORD / CATEGORY
// ============================================================================

pub fn keyword_search(conn: &Connection, keyword: &str) -> Result<Vec<SeriesMetadata>> {
    if keyword.trim().is_empty() {
        return Ok(Vec::new());
    }
    find_series_by_keyword(conn, keyword)
}

pub fn category_search(conn: &Connection, group_code: &str) -> Result<Vec<SeriesMetadata>> {
    find_series_by_group(conn, group_code)
}

// ============================================================================
// TESTS
// ============================================================================
