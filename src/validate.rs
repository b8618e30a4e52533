//! Input normalization for todo statuses and priorities.
//!
//! Provides O(1) validation sets and synonym maps so users can type
//! natural words for statuses and priorities. Three-tier resolution:
//! exact match → synonym lookup → error with suggestion.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::model::{Priority, Status};

// ── Valid value sets (O(1) lookups) ──────────────────────────

pub static VALID_STATUSES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    ["pending", "in_progress", "completed", "cancelled"]
        .into_iter()
        .collect()
});

pub static VALID_PRIORITIES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    ["low", "medium", "high", "urgent"].into_iter().collect()
});

// ── Synonym maps ─────────────────────────────────────────────

pub static STATUS_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("done", "completed"),
        ("complete", "completed"),
        ("finished", "completed"),
        ("closed", "completed"),
        ("resolved", "completed"),
        ("wip", "in_progress"),
        ("doing", "in_progress"),
        ("active", "in_progress"),
        ("started", "in_progress"),
        ("todo", "pending"),
        ("open", "pending"),
        ("new", "pending"),
        ("canceled", "cancelled"),
        ("dropped", "cancelled"),
        ("wontfix", "cancelled"),
    ]
    .into_iter()
    .collect()
});

pub static PRIORITY_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("critical", "urgent"),
        ("crit", "urgent"),
        ("highest", "urgent"),
        ("p0", "urgent"),
        ("important", "high"),
        ("p1", "high"),
        ("normal", "medium"),
        ("default", "medium"),
        ("p2", "medium"),
        ("minor", "low"),
        ("trivial", "low"),
        ("p3", "low"),
    ]
    .into_iter()
    .collect()
});

/// Normalize a status string via exact match or synonym lookup.
///
/// Returns the canonical status, or an error with the original input
/// and an optional suggestion.
pub fn normalize_status(input: &str) -> Result<Status, (String, Option<String>)> {
    let lower = input.trim().to_lowercase().replace('-', "_");

    let canonical = if VALID_STATUSES.contains(lower.as_str()) {
        lower.as_str()
    } else if let Some(&canonical) = STATUS_SYNONYMS.get(lower.as_str()) {
        canonical
    } else {
        let suggestion = find_closest_match(&lower, &VALID_STATUSES, &STATUS_SYNONYMS);
        return Err((input.to_string(), suggestion));
    };

    match canonical {
        "pending" => Ok(Status::Pending),
        "in_progress" => Ok(Status::InProgress),
        "completed" => Ok(Status::Completed),
        _ => Ok(Status::Cancelled),
    }
}

/// Normalize a priority from a name, synonym, or P-notation (P0 = urgent).
pub fn normalize_priority(input: &str) -> Result<Priority, (String, Option<String>)> {
    let lower = input.trim().to_lowercase();

    let canonical = if VALID_PRIORITIES.contains(lower.as_str()) {
        lower.as_str()
    } else if let Some(&canonical) = PRIORITY_SYNONYMS.get(lower.as_str()) {
        canonical
    } else {
        let suggestion = find_closest_match(&lower, &VALID_PRIORITIES, &PRIORITY_SYNONYMS)
            .or_else(|| Some("Use low, medium, high, urgent or P0-P3".to_string()));
        return Err((input.to_string(), suggestion));
    };

    match canonical {
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        _ => Ok(Priority::Urgent),
    }
}

/// Find the closest matching value across valid set and synonyms.
fn find_closest_match(
    input: &str,
    valid: &HashSet<&str>,
    synonyms: &HashMap<&str, &str>,
) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;

    for &v in valid.iter().chain(synonyms.keys()) {
        let dist = levenshtein_distance(input, v);
        if dist > 3 || best.is_some_and(|(_, d)| dist >= d) {
            continue;
        }
        // For synonyms, show what it maps to
        let shown = synonyms.get(v).copied().unwrap_or(v);
        best = Some((shown, dist));
    }

    best.map(|(v, _)| v.to_string())
}

// ── Levenshtein distance ─────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let a_len = a.len();
    let b_len = b.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for i in 1..=a_len {
        curr[0] = i;
        for j in 1..=b_len {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1) // deletion
                .min(curr[j - 1] + 1) // insertion
                .min(prev[j - 1] + cost); // substitution
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Find existing IDs similar to the searched ID.
///
/// Todo IDs are long UUIDs, so a prefix match counts as similar too.
/// Returns up to `max` suggestions.
pub fn find_similar_ids(searched: &str, existing: &[String], max: usize) -> Vec<String> {
    let mut candidates: Vec<(usize, &str)> = existing
        .iter()
        .map(|id| {
            let dist = if id.starts_with(searched) {
                0
            } else {
                levenshtein_distance(searched, id)
            };
            (dist, id.as_str())
        })
        .filter(|(dist, _)| *dist <= 3)
        .collect();

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    candidates
        .into_iter()
        .take(max)
        .map(|(_, id)| id.to_string())
        .collect()
}
