//! Set-based text similarity for duplicate suppression.

use std::collections::HashSet;

/// Jaccard index over trimmed, lower-cased line sets.
///
/// Blank lines are ignored. Two empty texts compare as 1.0: no visible change
/// is the strongest possible reason not to re-run recognition.
pub fn text_similarity(a: &[String], b: &[String]) -> f64 {
    let set_a = line_set(a);
    let set_b = line_set(b);

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

fn line_set(lines: &[String]) -> HashSet<String> {
    lines
        .iter()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty())
        .collect()
}
