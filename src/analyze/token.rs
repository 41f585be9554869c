//! Name tokenization and weighted syntactic similarity.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

fn cleanup_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-zA-Z0-9 _]").expect("valid regex"))
}

/// Split an attribute or datastorage name into tokens.
///
/// Non-alphanumeric characters other than `_` and space are stripped first.
/// A name containing a space splits on spaces; else one containing `_`
/// splits on underscores; else one containing an uppercase letter splits
/// before each uppercase letter; else the whole name is a single token.
/// Empty tokens are dropped.
pub fn split_tokens(name: &str) -> Vec<String> {
    let cleaned = cleanup_pattern().replace_all(name, "");
    if cleaned.contains(' ') {
        return cleaned
            .split(' ')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
    }
    if cleaned.contains('_') {
        return cleaned
            .split('_')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
    }
    if cleaned.chars().any(char::is_uppercase) {
        let mut tokens = Vec::new();
        let mut current = String::new();
        for (i, c) in cleaned.chars().enumerate() {
            if c.is_uppercase() && i > 0 && !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            current.push(c);
        }
        if !current.is_empty() {
            tokens.push(current);
        }
        return tokens;
    }
    if cleaned.is_empty() {
        Vec::new()
    } else {
        vec![cleaned.into_owned()]
    }
}

/// Normalized edit ratio in [0, 1] between two tokens.
pub fn edit_ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Inverse-frequency token weights over the full staged vocabulary:
/// `w(t) = ln(total_count / count(t))`.
#[derive(Debug, Clone, Default)]
pub struct TokenWeights {
    weights: HashMap<String, f64>,
}

impl TokenWeights {
    /// Derive weights from raw token counts.
    pub fn from_counts(counts: &HashMap<String, u64>) -> Self {
        let total: u64 = counts.values().sum();
        let mut weights = HashMap::with_capacity(counts.len());
        for (token, &count) in counts {
            let weight = (total as f64 / count as f64).ln();
            weights.insert(token.clone(), weight);
        }
        TokenWeights { weights }
    }

    /// Weight of a token; unknown tokens weigh nothing.
    pub fn weight(&self, token: &str) -> f64 {
        self.weights.get(token).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Greedy weighted best-match similarity between two token lists.
///
/// Repeatedly picks the parent/child token pair with the highest edit ratio,
/// consuming the child token on use; parent tokens left without child
/// partners contribute a score of zero. Each contribution is weighted by the
/// parent token's weight; the result is normalized by the sum of used
/// weights. Returns 0 when the parent side is empty or carries no weight.
pub fn weighted_similarity(
    parent_tokens: &[String],
    child_tokens: &[String],
    weights: &TokenWeights,
) -> f64 {
    let mut parents: Vec<&String> = parent_tokens.iter().collect();
    let mut children: Vec<&String> = child_tokens.iter().collect();
    let mut sum_scores = 0.0;
    let mut sum_weights = 0.0;

    while !parents.is_empty() {
        let mut max_score = 0.0_f64;
        let mut selected_parent = 0;
        let mut selected_child: Option<usize> = None;

        if children.is_empty() {
            // Remaining parent tokens have nothing to match against.
            selected_parent = 0;
        } else {
            for (pi, parent) in parents.iter().enumerate() {
                let (ci, score) = children
                    .iter()
                    .enumerate()
                    .map(|(ci, child)| (ci, edit_ratio(parent, child)))
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                    .expect("children non-empty");
                if score >= max_score {
                    max_score = score;
                    selected_parent = pi;
                    selected_child = Some(ci);
                }
            }
        }

        let weight = weights.weight(parents[selected_parent]);
        sum_scores += max_score * weight;
        sum_weights += weight;
        parents.remove(selected_parent);
        if let Some(ci) = selected_child {
            children.remove(ci);
        }
    }

    if sum_weights > 0.0 {
        sum_scores / sum_weights
    } else {
        0.0
    }
}
