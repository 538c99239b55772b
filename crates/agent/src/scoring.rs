//! Deterministic capability scoring.
//!
//! Scores how well each roster member's declared purpose matches a task by
//! keyword overlap. Pure and repeatable, so it works in tests and as a
//! routing fallback when the model's own routing produced nothing usable.

use std::collections::HashSet;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "for", "from", "how", "i", "in",
    "is", "it", "me", "my", "of", "on", "or", "please", "that", "the", "this", "to", "what",
    "when", "where", "which", "who", "why", "with", "you", "your",
];

/// One roster member's score for a task.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityScore {
    pub agent_id: String,
    /// Fraction of task keywords found in the agent's purpose, in `[0, 1]`
    pub score: f32,
    pub matched: Vec<String>,
}

/// Lowercased keywords with stop words and one-letter tokens removed.
pub fn keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 1 && !STOP_WORDS.contains(&w.as_str()))
        .map(|w| stem(&w))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Crude suffix stripping so "searching" matches "search".
fn stem(word: &str) -> String {
    for suffix in ["ing", "ers", "er", "es", "s"] {
        if let Some(root) = word.strip_suffix(suffix) {
            if root.chars().count() >= 3 {
                return root.to_string();
            }
        }
    }
    word.to_string()
}

/// Score every `(agent_id, purpose)` pair against `task`.
///
/// Results are sorted by descending score; ties keep roster order.
pub fn score_roster<'a, I>(task: &str, roster: I) -> Vec<CapabilityScore>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let task_words = keywords(task);

    let mut scores: Vec<CapabilityScore> = roster
        .into_iter()
        .map(|(agent_id, purpose)| {
            let purpose_words: HashSet<String> = keywords(purpose).into_iter().collect();
            let matched: Vec<String> = task_words
                .iter()
                .filter(|w| purpose_words.contains(*w))
                .cloned()
                .collect();
            let score = if task_words.is_empty() {
                0.0
            } else {
                matched.len() as f32 / task_words.len() as f32
            };
            CapabilityScore {
                agent_id: agent_id.to_string(),
                score,
                matched,
            }
        })
        .collect();

    // Stable sort keeps roster order for ties
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    scores
}

/// The best-matching agent, if any scored above zero.
pub fn best_match<'a, I>(task: &str, roster: I) -> Option<CapabilityScore>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    score_roster(task, roster)
        .into_iter()
        .next()
        .filter(|s| s.score > 0.0)
}
