/// Estimate token count using chars/4 heuristic.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Budget cost of a text segment: chars/4 rounded up.
///
/// Summing `token_cost` over segments never undercounts
/// [`estimate_tokens`] of their concatenation.
#[must_use]
pub fn token_cost(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}
