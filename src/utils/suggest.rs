//! Edit-distance suggestions for unresolved names.
//!
//! Resolution of event kinds and target methods is always exact. These helpers only
//! decorate the resulting errors with the closest known names.

/// Maximum edit distance to consider a name as a valid suggestion.
const MAX_EDIT_DISTANCE: usize = 3;

/// Names shorter than this produce no suggestions.
const MIN_NAME_LENGTH: usize = 2;

/// Most suggestions returned by [`similar_names`].
const MAX_SUGGESTIONS: usize = 3;

/// Levenshtein distance between `a` and `b`, counted in characters.
///
/// # Examples
///
/// ```rust
/// use ilweave::utils::suggest::levenshtein;
///
/// assert_eq!(levenshtein("Spawned", "Spawn"), 2);
/// assert_eq!(levenshtein("Hurt", "Hurt"), 0);
/// ```
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    if a == b {
        return 0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Threshold scaled by the longer of the two names.
fn threshold(a: &str, b: &str) -> usize {
    let (a, b) = (a.chars().count(), b.chars().count());
    if a.abs_diff(b) > MAX_EDIT_DISTANCE {
        return 1;
    }
    match a.max(b) {
        0..=4 => 1,
        5..=7 => 2,
        _ => MAX_EDIT_DISTANCE,
    }
}

/// Up to three names from `candidates` close to `name`, closest first and then
/// alphabetically. Exact matches are not suggestions.
#[must_use]
pub fn similar_names<'a, I>(name: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    if name.chars().count() < MIN_NAME_LENGTH {
        return Vec::new();
    }
    let mut scored: Vec<(usize, &str)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let distance = levenshtein(name, candidate);
            (distance > 0 && distance <= threshold(name, candidate)).then_some((distance, candidate))
        })
        .collect();
    scored.sort_unstable();
    scored.dedup();
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, candidate)| candidate.to_string())
        .collect()
}
