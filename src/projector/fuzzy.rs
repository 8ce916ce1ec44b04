//! Fuzzy nickname matching.
//!
//! Query and nickname are lowercased and split on whitespace. A nickname
//! matches when some query term is within the edit budget of some nickname
//! term (or of the whole nickname), or when a nickname term starts with the
//! query term. The budget follows the usual "AUTO" fuzziness: terms of one or
//! two characters must match exactly, three to five allow one edit, longer
//! terms allow two.

/// Maximum edit distance tolerated for a term of `len` characters.
pub fn auto_fuzziness(len: usize) -> usize {
    match len {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

/// Levenshtein distance over Unicode scalar values.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Best distance at which `nickname` matches `query`, or `None`.
///
/// Prefix matches score zero.
pub fn match_distance(nickname: &str, query: &str) -> Option<usize> {
    let nickname = nickname.to_lowercase();
    let query = query.to_lowercase();

    let mut candidates: Vec<&str> = nickname.split_whitespace().collect();
    if candidates.len() > 1 {
        candidates.push(nickname.trim());
    }

    let mut best: Option<usize> = None;
    for term in query.split_whitespace() {
        let budget = auto_fuzziness(term.chars().count());
        for candidate in &candidates {
            let distance = if candidate.starts_with(term) {
                0
            } else {
                levenshtein(candidate, term)
            };
            if distance <= budget {
                best = Some(best.map_or(distance, |b| b.min(distance)));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
        assert_eq!(levenshtein("josé", "jose"), 1);
    }

    #[test]
    fn test_auto_fuzziness_bands() {
        assert_eq!(auto_fuzziness(2), 0);
        assert_eq!(auto_fuzziness(3), 1);
        assert_eq!(auto_fuzziness(5), 1);
        assert_eq!(auto_fuzziness(6), 2);
    }

    #[test]
    fn test_typo_matches() {
        assert_eq!(match_distance("Savings", "savngs"), Some(1));
        assert_eq!(match_distance("Holiday Fund", "holidya"), Some(2));
    }

    #[test]
    fn test_short_terms_need_exact_or_prefix() {
        assert_eq!(match_distance("Jo", "jo"), Some(0));
        assert_eq!(match_distance("Jo", "ja"), None);
        assert_eq!(match_distance("Joanna", "jo"), Some(0));
    }

    #[test]
    fn test_unrelated_does_not_match() {
        assert_eq!(match_distance("Savings", "checking"), None);
        assert_eq!(match_distance("Savings", ""), None);
    }
}
