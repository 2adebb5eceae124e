//! Fuzzy "did you mean" suggestions for misspelled option values.

use strsim::{jaro_winkler, normalized_levenshtein};

use crate::Error;

/// Minimum combined similarity for a suggestion to be offered.
const MIN_SCORE: f64 = 0.65;

/// Find the candidate closest to `input`.
///
/// Scores combine Jaro-Winkler (70%) and normalized Levenshtein (30%), the
/// former rewarding shared prefixes such as `subdiv` / `subdivide`.
pub fn closest_match<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let input = input.to_lowercase();
    let mut best: Option<(&'a str, f64)> = None;

    for &candidate in candidates {
        let lower = candidate.to_lowercase();
        let score =
            jaro_winkler(&input, &lower) * 0.7 + normalized_levenshtein(&input, &lower) * 0.3;
        if score >= MIN_SCORE && best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }

    best.map(|(c, _)| c)
}

/// Build the `InvalidInput` error for an unrecognized value of `what`.
pub fn unknown_value(what: &str, input: &str, candidates: &[&str]) -> Error {
    match closest_match(input, candidates) {
        Some(guess) => Error::InvalidInput(format!(
            "unknown {what} '{input}', did you mean '{guess}'?"
        )),
        None => Error::InvalidInput(format!(
            "unknown {what} '{input}', expected one of: {}",
            candidates.join(", ")
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SORTS: &[&str] = &["first", "most", "subdivide"];

    #[test]
    fn typos_find_their_value() {
        assert_eq!(closest_match("subdivde", SORTS), Some("subdivide"));
        assert_eq!(closest_match("mots", SORTS), Some("most"));
        assert_eq!(closest_match("FRIST", SORTS), Some("first"));
    }

    #[test]
    fn garbage_gets_no_suggestion() {
        assert_eq!(closest_match("zzzzzzzzzz", SORTS), None);
        let msg = unknown_value("sort mode", "zzzzzzzzzz", SORTS).to_string();
        assert!(msg.contains("expected one of: first, most, subdivide"));
    }

    #[test]
    fn error_message_carries_suggestion() {
        let msg = unknown_value("sort mode", "subdivde", SORTS).to_string();
        assert_eq!(
            msg,
            "Invalid input: unknown sort mode 'subdivde', did you mean 'subdivide'?"
        );
    }
}
