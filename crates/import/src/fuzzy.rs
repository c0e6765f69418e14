use tally_core::Category;

use crate::util::levenshtein_distance;

/// Token-sort similarity on a 0–100 scale.
///
/// Both sides are lowercased, apostrophes dropped, other punctuation treated
/// as a separator, and the tokens sorted before a normalised Levenshtein
/// comparison, so word order and store-number noise matter little.
pub fn similarity(s1: &str, s2: &str) -> f32 {
    let a = sorted_tokens(s1);
    let b = sorted_tokens(s2);

    if a == b {
        return 100.0;
    }

    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 100.0;
    }

    100.0 * (1.0 - levenshtein_distance(&a, &b) as f32 / max_len as f32)
}

fn sorted_tokens(s: &str) -> String {
    let cleaned: String = s
        .to_lowercase()
        .chars()
        .filter(|c| *c != '\'' && *c != '’')
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch<'a> {
    pub name: &'a str,
    pub category: Category,
    pub score: f32,
}

/// Finds the closest known merchant name among `candidates`.
///
/// Each query string is scored against each candidate; the best score wins
/// and ties keep the earlier candidate. Returns `None` below `threshold`.
pub fn best_match<'a, I>(queries: &[&str], candidates: I, threshold: f32) -> Option<FuzzyMatch<'a>>
where
    I: IntoIterator<Item = (&'a str, Category)>,
{
    let mut best: Option<FuzzyMatch<'a>> = None;

    for (name, category) in candidates {
        let score = queries
            .iter()
            .map(|q| similarity(q, name))
            .fold(0.0f32, f32::max);
        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(FuzzyMatch { name, category, score });
        }
    }

    best.filter(|b| b.score >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_is_one_hundred() {
        assert_eq!(similarity("STARBUCKS", "starbucks"), 100.0);
        assert_eq!(similarity("", ""), 100.0);
    }

    #[test]
    fn word_order_does_not_matter() {
        assert_eq!(similarity("FOODS WHOLE", "WHOLE FOODS"), 100.0);
    }

    #[test]
    fn apostrophes_are_ignored() {
        assert_eq!(similarity("TRADER JOES", "TRADER JOE'S"), 100.0);
    }

    #[test]
    fn typo_scores_high() {
        // one edit in eleven characters
        let score = similarity("TRADR JOES", "TRADER JOE'S");
        assert!(score > 90.0, "score was {score}");
    }

    #[test]
    fn unrelated_scores_low() {
        let score = similarity("AMAZON", "STARBUCKS");
        assert!(score < 50.0, "score was {score}");
    }

    #[test]
    fn best_match_picks_highest() {
        let candidates = vec![
            ("STARBUCKS", Category::Dining),
            ("TRADER JOE'S", Category::Groceries),
        ];
        let m = best_match(&["TRADR JOES"], candidates, 85.0).unwrap();
        assert_eq!(m.name, "TRADER JOE'S");
        assert_eq!(m.category, Category::Groceries);
    }

    #[test]
    fn best_match_respects_threshold() {
        let candidates = vec![("STARBUCKS", Category::Dining)];
        assert!(best_match(&["STARBUCKS"], candidates.clone(), 85.0).is_some());
        assert!(best_match(&["STAR MARKET"], candidates, 85.0).is_none());
    }

    #[test]
    fn best_match_ties_keep_first() {
        let candidates = vec![("NETFLIX", Category::Entertainment), ("NETFLIX", Category::Shopping)];
        let m = best_match(&["NETFLIX"], candidates, 85.0).unwrap();
        assert_eq!(m.category, Category::Entertainment);
    }

    #[test]
    fn best_match_uses_best_query() {
        let candidates = vec![("BLUE BOTTLE COFFEE", Category::Dining)];
        let m = best_match(&["XYZ", "BLUE BOTTLE COFEE"], candidates, 85.0).unwrap();
        assert!(m.score > 90.0);
    }

    #[test]
    fn no_candidates_no_match() {
        assert!(best_match(&["ANYTHING"], Vec::<(&str, Category)>::new(), 0.0).is_none());
    }
}
