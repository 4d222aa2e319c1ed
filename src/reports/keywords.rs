use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::Report;

/// A keyword and the number of reports carrying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCount {
    pub keyword: String,
    pub count: u64,
}

/// Most frequent report keywords.
///
/// Keywords are trimmed and case-folded; a keyword repeated within one report
/// counts once. Ordered by count descending, then keyword ascending.
pub fn trending_keywords(reports: &[Report], limit: usize) -> Vec<KeywordCount> {
    let mut counts: HashMap<String, u64> = HashMap::new();

    for report in reports {
        let distinct: BTreeSet<String> = report
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        for keyword in distinct {
            *counts.entry(keyword).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<KeywordCount> = counts
        .into_iter()
        .map(|(keyword, count)| KeywordCount { keyword, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.keyword.cmp(&b.keyword)));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::GeneratedContent;

    fn report(keywords: &[&str]) -> Report {
        Report::new(
            "v",
            GeneratedContent {
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                content: "x".to_string(),
                ai_comment: String::new(),
            },
        )
    }

    #[test]
    fn test_counts_are_case_folded_and_ranked() {
        let reports = vec![
            report(&["Good Appetite", "walk"]),
            report(&["good appetite ", "nap"]),
            report(&["walk", "nap", "Good appetite"]),
        ];

        let top = trending_keywords(&reports, 2);

        assert_eq!(
            top,
            vec![
                KeywordCount {
                    keyword: "good appetite".into(),
                    count: 3
                },
                KeywordCount {
                    keyword: "nap".into(),
                    count: 2
                },
            ]
        );
    }

    #[test]
    fn test_repeats_within_a_report_count_once() {
        let top = trending_keywords(&[report(&["walk", "Walk", " "])], 10);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].count, 1);
    }
}
