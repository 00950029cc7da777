//! Per-student totals and ranking.

use std::collections::BTreeMap;

use crate::groups::ResolvedQuestion;
use crate::model::StudentTotal;

/// Totals are compared at this many steps per mark when ranking.
const TIE_SCALE: f64 = 1e6;

/// Ranking key: totals equal to six decimal places share a key.
fn tie_key(total_marks: f64) -> i64 {
    (total_marks * TIE_SCALE).round() as i64
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    let snapped = (value * 1e9).round() / 1e9;
    (snapped * 10.0).round() / 10.0
}

/// Sums resolved marks per student and ranks students.
#[derive(Debug, Default)]
pub struct SubmissionAggregator {
    sums: BTreeMap<String, (f64, f64)>,
}

impl SubmissionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one resolved question for a student.
    pub fn add(&mut self, student_name: &str, question: &ResolvedQuestion) {
        let entry = self.sums.entry(student_name.to_string()).or_default();
        entry.0 += question.marks;
        entry.1 += question.max_marks;
    }

    pub fn add_all<'a>(
        &mut self,
        student_name: &str,
        questions: impl IntoIterator<Item = &'a ResolvedQuestion>,
    ) {
        // Register students with no questions so they still get a row.
        self.sums.entry(student_name.to_string()).or_default();
        for question in questions {
            self.add(student_name, question);
        }
    }

    /// Totals ranked by marks descending.
    ///
    /// Equal totals share a rank and the next rank skips (1, 2, 2, 4); tied
    /// students are listed alphabetically.
    pub fn finish(self) -> Vec<StudentTotal> {
        let mut totals: Vec<StudentTotal> = self
            .sums
            .into_iter()
            .map(|(student_name, (total_marks, total_possible_marks))| StudentTotal {
                percentage: if total_possible_marks > 0.0 {
                    round1(total_marks / total_possible_marks * 100.0)
                } else {
                    0.0
                },
                student_name,
                total_marks,
                total_possible_marks,
                rank: 0,
            })
            .collect();

        totals.sort_by(|a, b| {
            tie_key(b.total_marks)
                .cmp(&tie_key(a.total_marks))
                .then_with(|| a.student_name.cmp(&b.student_name))
        });

        let mut previous: Option<(i64, u32)> = None;
        for (i, total) in totals.iter_mut().enumerate() {
            let key = tie_key(total.total_marks);
            let rank = match previous {
                Some((previous_key, rank)) if previous_key == key => rank,
                _ => i as u32 + 1,
            };
            total.rank = rank;
            previous = Some((key, rank));
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(main: u32, marks: f64, max: f64) -> ResolvedQuestion {
        ResolvedQuestion {
            main_question_number: main,
            marks,
            max_marks: max,
            slots: Vec::new(),
        }
    }

    #[test]
    fn sums_and_percentage() {
        let mut agg = SubmissionAggregator::new();
        agg.add_all("alice", &[question(1, 7.0, 10.0), question(2, 4.5, 5.0)]);
        let totals = agg.finish();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].total_marks, 11.5);
        assert_eq!(totals[0].total_possible_marks, 15.0);
        assert_eq!(totals[0].percentage, 76.7);
        assert_eq!(totals[0].rank, 1);
    }

    #[test]
    fn zero_possible_gives_zero_percent() {
        let mut agg = SubmissionAggregator::new();
        agg.add_all("empty", &[]);
        let totals = agg.finish();
        assert_eq!(totals[0].percentage, 0.0);
        assert_eq!(totals[0].total_possible_marks, 0.0);
    }

    #[test]
    fn competition_ranking_with_alphabetical_ties() {
        let mut agg = SubmissionAggregator::new();
        agg.add("dave", &question(1, 5.0, 10.0));
        agg.add("carol", &question(1, 8.0, 10.0));
        agg.add("bob", &question(1, 8.0, 10.0));
        agg.add("alice", &question(1, 9.0, 10.0));
        let totals = agg.finish();
        let order: Vec<(&str, u32)> = totals
            .iter()
            .map(|t| (t.student_name.as_str(), t.rank))
            .collect();
        assert_eq!(
            order,
            vec![("alice", 1), ("bob", 2), ("carol", 2), ("dave", 4)]
        );
    }

    #[test]
    fn float_noise_does_not_split_a_tie() {
        let mut agg = SubmissionAggregator::new();
        // 0.1 + 0.2 != 0.3 in binary floating point.
        agg.add("erin", &question(1, 0.1, 5.0));
        agg.add("erin", &question(2, 0.2, 5.0));
        agg.add("dan", &question(1, 0.3, 10.0));
        agg.add("cleo", &question(1, 0.300_000_000_4, 10.0));
        agg.add("abe", &question(1, 0.300_002, 10.0));
        let totals = agg.finish();
        let order: Vec<(&str, u32)> = totals
            .iter()
            .map(|t| (t.student_name.as_str(), t.rank))
            .collect();
        assert_eq!(
            order,
            vec![("abe", 1), ("cleo", 2), ("dan", 2), ("erin", 2)]
        );
    }

    #[test]
    fn rounding_to_one_decimal() {
        assert_eq!(round1(66.666_666), 66.7);
        assert_eq!(round1(12.25), 12.3);
        assert_eq!(round1(100.0), 100.0);
    }
}
