// Quiz scoring and course progress.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use valeris_core::models::QuizAttempt;

pub const PASSING_PCT: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuizResult {
    pub correct: u32,
    pub total: u32,
    pub percentage: f64,
    pub passed: bool,
}

impl QuizResult {
    pub fn score(correct: u32, total: u32) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            correct.min(total) as f64 / total as f64 * 100.0
        };
        QuizResult {
            correct,
            total,
            percentage,
            passed: percentage >= PASSING_PCT,
        }
    }
}

impl From<&QuizAttempt> for QuizResult {
    fn from(attempt: &QuizAttempt) -> Self {
        QuizResult::score(attempt.correct, attempt.total)
    }
}

/// Best result per quiz id.
pub fn best_scores(attempts: &[QuizAttempt]) -> BTreeMap<String, QuizResult> {
    let mut best: BTreeMap<String, QuizResult> = BTreeMap::new();
    for attempt in attempts {
        let result = QuizResult::from(attempt);
        best.entry(attempt.quiz_id.clone())
            .and_modify(|b| {
                if result.percentage > b.percentage {
                    *b = result;
                }
            })
            .or_insert(result);
    }
    best
}

/// Fraction (0.0..=1.0) of `quiz_ids` passed at least once. Attempts at
/// quizzes outside the course are ignored.
pub fn course_progress(attempts: &[QuizAttempt], quiz_ids: &[&str]) -> f64 {
    let course: HashSet<&str> = quiz_ids.iter().copied().collect();
    if course.is_empty() {
        return 0.0;
    }
    let passed: HashSet<&str> = attempts
        .iter()
        .filter(|a| course.contains(a.quiz_id.as_str()))
        .filter(|a| QuizResult::from(*a).passed)
        .map(|a| a.quiz_id.as_str())
        .collect();
    passed.len() as f64 / course.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn attempt(quiz: &str, correct: u32, total: u32) -> QuizAttempt {
        QuizAttempt {
            id: format!("{quiz}-{correct}"),
            user_id: "u1".into(),
            quiz_id: quiz.into(),
            correct,
            total,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn scoring_thresholds() {
        assert!(QuizResult::score(7, 10).passed);
        assert!(!QuizResult::score(6, 10).passed);
        let empty = QuizResult::score(0, 0);
        assert_eq!(empty.percentage, 0.0);
        assert!(!empty.passed);
        assert_eq!(QuizResult::score(12, 10).percentage, 100.0);
    }

    #[test]
    fn best_score_per_quiz() {
        let attempts = vec![
            attempt("risk", 5, 10),
            attempt("risk", 9, 10),
            attempt("risk", 8, 10),
            attempt("psych", 3, 4),
        ];
        let best = best_scores(&attempts);
        assert_eq!(best["risk"].correct, 9);
        assert_eq!(best["psych"].percentage, 75.0);
    }

    #[test]
    fn progress_counts_distinct_passed_quizzes() {
        let attempts = vec![
            attempt("risk", 9, 10),
            attempt("risk", 10, 10),
            attempt("psych", 1, 4),
            attempt("bonus", 4, 4),
        ];
        let progress = course_progress(&attempts, &["risk", "psych", "charts", "sizing"]);
        assert_eq!(progress, 0.25);
        assert_eq!(course_progress(&attempts, &[]), 0.0);
    }
}
