use crate::error::{Error, Result};
use crate::models::question::{AnswerValue, QuestionType, TestQuestion};
use crate::models::test_attempt::AnswerSheet;
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct GradedAnswer {
    pub question_id: Uuid,
    pub submitted: Option<AnswerValue>,
    pub correct: bool,
    pub points_awarded: i32,
    pub max_points: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeOutcome {
    pub score: i32,
    pub max_score: i32,
    pub percentage: i32,
    pub graded: Vec<GradedAnswer>,
}

pub struct GradingService;

impl GradingService {
    /// Scores `answers` against `questions` (the drawn set, in presentation order).
    /// Answers for questions outside the set are ignored; missing answers score 0.
    pub fn grade(questions: &[TestQuestion], answers: &AnswerSheet) -> Result<GradeOutcome> {
        let mut score: i64 = 0;
        let mut max_score: i64 = 0;
        let mut graded = Vec::with_capacity(questions.len());

        for q in questions {
            max_score += i64::from(q.points);
            let submitted = answers.get(&q.id).cloned();
            let correct = match &submitted {
                Some(answer) => Self::is_correct(q.kind()?, &q.correct_answers, answer),
                None => false,
            };
            let points_awarded = if correct { q.points } else { 0 };
            score += i64::from(points_awarded);

            graded.push(GradedAnswer {
                question_id: q.id,
                submitted,
                correct,
                points_awarded,
                max_points: q.points,
            });
        }

        let percentage = Self::percentage(score, max_score);
        let (score, max_score) = match (i32::try_from(score), i32::try_from(max_score)) {
            (Ok(score), Ok(max_score)) => (score, max_score),
            _ => {
                return Err(Error::BadRequest(
                    "Question points exceed the supported score range".into(),
                ))
            }
        };

        Ok(GradeOutcome {
            score,
            max_score,
            percentage,
            graded,
        })
    }

    /// All-or-nothing: single choice needs the one correct option, multiple
    /// choice needs exactly the correct set in any order.
    pub fn is_correct(kind: QuestionType, correct_answers: &[String], submitted: &AnswerValue) -> bool {
        let given = submitted.as_set();
        match kind {
            QuestionType::SingleChoice => match (correct_answers, given.len()) {
                ([expected], 1) => given.contains(expected.as_str()),
                _ => false,
            },
            QuestionType::MultipleChoice => {
                let expected: BTreeSet<&str> = correct_answers.iter().map(String::as_str).collect();
                !given.is_empty() && given == expected
            }
        }
    }

    /// `round(score / max × 100)`, half away from zero; 0 when nothing is scoreable.
    pub fn percentage(score: i64, max_score: i64) -> i32 {
        if max_score <= 0 {
            return 0;
        }
        ((score as f64 / max_score as f64) * 100.0).round() as i32
    }

    pub fn passed(percentage: i32, passing_score: i32, time_exceeded: bool) -> bool {
        !time_exceeded && percentage >= passing_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlx::types::Json;

    fn question(kind: QuestionType, correct: &[&str], points: i32) -> TestQuestion {
        let now = Utc::now();
        TestQuestion {
            id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            question_text: "Which items are PPE?".into(),
            question_type: kind.as_str().into(),
            options: Json(vec!["A".into(), "B".into(), "C".into(), "D".into()]),
            correct_answers: Json(correct.iter().map(|s| s.to_string()).collect()),
            points,
            question_order: 1,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn multi(xs: &[&str]) -> AnswerValue {
        AnswerValue::Multiple(xs.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn multiple_choice_subset_scores_zero() {
        let q = question(QuestionType::MultipleChoice, &["A", "B", "C"], 3);
        let mut answers = AnswerSheet::new();
        answers.insert(q.id, multi(&["A", "B"]));
        let outcome = GradingService::grade(&[q], &answers).unwrap();
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.max_score, 3);
        assert!(!outcome.graded[0].correct);
    }

    #[test]
    fn multiple_choice_superset_scores_zero() {
        assert!(!GradingService::is_correct(
            QuestionType::MultipleChoice,
            &["A".into(), "B".into()],
            &multi(&["A", "B", "C"]),
        ));
    }

    #[test]
    fn multiple_choice_is_order_independent() {
        assert!(GradingService::is_correct(
            QuestionType::MultipleChoice,
            &["A".into(), "B".into(), "C".into()],
            &multi(&["C", "A", "B"]),
        ));
    }

    #[test]
    fn multiple_choice_with_single_correct_accepts_plain_string() {
        assert!(GradingService::is_correct(
            QuestionType::MultipleChoice,
            &["B".into()],
            &AnswerValue::Single("B".into()),
        ));
    }

    #[test]
    fn single_choice_requires_exact_option() {
        let correct = vec!["B".to_string()];
        assert!(GradingService::is_correct(
            QuestionType::SingleChoice,
            &correct,
            &AnswerValue::Single("B".into())
        ));
        assert!(GradingService::is_correct(
            QuestionType::SingleChoice,
            &correct,
            &multi(&["B"])
        ));
        assert!(!GradingService::is_correct(
            QuestionType::SingleChoice,
            &correct,
            &multi(&["B", "C"])
        ));
        assert!(!GradingService::is_correct(
            QuestionType::SingleChoice,
            &correct,
            &AnswerValue::Single("b".into())
        ));
    }

    #[test]
    fn missing_and_foreign_answers_are_ignored() {
        let q1 = question(QuestionType::SingleChoice, &["A"], 2);
        let q2 = question(QuestionType::SingleChoice, &["B"], 2);
        let mut answers = AnswerSheet::new();
        answers.insert(q1.id, AnswerValue::Single("A".into()));
        answers.insert(Uuid::new_v4(), AnswerValue::Single("B".into()));
        let outcome = GradingService::grade(&[q1, q2], &answers).unwrap();
        assert_eq!(outcome.score, 2);
        assert_eq!(outcome.max_score, 4);
        assert_eq!(outcome.percentage, 50);
        assert_eq!(outcome.graded.len(), 2);
        assert!(outcome.graded[1].submitted.is_none());
    }

    #[test]
    fn score_never_exceeds_max_and_percentage_is_rounded() {
        let qs: Vec<TestQuestion> = (1..=7)
            .map(|p| question(QuestionType::SingleChoice, &["A"], p))
            .collect();
        for mask in 0u32..(1 << qs.len()) {
            let mut answers = AnswerSheet::new();
            for (i, q) in qs.iter().enumerate() {
                let pick = if mask & (1 << i) != 0 { "A" } else { "D" };
                answers.insert(q.id, AnswerValue::Single(pick.into()));
            }
            let o = GradingService::grade(&qs, &answers).unwrap();
            assert!(o.score <= o.max_score);
            let expected = (o.score as f64 / o.max_score as f64 * 100.0).round() as i32;
            assert_eq!(o.percentage, expected);
        }
    }

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(GradingService::percentage(1, 8), 13); // 12.5
        assert_eq!(GradingService::percentage(2, 3), 67);
        assert_eq!(GradingService::percentage(1, 3), 33);
        assert_eq!(GradingService::percentage(0, 0), 0);
    }

    #[test]
    fn oversized_point_totals_are_rejected_not_wrapped() {
        let qs = vec![
            question(QuestionType::SingleChoice, &["A"], i32::MAX),
            question(QuestionType::SingleChoice, &["A"], i32::MAX),
        ];
        let err = GradingService::grade(&qs, &AnswerSheet::new()).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn large_capped_points_still_score_exactly() {
        let qs: Vec<TestQuestion> = (0..4)
            .map(|_| question(QuestionType::SingleChoice, &["A"], 1000))
            .collect();
        let mut answers = AnswerSheet::new();
        for q in &qs[..3] {
            answers.insert(q.id, AnswerValue::Single("A".into()));
        }
        let o = GradingService::grade(&qs, &answers).unwrap();
        assert_eq!((o.score, o.max_score, o.percentage), (3000, 4000, 75));
    }

    #[test]
    fn passing_threshold_is_inclusive() {
        assert!(GradingService::passed(80, 80, false));
        assert!(!GradingService::passed(79, 80, false));
    }

    #[test]
    fn overtime_attempts_never_pass() {
        assert!(!GradingService::passed(100, 50, true));
    }

    #[test]
    fn exactly_eighty_percent_passes_at_eighty() {
        let qs: Vec<TestQuestion> = (0..5)
            .map(|_| question(QuestionType::SingleChoice, &["A"], 1))
            .collect();
        let mut answers = AnswerSheet::new();
        for q in &qs[..4] {
            answers.insert(q.id, AnswerValue::Single("A".into()));
        }
        let o = GradingService::grade(&qs, &answers).unwrap();
        assert_eq!(o.percentage, 80);
        assert!(GradingService::passed(o.percentage, 80, false));
    }
}
