// src/grading.rs
//
// The grading engine. A pure function over the authoritative (unshuffled)
// question bank and the raw answer map; the session layer translates any
// display shuffle back to canonical indices before answers reach this module.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::question::{Question, QuestionKind};
use crate::utils::normalize::normalize;

/// Point value used when a question row carries none.
pub const DEFAULT_POINTS: i32 = 10;

/// Essay answers matching at least this fraction of the reference key words
/// earn full credit; below it, credit scales with the fraction.
const ESSAY_FULL_CREDIT_RATIO: f64 = 0.30;

/// Reference words must be longer than this to count as key words.
const ESSAY_MIN_WORD_LEN: usize = 3;

/// One submitted answer. The JSON shape depends on the question kind;
/// comparison dispatches exhaustively over (key, payload) pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerPayload {
    /// Canonical option index for choice questions.
    Index(i64),
    /// Full sequence for ordering questions.
    Sequence(Vec<String>),
    /// Left item -> chosen right item for matching questions.
    Matches(HashMap<String, String>),
    /// Free text for short-answer and essay questions; also accepted as a
    /// numeric string for choice questions.
    Text(String),
}

/// The typed answer key derived from a question row.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerKey {
    Choice { correct: i64 },
    Ordering { sequence: Vec<String> },
    Matching { pairs: HashMap<String, String> },
    ShortAnswer { expected: String },
    Essay { reference: Option<String> },
}

impl AnswerKey {
    pub fn for_question(q: &Question) -> Self {
        match q.kind {
            QuestionKind::SingleChoice | QuestionKind::TrueFalse => AnswerKey::Choice {
                correct: i64::from(q.correct_index.unwrap_or(0)),
            },
            QuestionKind::Ordering => AnswerKey::Ordering {
                sequence: q.options.0.clone(),
            },
            QuestionKind::Matching => AnswerKey::Matching {
                pairs: q.matching_pairs(),
            },
            QuestionKind::ShortAnswer => AnswerKey::ShortAnswer {
                expected: q.correct_text.clone().unwrap_or_default(),
            },
            QuestionKind::Essay => AnswerKey::Essay {
                reference: q
                    .correct_text
                    .clone()
                    .filter(|r| !r.trim().is_empty()),
            },
        }
    }
}

/// The result of grading one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GradeOutcome {
    pub earned: i64,
    pub total: i64,
    /// `round(earned / total * 100)`, or 0 when no questions participate.
    pub percentage: i32,
}

/// Grades a raw answer map against the participating questions.
///
/// `total` counts every participating question whether answered or not; an
/// absent answer contributes zero. Pure: same inputs, same outcome.
pub fn grade<'a>(
    questions: impl IntoIterator<Item = &'a Question>,
    answers: &HashMap<i64, AnswerPayload>,
) -> GradeOutcome {
    let mut earned: i64 = 0;
    let mut total: i64 = 0;

    for question in questions {
        let points = effective_points(question);
        total += i64::from(points);
        if let Some(payload) = answers.get(&question.id) {
            earned += award(&AnswerKey::for_question(question), payload, points);
        }
    }

    let percentage = if total > 0 {
        ((earned as f64 / total as f64) * 100.0).round() as i32
    } else {
        0
    };

    GradeOutcome {
        earned,
        total,
        percentage,
    }
}

/// Questions participating in a grade for the given course, compared
/// case/whitespace-insensitively. Callers decide what an empty result means;
/// for a student with no recorded course the whole bank participates instead.
pub fn questions_for_course<'a>(questions: &'a [Question], course: &str) -> Vec<&'a Question> {
    let wanted = normalize(course);
    questions
        .iter()
        .filter(|q| {
            q.course_name
                .as_deref()
                .is_some_and(|name| normalize(name) == wanted)
        })
        .collect()
}

fn effective_points(question: &Question) -> i32 {
    if question.points > 0 {
        question.points
    } else {
        DEFAULT_POINTS
    }
}

/// Points awarded for one answer. All-or-nothing for every kind except
/// essay, which scales below the full-credit ratio.
fn award(key: &AnswerKey, payload: &AnswerPayload, points: i32) -> i64 {
    let full = i64::from(points);
    match (key, payload) {
        (AnswerKey::Choice { correct }, AnswerPayload::Index(picked)) => {
            if picked == correct { full } else { 0 }
        }
        // Clients that round-trip answers through text storage submit "1"
        // instead of 1; accept the numeric string form.
        (AnswerKey::Choice { correct }, AnswerPayload::Text(raw)) => {
            match raw.trim().parse::<i64>() {
                Ok(picked) if picked == *correct => full,
                _ => 0,
            }
        }
        (AnswerKey::Ordering { sequence }, AnswerPayload::Sequence(submitted)) => {
            if submitted == sequence { full } else { 0 }
        }
        (AnswerKey::Matching { pairs }, AnswerPayload::Matches(submitted)) => {
            if pairs.is_empty() {
                return 0;
            }
            let all_correct = pairs.iter().all(|(left, expected)| {
                submitted
                    .get(left)
                    .is_some_and(|given| normalize(given) == normalize(expected))
            });
            if all_correct { full } else { 0 }
        }
        (AnswerKey::ShortAnswer { expected }, AnswerPayload::Text(given)) => {
            if given.trim().to_lowercase() == expected.trim().to_lowercase() {
                full
            } else {
                0
            }
        }
        (AnswerKey::Essay { reference }, AnswerPayload::Text(given)) => {
            essay_award(reference.as_deref(), given, full)
        }
        // Payload shape does not fit the question kind.
        _ => 0,
    }
}

fn essay_award(reference: Option<&str>, given: &str, full: i64) -> i64 {
    let answer = given.trim().to_lowercase();
    if answer.is_empty() {
        return 0;
    }

    // No reference configured: any non-empty answer earns full credit.
    let Some(reference) = reference else {
        return full;
    };
    let reference = reference.trim().to_lowercase();

    let key_words: Vec<&str> = reference
        .split_whitespace()
        .filter(|w| w.len() > ESSAY_MIN_WORD_LEN)
        .collect();

    if key_words.is_empty() {
        // Reference too short to mine key words; fall back to containment.
        return if answer.contains(&reference) { full } else { 0 };
    }

    let matched = key_words.iter().filter(|w| answer.contains(**w)).count();
    let ratio = matched as f64 / key_words.len() as f64;
    if ratio >= ESSAY_FULL_CREDIT_RATIO {
        full
    } else {
        (full as f64 * ratio).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;

    fn question(
        id: i64,
        kind: QuestionKind,
        options: &[&str],
        correct_index: Option<i32>,
        correct_text: Option<&str>,
        points: i32,
    ) -> Question {
        Question {
            id,
            prompt: format!("Question {id}"),
            kind,
            options: Json(options.iter().map(|s| s.to_string()).collect()),
            correct_index,
            correct_text: correct_text.map(|s| s.to_string()),
            points,
            course_name: Some("Networking".to_string()),
            created_at: None,
        }
    }

    fn answers(entries: &[(i64, AnswerPayload)]) -> HashMap<i64, AnswerPayload> {
        entries.iter().cloned().collect()
    }

    #[test]
    fn single_choice_right_wrong_unanswered() {
        let qs = [question(
            1,
            QuestionKind::SingleChoice,
            &["a", "b", "c"],
            Some(1),
            None,
            10,
        )];

        let right = grade(&qs, &answers(&[(1, AnswerPayload::Index(1))]));
        assert_eq!(right.percentage, 100);

        let wrong = grade(&qs, &answers(&[(1, AnswerPayload::Index(0))]));
        assert_eq!(wrong.percentage, 0);

        let unanswered = grade(&qs, &HashMap::new());
        assert_eq!(unanswered.percentage, 0);
        assert_eq!(unanswered.total, 10);
    }

    #[test]
    fn single_choice_accepts_numeric_string() {
        let qs = [question(
            1,
            QuestionKind::SingleChoice,
            &["a", "b"],
            Some(1),
            None,
            10,
        )];
        let outcome = grade(&qs, &answers(&[(1, AnswerPayload::Text("1".to_string()))]));
        assert_eq!(outcome.earned, 10);
    }

    #[test]
    fn ordering_has_no_partial_credit() {
        let qs = [question(
            7,
            QuestionKind::Ordering,
            &["a", "b", "c"],
            None,
            None,
            10,
        )];
        let exact = grade(
            &qs,
            &answers(&[(
                7,
                AnswerPayload::Sequence(vec!["a".into(), "b".into(), "c".into()]),
            )]),
        );
        assert_eq!(exact.earned, 10);

        let swapped = grade(
            &qs,
            &answers(&[(
                7,
                AnswerPayload::Sequence(vec!["b".into(), "a".into(), "c".into()]),
            )]),
        );
        assert_eq!(swapped.earned, 0);
    }

    #[test]
    fn matching_is_all_or_nothing_and_normalized() {
        let qs = [question(
            3,
            QuestionKind::Matching,
            &[],
            None,
            Some(r#"{"Paris":"France","Tokyo":"Japan"}"#),
            10,
        )];

        let both = grade(
            &qs,
            &answers(&[(
                3,
                AnswerPayload::Matches(
                    [
                        ("Paris".to_string(), "  FRANCE ".to_string()),
                        ("Tokyo".to_string(), "japan".to_string()),
                    ]
                    .into(),
                ),
            )]),
        );
        assert_eq!(both.earned, 10);

        let one_wrong = grade(
            &qs,
            &answers(&[(
                3,
                AnswerPayload::Matches(
                    [
                        ("Paris".to_string(), "France".to_string()),
                        ("Tokyo".to_string(), "China".to_string()),
                    ]
                    .into(),
                ),
            )]),
        );
        assert_eq!(one_wrong.earned, 0);

        let missing_key = grade(
            &qs,
            &answers(&[(
                3,
                AnswerPayload::Matches([("Paris".to_string(), "France".to_string())].into()),
            )]),
        );
        assert_eq!(missing_key.earned, 0);
    }

    #[test]
    fn matching_with_unparseable_key_awards_zero() {
        let qs = [question(
            3,
            QuestionKind::Matching,
            &[],
            None,
            Some("not json"),
            10,
        )];
        let outcome = grade(
            &qs,
            &answers(&[(3, AnswerPayload::Matches(HashMap::new()))]),
        );
        assert_eq!(outcome.earned, 0);
    }

    #[test]
    fn short_answer_exact_after_normalization() {
        let qs = [question(
            4,
            QuestionKind::ShortAnswer,
            &[],
            None,
            Some("Router"),
            10,
        )];
        let hit = grade(
            &qs,
            &answers(&[(4, AnswerPayload::Text("  ROUTER ".to_string()))]),
        );
        assert_eq!(hit.earned, 10);

        let miss = grade(
            &qs,
            &answers(&[(4, AnswerPayload::Text("Routers".to_string()))]),
        );
        assert_eq!(miss.earned, 0);
    }

    #[test]
    fn essay_ratio_at_threshold_earns_full_points() {
        // Key words longer than 3 chars: quick, brown, jumps.
        let qs = [question(
            5,
            QuestionKind::Essay,
            &[],
            None,
            Some("the quick brown fox jumps"),
            9,
        )];

        let one_of_three = grade(
            &qs,
            &answers(&[(5, AnswerPayload::Text("a quick reply".to_string()))]),
        );
        assert_eq!(one_of_three.earned, 9);

        let none = grade(
            &qs,
            &answers(&[(5, AnswerPayload::Text("something unrelated".to_string()))]),
        );
        assert_eq!(none.earned, 0);
    }

    #[test]
    fn essay_below_threshold_scales_with_ratio() {
        // Four key words; matching one gives ratio 0.25 < 0.30.
        let qs = [question(
            5,
            QuestionKind::Essay,
            &[],
            None,
            Some("routers switches firewalls gateways"),
            10,
        )];
        let outcome = grade(
            &qs,
            &answers(&[(5, AnswerPayload::Text("only routers here".to_string()))]),
        );
        assert_eq!(outcome.earned, 3); // round(10 * 0.25)
    }

    #[test]
    fn essay_without_reference_auto_grants_non_empty() {
        let qs = [question(5, QuestionKind::Essay, &[], None, None, 10)];
        let filled = grade(
            &qs,
            &answers(&[(5, AnswerPayload::Text("anything at all".to_string()))]),
        );
        assert_eq!(filled.earned, 10);

        let blank = grade(&qs, &answers(&[(5, AnswerPayload::Text("   ".to_string()))]));
        assert_eq!(blank.earned, 0);
    }

    #[test]
    fn essay_short_reference_falls_back_to_containment() {
        let qs = [question(5, QuestionKind::Essay, &[], None, Some("tcp"), 10)];
        let containing = grade(
            &qs,
            &answers(&[(5, AnswerPayload::Text("TCP is reliable".to_string()))]),
        );
        assert_eq!(containing.earned, 10);

        let missing = grade(
            &qs,
            &answers(&[(5, AnswerPayload::Text("UDP is not".to_string()))]),
        );
        assert_eq!(missing.earned, 0);
    }

    #[test]
    fn totals_count_unanswered_and_percentage_rounds() {
        let qs = [
            question(1, QuestionKind::SingleChoice, &["a", "b"], Some(0), None, 10),
            question(2, QuestionKind::SingleChoice, &["a", "b"], Some(0), None, 10),
            question(3, QuestionKind::SingleChoice, &["a", "b"], Some(0), None, 10),
        ];
        let outcome = grade(&qs, &answers(&[(1, AnswerPayload::Index(0))]));
        assert_eq!(outcome.total, 30);
        assert_eq!(outcome.earned, 10);
        assert_eq!(outcome.percentage, 33);
    }

    #[test]
    fn zero_points_defaults_to_ten() {
        let qs = [question(
            1,
            QuestionKind::SingleChoice,
            &["a", "b"],
            Some(0),
            None,
            0,
        )];
        let outcome = grade(&qs, &answers(&[(1, AnswerPayload::Index(0))]));
        assert_eq!(outcome.total, 10);
        assert_eq!(outcome.earned, 10);
    }

    #[test]
    fn empty_question_set_grades_to_zero() {
        let qs: [Question; 0] = [];
        let outcome = grade(&qs, &HashMap::new());
        assert_eq!(
            outcome,
            GradeOutcome {
                earned: 0,
                total: 0,
                percentage: 0
            }
        );
    }

    #[test]
    fn grading_is_deterministic() {
        let qs = [
            question(1, QuestionKind::SingleChoice, &["a", "b"], Some(1), None, 10),
            question(5, QuestionKind::Essay, &[], None, Some("the quick brown fox jumps"), 9),
        ];
        let submitted = answers(&[
            (1, AnswerPayload::Index(1)),
            (5, AnswerPayload::Text("quick note".to_string())),
        ]);
        assert_eq!(grade(&qs, &submitted), grade(&qs, &submitted));
    }

    #[test]
    fn course_filter_is_case_and_whitespace_insensitive() {
        let mut qs = vec![
            question(1, QuestionKind::SingleChoice, &["a", "b"], Some(0), None, 10),
            question(2, QuestionKind::SingleChoice, &["a", "b"], Some(0), None, 10),
        ];
        qs[0].course_name = Some("  Computer   Networks ".to_string());
        qs[1].course_name = Some("Databases".to_string());

        let selected = questions_for_course(&qs, "computer networks");
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, 1);

        assert!(questions_for_course(&qs, "algebra").is_empty());
    }

    #[test]
    fn mismatched_payload_shape_awards_zero() {
        let qs = [question(
            1,
            QuestionKind::SingleChoice,
            &["a", "b"],
            Some(0),
            None,
            10,
        )];
        let outcome = grade(
            &qs,
            &answers(&[(1, AnswerPayload::Sequence(vec!["a".into()]))]),
        );
        assert_eq!(outcome.earned, 0);
    }
}
