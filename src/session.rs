// src/session.rs
//
// Client-held exam session state: the shuffled presentation of a question
// set, the answer buffer, and the countdown timer, persisted through a
// scoped key-value store so a mid-exam reload resumes the same attempt
// without a server round-trip.
//
// Shuffling is presentation-only. Choice answers are translated back to
// canonical option indices before they enter the buffer, so the grading
// engine never sees a display ordering.

use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::grading::AnswerPayload;
use crate::models::question::{PublicQuestion, QuestionKind};

/// Storage keys, all under the `exam.` namespace. Cleared together on
/// successful submission and at no other time.
pub const QUESTION_ORDER_KEY: &str = "exam.question_order";
pub const OPTION_PLANS_KEY: &str = "exam.option_plans";
pub const ANSWERS_KEY: &str = "exam.answers";
pub const CURRENT_INDEX_KEY: &str = "exam.current_index";
pub const SECONDS_LEFT_KEY: &str = "exam.seconds_left";

const ALL_KEYS: [&str; 5] = [
    QUESTION_ORDER_KEY,
    OPTION_PLANS_KEY,
    ANSWERS_KEY,
    CURRENT_INDEX_KEY,
    SECONDS_LEFT_KEY,
];

/// Client-local persistence, string keys to string values (the localStorage
/// shape).
pub trait SessionStore {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

/// In-memory store backing a single exam tab.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn read(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn write(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

/// How one question is displayed this session. Decided once on first load
/// and frozen until submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayPlan {
    /// Shuffled options with bidirectional index maps, so answers are
    /// recorded canonically while displayed shuffled.
    Choice {
        options: Vec<String>,
        displayed_to_canonical: Vec<usize>,
        canonical_to_displayed: Vec<usize>,
    },
    /// The starting sequence shown for an ordering question, distinct from
    /// the canonical correct sequence.
    Ordering { initial: Vec<String> },
    /// The right-hand option list for a matching question, shuffled once.
    Matching { right_values: Vec<String> },
}

/// One in-progress exam attempt as held by the client.
#[derive(Debug)]
pub struct ExamSession {
    questions: Vec<PublicQuestion>,
    plans: HashMap<i64, DisplayPlan>,
    answers: HashMap<i64, AnswerPayload>,
    current: usize,
    seconds_left: u64,
}

impl ExamSession {
    /// Loads the session from the store if all keys are present (a reload
    /// mid-exam), otherwise shuffles a fresh session and persists it.
    /// Partial key presence counts as a fresh start.
    pub fn begin(
        questions: Vec<PublicQuestion>,
        duration_secs: u64,
        rng: &mut impl Rng,
        store: &mut dyn SessionStore,
    ) -> Self {
        if let Some(resumed) = Self::resume(store) {
            return resumed;
        }

        let session = Self::fresh(questions, duration_secs, rng);
        session.persist_all(store);
        session
    }

    fn resume(store: &dyn SessionStore) -> Option<Self> {
        let questions = serde_json::from_str(&store.read(QUESTION_ORDER_KEY)?).ok()?;
        let plans = serde_json::from_str(&store.read(OPTION_PLANS_KEY)?).ok()?;
        let answers = serde_json::from_str(&store.read(ANSWERS_KEY)?).ok()?;
        let current = store.read(CURRENT_INDEX_KEY)?.parse().ok()?;
        let seconds_left = store.read(SECONDS_LEFT_KEY)?.parse().ok()?;

        Some(Self {
            questions,
            plans,
            answers,
            current,
            seconds_left,
        })
    }

    fn fresh(mut questions: Vec<PublicQuestion>, duration_secs: u64, rng: &mut impl Rng) -> Self {
        questions.shuffle(rng);

        let mut plans = HashMap::new();
        for question in &questions {
            match question.kind {
                QuestionKind::SingleChoice | QuestionKind::TrueFalse => {
                    let mut displayed_to_canonical: Vec<usize> =
                        (0..question.options.len()).collect();
                    displayed_to_canonical.shuffle(rng);

                    let mut canonical_to_displayed = vec![0; displayed_to_canonical.len()];
                    for (displayed, &canonical) in displayed_to_canonical.iter().enumerate() {
                        canonical_to_displayed[canonical] = displayed;
                    }

                    let options = displayed_to_canonical
                        .iter()
                        .map(|&canonical| question.options[canonical].clone())
                        .collect();

                    plans.insert(
                        question.id,
                        DisplayPlan::Choice {
                            options,
                            displayed_to_canonical,
                            canonical_to_displayed,
                        },
                    );
                }
                QuestionKind::Ordering => {
                    let mut initial = question.options.clone();
                    initial.shuffle(rng);
                    plans.insert(question.id, DisplayPlan::Ordering { initial });
                }
                QuestionKind::Matching => {
                    let mut right_values = question.right_values.clone().unwrap_or_default();
                    right_values.shuffle(rng);
                    plans.insert(question.id, DisplayPlan::Matching { right_values });
                }
                QuestionKind::ShortAnswer | QuestionKind::Essay => {}
            }
        }

        Self {
            questions,
            plans,
            answers: HashMap::new(),
            current: 0,
            seconds_left: duration_secs,
        }
    }

    fn persist_all(&self, store: &mut dyn SessionStore) {
        store.write(
            QUESTION_ORDER_KEY,
            &serde_json::to_string(&self.questions).unwrap_or_default(),
        );
        store.write(
            OPTION_PLANS_KEY,
            &serde_json::to_string(&self.plans).unwrap_or_default(),
        );
        self.persist_answers(store);
        self.persist_index(store);
        self.persist_time(store);
    }

    fn persist_answers(&self, store: &mut dyn SessionStore) {
        store.write(
            ANSWERS_KEY,
            &serde_json::to_string(&self.answers).unwrap_or_default(),
        );
    }

    fn persist_index(&self, store: &mut dyn SessionStore) {
        store.write(CURRENT_INDEX_KEY, &self.current.to_string());
    }

    fn persist_time(&self, store: &mut dyn SessionStore) {
        store.write(SECONDS_LEFT_KEY, &self.seconds_left.to_string());
    }

    /// Questions in their displayed (shuffled) order.
    pub fn questions(&self) -> &[PublicQuestion] {
        &self.questions
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> Option<&PublicQuestion> {
        self.questions.get(self.current)
    }

    pub fn seconds_left(&self) -> u64 {
        self.seconds_left
    }

    /// The buffered answers, keyed by question id, in canonical form.
    pub fn answers(&self) -> &HashMap<i64, AnswerPayload> {
        &self.answers
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    pub fn plan(&self, question_id: i64) -> Option<&DisplayPlan> {
        self.plans.get(&question_id)
    }

    /// Moves the question pointer, persisting it.
    pub fn goto(&mut self, store: &mut dyn SessionStore, index: usize) {
        if index < self.questions.len() {
            self.current = index;
            self.persist_index(store);
        }
    }

    pub fn next(&mut self, store: &mut dyn SessionStore) {
        if self.current + 1 < self.questions.len() {
            self.goto(store, self.current + 1);
        }
    }

    pub fn prev(&mut self, store: &mut dyn SessionStore) {
        if self.current > 0 {
            self.goto(store, self.current - 1);
        }
    }

    /// Records a choice answer by its displayed position, translating it to
    /// the canonical index before buffering. Ignored for questions without a
    /// choice plan or out-of-range positions.
    pub fn record_choice(
        &mut self,
        store: &mut dyn SessionStore,
        question_id: i64,
        displayed_index: usize,
    ) {
        let Some(DisplayPlan::Choice {
            displayed_to_canonical,
            ..
        }) = self.plans.get(&question_id)
        else {
            return;
        };
        let Some(&canonical) = displayed_to_canonical.get(displayed_index) else {
            return;
        };

        self.answers
            .insert(question_id, AnswerPayload::Index(canonical as i64));
        self.persist_answers(store);
    }

    /// The displayed position of a buffered choice answer, for re-rendering
    /// the selection after a reload.
    pub fn displayed_choice(&self, question_id: i64) -> Option<usize> {
        let AnswerPayload::Index(canonical) = self.answers.get(&question_id)? else {
            return None;
        };
        let DisplayPlan::Choice {
            canonical_to_displayed,
            ..
        } = self.plans.get(&question_id)?
        else {
            return None;
        };
        canonical_to_displayed.get(*canonical as usize).copied()
    }

    /// Buffers a free-text answer (short answer or essay).
    pub fn record_text(&mut self, store: &mut dyn SessionStore, question_id: i64, text: &str) {
        self.answers
            .insert(question_id, AnswerPayload::Text(text.to_string()));
        self.persist_answers(store);
    }

    /// Buffers the current arrangement of an ordering question.
    pub fn record_sequence(
        &mut self,
        store: &mut dyn SessionStore,
        question_id: i64,
        sequence: Vec<String>,
    ) {
        self.answers
            .insert(question_id, AnswerPayload::Sequence(sequence));
        self.persist_answers(store);
    }

    /// Buffers the pairings chosen for a matching question.
    pub fn record_matches(
        &mut self,
        store: &mut dyn SessionStore,
        question_id: i64,
        matches: HashMap<String, String>,
    ) {
        self.answers
            .insert(question_id, AnswerPayload::Matches(matches));
        self.persist_answers(store);
    }

    /// One second of countdown. Returns true once the timer has reached
    /// zero, at which point the host submits whatever is buffered.
    pub fn tick(&mut self, store: &mut dyn SessionStore) -> bool {
        if self.seconds_left > 0 {
            self.seconds_left -= 1;
            self.persist_time(store);
        }
        self.seconds_left == 0
    }

    /// Clears every session key after a successful submission. Nothing else
    /// removes them.
    pub fn finish(self, store: &mut dyn SessionStore) {
        for key in ALL_KEYS {
            store.remove(key);
        }
    }
}
