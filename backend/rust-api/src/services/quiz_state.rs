//! Quiz session state machine.
//!
//! ```text
//! (none) --start--> prepared-1 --submit--> submitted-1 --prepare--> prepared-2
//! --submit--> submitted-2 --prepare--> prepared-3 --submit--> submitted-3
//! ```
//!
//! Every transition takes the record loaded from the session store, checks it
//! with [`validate`] and returns the successor record. A failed check returns
//! an error before anything is changed, so the stored record stays as it was.

use chrono::{DateTime, Utc};
use rand::{seq::SliceRandom, Rng};
use thiserror::Error;

use crate::config::QuizRules;
use crate::models::{
    Phase1QuestionView, Phase2QuestionView, Phase3QuestionView, Phase3Result, PhaseQuestions,
    PhaseReview, PhaseView, QuizData, QuizStage, QuizStep, QuizSummary, ReviewDetails, Score,
    Topic,
};

use super::question_generator::{
    create_phase1_questions, create_phase2_questions, create_phase3_questions,
};
use super::ranking_service;
use super::scoring::{self, PhaseScore};

/// User-recoverable reasons to reject a quiz request. The messages are shown
/// to the player after redirecting to the topic overview.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Bitte starten Sie ein Quiz nur über die Themenübersicht.")]
    NoSession,

    #[error("Womöglich haben Sie versucht, während des Quizzes das Thema zu ändern.")]
    TopicMismatch,

    #[error("Womöglich haben Sie versucht, eine Phase des Quizzes zu überspringen.")]
    StepMismatch { expected: QuizStep, actual: QuizStep },

    #[error(
        "Womöglich haben Sie das Quiz verlassen und dann versucht, nach über {minutes} Minuten zurückzukehren."
    )]
    Expired { minutes: i64 },

    #[error(
        "Dieses Thema enthält nur {available} Ereignisse, für ein Quiz werden mindestens {required} benötigt."
    )]
    InsufficientEvents { required: usize, available: usize },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::NoSession => "no_session",
            ValidationError::TopicMismatch => "topic_mismatch",
            ValidationError::StepMismatch { .. } => "step_mismatch",
            ValidationError::Expired { .. } => "expired",
            ValidationError::InsufficientEvents { .. } => "insufficient_events",
        }
    }
}

/// Checks that `record` exists, belongs to `topic_id`, sits exactly at
/// `expected` and was touched no longer than the expiry window ago.
pub fn validate<'a>(
    record: Option<&'a QuizData>,
    expected: QuizStep,
    topic_id: &str,
    rules: &QuizRules,
    now: DateTime<Utc>,
) -> Result<&'a QuizData, ValidationError> {
    let data = record.ok_or(ValidationError::NoSession)?;

    if data.topic_id != topic_id {
        return Err(ValidationError::TopicMismatch);
    }

    let actual = data.step();
    if actual != expected {
        return Err(ValidationError::StepMismatch { expected, actual });
    }

    if now > data.timestamp + rules.expiry() {
        return Err(ValidationError::Expired {
            minutes: rules.expiry_minutes,
        });
    }

    Ok(data)
}

fn take_validated(
    record: Option<QuizData>,
    expected: QuizStep,
    topic_id: &str,
    rules: &QuizRules,
    now: DateTime<Utc>,
) -> Result<QuizData, ValidationError> {
    validate(record.as_ref(), expected, topic_id, rules, now)?;
    record.ok_or(ValidationError::NoSession)
}

fn mismatch(expected: QuizStep, stage: &QuizStage) -> ValidationError {
    ValidationError::StepMismatch {
        expected,
        actual: stage.step(),
    }
}

/// Begins a new playthrough of `topic`, replacing whatever came before.
///
/// The events are shuffled once here; phase 1 and phase 2 take consecutive
/// slices of this order, so they never share an event.
pub fn start<R: Rng + ?Sized>(
    topic: &Topic,
    rules: &QuizRules,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Result<QuizData, ValidationError> {
    let available = topic.events_count();
    if available < rules.min_events() {
        return Err(ValidationError::InsufficientEvents {
            required: rules.min_events(),
            available,
        });
    }

    let mut events = topic.events.clone();
    events.shuffle(rng);
    let questions = create_phase1_questions(&events, rules, rng);

    Ok(QuizData {
        topic_id: topic.id.clone(),
        topic_name: topic.name.clone(),
        events,
        points: 0,
        correct_guesses: 0,
        stage: QuizStage::PreparedPhase1(questions),
        timestamp: now,
    })
}

pub fn submit_phase1(
    record: Option<QuizData>,
    topic_id: &str,
    answers: &[Option<i32>],
    rules: &QuizRules,
    now: DateTime<Utc>,
) -> Result<(QuizData, PhaseScore), ValidationError> {
    let expected = QuizStep::PreparedPhase1;
    let mut data = take_validated(record, expected, topic_id, rules, now)?;

    let score;
    data.stage = match data.stage {
        QuizStage::PreparedPhase1(mut questions) => {
            score = scoring::score_phase1(&mut questions, answers, rules);
            QuizStage::SubmittedPhase1(questions)
        }
        other => return Err(mismatch(expected, &other)),
    };

    Ok((accumulate(data, score, now), score))
}

pub fn prepare_phase2(
    record: Option<QuizData>,
    topic_id: &str,
    rules: &QuizRules,
    now: DateTime<Utc>,
) -> Result<QuizData, ValidationError> {
    let mut data = take_validated(record, QuizStep::SubmittedPhase1, topic_id, rules, now)?;

    data.stage = QuizStage::PreparedPhase2(create_phase2_questions(&data.events, rules));
    data.timestamp = now;
    Ok(data)
}

pub fn submit_phase2(
    record: Option<QuizData>,
    topic_id: &str,
    answers: &[Option<i32>],
    rules: &QuizRules,
    now: DateTime<Utc>,
) -> Result<(QuizData, PhaseScore), ValidationError> {
    let expected = QuizStep::PreparedPhase2;
    let mut data = take_validated(record, expected, topic_id, rules, now)?;

    let score;
    data.stage = match data.stage {
        QuizStage::PreparedPhase2(mut questions) => {
            score = scoring::score_phase2(&mut questions, answers, rules);
            QuizStage::SubmittedPhase2(questions)
        }
        other => return Err(mismatch(expected, &other)),
    };

    Ok((accumulate(data, score, now), score))
}

pub fn prepare_phase3<R: Rng + ?Sized>(
    record: Option<QuizData>,
    topic_id: &str,
    rules: &QuizRules,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Result<QuizData, ValidationError> {
    let mut data = take_validated(record, QuizStep::SubmittedPhase2, topic_id, rules, now)?;

    data.stage = QuizStage::PreparedPhase3(create_phase3_questions(&data.events, rng));
    data.timestamp = now;
    Ok(data)
}

/// Scores the timeline and ranks the final total against `population`, the
/// topic's earlier scores sorted by points descending.
pub fn submit_phase3(
    record: Option<QuizData>,
    topic_id: &str,
    order: &[String],
    population: &[Score],
    rules: &QuizRules,
    now: DateTime<Utc>,
) -> Result<(QuizData, PhaseScore), ValidationError> {
    let expected = QuizStep::PreparedPhase3;
    let mut data = take_validated(record, expected, topic_id, rules, now)?;

    let (questions, placements, score) = match data.stage {
        QuizStage::PreparedPhase3(questions) => {
            let (placements, score) = scoring::score_phase3(&questions, order, rules);
            (questions, placements, score)
        }
        other => return Err(mismatch(expected, &other)),
    };

    let ranking = ranking_service::rank(data.points + score.points, population);
    data.stage = QuizStage::SubmittedPhase3(Phase3Result {
        questions,
        placements,
        ranking,
    });

    Ok((accumulate(data, score, now), score))
}

fn accumulate(mut data: QuizData, score: PhaseScore, now: DateTime<Utc>) -> QuizData {
    data.points += score.points;
    data.correct_guesses += score.correct_guesses;
    data.timestamp = now;
    data
}

/// Prepared questions of the current phase, without answers.
pub fn phase_view(data: &QuizData) -> Result<PhaseView, ValidationError> {
    let questions = match &data.stage {
        QuizStage::PreparedPhase1(questions) => {
            PhaseQuestions::MultipleChoice(questions.iter().map(Phase1QuestionView::from).collect())
        }
        QuizStage::PreparedPhase2(questions) => {
            PhaseQuestions::YearGuess(questions.iter().map(Phase2QuestionView::from).collect())
        }
        QuizStage::PreparedPhase3(questions) => PhaseQuestions::Chronology(
            questions
                .iter()
                .enumerate()
                .map(|(slot, question)| Phase3QuestionView {
                    slot,
                    event_name: question.event_name.clone(),
                })
                .collect(),
        ),
        other => {
            let phase = other.step().phase();
            return Err(ValidationError::StepMismatch {
                expected: QuizStep::prepared(phase).unwrap_or(QuizStep::PreparedPhase1),
                actual: other.step(),
            });
        }
    };

    Ok(PhaseView {
        topic_id: data.topic_id.clone(),
        topic_name: data.topic_name.clone(),
        phase: data.step().phase(),
        questions,
    })
}

/// Correction of the phase that was just submitted.
pub fn phase_review(data: &QuizData) -> Result<PhaseReview, ValidationError> {
    let details = match &data.stage {
        QuizStage::SubmittedPhase1(questions) => ReviewDetails::MultipleChoice(questions.clone()),
        QuizStage::SubmittedPhase2(questions) => ReviewDetails::YearGuess(questions.clone()),
        QuizStage::SubmittedPhase3(result) => {
            let mut chronology = result.questions.clone();
            chronology.sort_by_key(|question| question.order);
            ReviewDetails::Chronology {
                placements: result.placements.clone(),
                chronology,
            }
        }
        other => {
            return Err(ValidationError::StepMismatch {
                expected: other.step().next().unwrap_or(QuizStep::SubmittedPhase3),
                actual: other.step(),
            });
        }
    };

    Ok(PhaseReview {
        topic_id: data.topic_id.clone(),
        topic_name: data.topic_name.clone(),
        phase: data.step().phase(),
        points: data.points,
        correct_guesses: data.correct_guesses,
        details,
    })
}

pub fn summary(data: &QuizData, rules: &QuizRules) -> Result<QuizSummary, ValidationError> {
    let QuizStage::SubmittedPhase3(result) = &data.stage else {
        return Err(mismatch(QuizStep::SubmittedPhase3, &data.stage));
    };

    let events = data.events.len();
    Ok(QuizSummary {
        topic_id: data.topic_id.clone(),
        topic_name: data.topic_name.clone(),
        points: data.points,
        correct_guesses: data.correct_guesses,
        questions_count: rules.questions_count(events),
        potential_points: rules.potential_points(events),
        ranking: result.ranking,
        ranking_message: result.ranking.message(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Event;
    use chrono::{Duration, NaiveDate, TimeZone};
    use rand::{rngs::StdRng, SeedableRng};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn topic(events: usize) -> Topic {
        Topic {
            id: "topic-1".to_string(),
            name: "Schweizer Geschichte".to_string(),
            events: (0..events)
                .map(|i| {
                    Event::new(
                        format!("e{}", i),
                        format!("Ereignis {}", i),
                        NaiveDate::from_ymd_opt(1500 + 25 * i as i32, 3, 1).unwrap(),
                    )
                })
                .collect(),
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(2024)
    }

    fn started() -> QuizData {
        start(&topic(9), &QuizRules::default(), &mut rng(), t0()).unwrap()
    }

    fn correct_years(data: &QuizData) -> Vec<Option<i32>> {
        match &data.stage {
            QuizStage::PreparedPhase1(questions) => {
                questions.iter().map(|q| Some(q.event_year)).collect()
            }
            QuizStage::PreparedPhase2(questions) => {
                questions.iter().map(|q| Some(q.event_year)).collect()
            }
            other => panic!("no year questions at {}", other.step()),
        }
    }

    fn true_order(data: &QuizData) -> Vec<String> {
        match &data.stage {
            QuizStage::PreparedPhase3(questions) => {
                let mut sorted = questions.clone();
                sorted.sort_by_key(|q| q.order);
                sorted.into_iter().map(|q| q.event_name).collect()
            }
            other => panic!("no timeline at {}", other.step()),
        }
    }

    #[test]
    fn start_requires_enough_events() {
        let rules = QuizRules::default();
        let err = start(&topic(6), &rules, &mut rng(), t0()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InsufficientEvents {
                required: 7,
                available: 6
            }
        );
        assert!(err.to_string().contains("nur 6 Ereignisse"));

        assert!(start(&topic(7), &rules, &mut rng(), t0()).is_ok());
    }

    #[test]
    fn start_captures_a_shuffled_snapshot() {
        let source = topic(9);
        let data = start(&source, &QuizRules::default(), &mut rng(), t0()).unwrap();

        assert_eq!(data.step(), QuizStep::PreparedPhase1);
        assert_eq!(data.points, 0);
        assert_eq!(data.timestamp, t0());
        assert_eq!(data.events.len(), 9);

        let mut ids: Vec<&str> = data.events.iter().map(|e| e.id.as_str()).collect();
        ids.sort();
        let mut expected: Vec<&str> = source.events.iter().map(|e| e.id.as_str()).collect();
        expected.sort();
        assert_eq!(ids, expected);

        let QuizStage::PreparedPhase1(questions) = &data.stage else {
            panic!("expected phase 1 questions");
        };
        for (question, event) in questions.iter().zip(&data.events) {
            assert_eq!(question.event_name, event.name);
        }
    }

    #[test]
    fn validate_reports_each_failure() {
        let rules = QuizRules::default();
        let data = started();

        assert_eq!(
            validate(None, QuizStep::PreparedPhase1, "topic-1", &rules, t0()).unwrap_err(),
            ValidationError::NoSession
        );
        assert_eq!(
            validate(Some(&data), QuizStep::PreparedPhase1, "topic-2", &rules, t0()).unwrap_err(),
            ValidationError::TopicMismatch
        );
        assert_eq!(
            validate(Some(&data), QuizStep::PreparedPhase2, "topic-1", &rules, t0()).unwrap_err(),
            ValidationError::StepMismatch {
                expected: QuizStep::PreparedPhase2,
                actual: QuizStep::PreparedPhase1
            }
        );
        assert!(validate(Some(&data), QuizStep::PreparedPhase1, "topic-1", &rules, t0()).is_ok());
    }

    #[test]
    fn expiry_window_is_inclusive() {
        let rules = QuizRules::default();
        let data = started();

        let at_limit = t0() + Duration::minutes(20);
        assert!(validate(Some(&data), QuizStep::PreparedPhase1, "topic-1", &rules, at_limit).is_ok());

        let late = at_limit + Duration::seconds(1);
        assert_eq!(
            validate(Some(&data), QuizStep::PreparedPhase1, "topic-1", &rules, late).unwrap_err(),
            ValidationError::Expired { minutes: 20 }
        );
    }

    #[test]
    fn submit_after_21_minutes_is_expired() {
        let rules = QuizRules::default();
        let data = started();
        let answers = correct_years(&data);

        let err = submit_phase1(
            Some(data),
            "topic-1",
            &answers,
            &rules,
            t0() + Duration::minutes(21),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::Expired { minutes: 20 });
    }

    #[test]
    fn full_playthrough_with_perfect_answers() {
        let rules = QuizRules::default();
        let mut now = t0();
        let mut data = started();

        let answers = correct_years(&data);
        now += Duration::minutes(2);
        let (next, score) = submit_phase1(Some(data), "topic-1", &answers, &rules, now).unwrap();
        data = next;
        assert_eq!(score.points, 9);
        assert_eq!(data.step(), QuizStep::SubmittedPhase1);
        assert_eq!(data.timestamp, now);

        now += Duration::minutes(1);
        data = prepare_phase2(Some(data), "topic-1", &rules, now).unwrap();
        assert_eq!(data.step(), QuizStep::PreparedPhase2);
        assert_eq!(data.points, 9);

        let answers = correct_years(&data);
        now += Duration::minutes(3);
        let (next, score) = submit_phase2(Some(data), "topic-1", &answers, &rules, now).unwrap();
        data = next;
        assert_eq!(score.points, 32);
        assert_eq!(data.points, 41);

        now += Duration::minutes(1);
        data = prepare_phase3(Some(data), "topic-1", &rules, &mut rng(), now).unwrap();
        let order = true_order(&data);
        assert_eq!(order.len(), 9);

        now += Duration::minutes(5);
        let (data, score) =
            submit_phase3(Some(data), "topic-1", &order, &[], &rules, now).unwrap();
        assert_eq!(score.points, 45);
        assert_eq!(data.points, 86);
        assert_eq!(data.correct_guesses, 3 + 4 + 9);
        assert_eq!(data.step(), QuizStep::SubmittedPhase3);

        let summary = summary(&data, &rules).unwrap();
        assert_eq!(summary.points, 86);
        assert_eq!(summary.questions_count, 16);
        assert_eq!(summary.potential_points, 86);
        assert_eq!(summary.ranking.percentile, None);
    }

    #[test]
    fn phase2_uses_events_not_seen_in_phase1() {
        let rules = QuizRules::default();
        let data = started();
        let QuizStage::PreparedPhase1(p1) = &data.stage else {
            panic!("expected phase 1");
        };
        let p1_names: Vec<String> = p1.iter().map(|q| q.event_name.clone()).collect();

        let (data, _) = submit_phase1(Some(data), "topic-1", &[], &rules, t0()).unwrap();
        let data = prepare_phase2(Some(data), "topic-1", &rules, t0()).unwrap();
        let QuizStage::PreparedPhase2(p2) = &data.stage else {
            panic!("expected phase 2");
        };

        assert_eq!(p2.len(), 4);
        assert!(p2.iter().all(|q| !p1_names.contains(&q.event_name)));
        for (question, event) in p2.iter().zip(&data.events[3..7]) {
            assert_eq!(question.event_name, event.name);
        }
    }

    #[test]
    fn points_never_decrease_across_phases() {
        let rules = QuizRules::default();
        let data = started();
        let (data, _) = submit_phase1(Some(data), "topic-1", &[], &rules, t0()).unwrap();
        assert_eq!(data.points, 0);
        let data = prepare_phase2(Some(data), "topic-1", &rules, t0()).unwrap();
        let (data, _) =
            submit_phase2(Some(data), "topic-1", &[Some(0); 4], &rules, t0()).unwrap();
        let data = prepare_phase3(Some(data), "topic-1", &rules, &mut rng(), t0()).unwrap();
        let reversed: Vec<String> = true_order(&data).into_iter().rev().collect();
        let (data, _) =
            submit_phase3(Some(data), "topic-1", &reversed, &[], &rules, t0()).unwrap();
        assert!(data.points >= 0);
    }

    #[test]
    fn repeating_a_submit_is_a_step_mismatch() {
        let rules = QuizRules::default();
        let data = started();
        let (data, _) = submit_phase1(Some(data), "topic-1", &[], &rules, t0()).unwrap();

        let err = submit_phase1(Some(data.clone()), "topic-1", &[], &rules, t0()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::StepMismatch {
                expected: QuizStep::PreparedPhase1,
                actual: QuizStep::SubmittedPhase1
            }
        );
    }

    #[test]
    fn skipping_ahead_is_a_step_mismatch() {
        let rules = QuizRules::default();
        let data = started();

        let err = prepare_phase3(Some(data), "topic-1", &rules, &mut rng(), t0()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::StepMismatch {
                expected: QuizStep::SubmittedPhase2,
                actual: QuizStep::PreparedPhase1
            }
        );
    }

    #[test]
    fn transitions_without_a_record_report_no_session() {
        let rules = QuizRules::default();
        assert_eq!(
            prepare_phase2(None, "topic-1", &rules, t0()).unwrap_err(),
            ValidationError::NoSession
        );
        assert_eq!(
            submit_phase3(None, "topic-1", &[], &[], &rules, t0()).unwrap_err(),
            ValidationError::NoSession
        );
    }

    #[test]
    fn switching_topic_mid_quiz_is_rejected() {
        let rules = QuizRules::default();
        let data = started();
        let err = submit_phase1(Some(data), "topic-9", &[], &rules, t0()).unwrap_err();
        assert_eq!(err, ValidationError::TopicMismatch);
    }

    #[test]
    fn submit_phase3_ranks_against_earlier_scores() {
        let rules = QuizRules::default();
        let data = started();
        let (data, _) = submit_phase1(Some(data), "topic-1", &[], &rules, t0()).unwrap();
        let data = prepare_phase2(Some(data), "topic-1", &rules, t0()).unwrap();
        let (data, _) = submit_phase2(Some(data), "topic-1", &[], &rules, t0()).unwrap();
        let data = prepare_phase3(Some(data), "topic-1", &rules, &mut rng(), t0()).unwrap();
        let order = true_order(&data);

        let population: Vec<Score> = [90, 45, 45, 10]
            .iter()
            .map(|points| Score {
                topic_id: "topic-1".to_string(),
                user_id: "other".to_string(),
                points: *points,
                date: t0(),
            })
            .collect();

        let (data, _) =
            submit_phase3(Some(data), "topic-1", &order, &population, &rules, t0()).unwrap();
        assert_eq!(data.points, 45);

        let summary = summary(&data, &rules).unwrap();
        assert_eq!(summary.ranking.percentile, Some(25));
        assert_eq!(summary.ranking.population, 4);
    }

    #[test]
    fn views_hide_answers_and_reviews_reveal_them() {
        let rules = QuizRules::default();
        let data = started();

        let view = phase_view(&data).unwrap();
        assert_eq!(view.phase, 1);
        let PhaseQuestions::MultipleChoice(questions) = &view.questions else {
            panic!("expected multiple choice");
        };
        assert_eq!(questions.len(), 3);
        assert!(phase_review(&data).is_err());

        let answers = correct_years(&data);
        let (data, _) = submit_phase1(Some(data), "topic-1", &answers, &rules, t0()).unwrap();
        assert!(phase_view(&data).is_err());

        let review = phase_review(&data).unwrap();
        assert_eq!(review.phase, 1);
        assert_eq!(review.points, 9);
        let ReviewDetails::MultipleChoice(questions) = &review.details else {
            panic!("expected phase 1 review");
        };
        assert!(questions.iter().all(|q| q.correct_guess));
    }

    #[test]
    fn summary_requires_completed_quiz() {
        let rules = QuizRules::default();
        let data = started();
        assert_eq!(
            summary(&data, &rules).unwrap_err(),
            ValidationError::StepMismatch {
                expected: QuizStep::SubmittedPhase3,
                actual: QuizStep::PreparedPhase1
            }
        );
    }
}
