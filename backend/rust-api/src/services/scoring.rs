//! Points per phase. Scoring fills in the user's guesses on the question set
//! for the review and returns what the phase adds to the session.

use std::collections::HashMap;

use crate::config::QuizRules;
use crate::models::{Phase1Question, Phase2Question, Phase3Placement, Phase3Question};

/// Contribution of one submitted phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseScore {
    pub points: i32,
    pub correct_guesses: u32,
}

impl PhaseScore {
    fn add(&mut self, points: i32, correct: bool) {
        self.points += points;
        if correct {
            self.correct_guesses += 1;
        }
    }
}

/// Phase 1: `p1_points` for picking the correct year, nothing otherwise.
/// A missing answer counts as wrong.
pub fn score_phase1(
    questions: &mut [Phase1Question],
    answers: &[Option<i32>],
    rules: &QuizRules,
) -> PhaseScore {
    let mut score = PhaseScore::default();

    for (index, question) in questions.iter_mut().enumerate() {
        let guess = answers.get(index).copied().flatten();
        let correct = guess == Some(question.event_year);

        question.user_guess = guess;
        question.correct_guess = correct;
        question.points = if correct { rules.p1_points } else { 0 };

        score.add(question.points, correct);
    }

    score
}

/// Points for one phase 2 guess: full points when exact, otherwise
/// `p2_partial_points - d` while the difference `d` stays below
/// `p2_partial_points`.
pub fn phase2_points(correct_year: i32, guess: i32, rules: &QuizRules) -> i32 {
    if guess == correct_year {
        return rules.p2_points;
    }

    let difference = (correct_year - guess).abs();
    if difference < rules.p2_partial_points {
        rules.p2_partial_points - difference
    } else {
        0
    }
}

/// Phase 2: exact or partial credit per question, see [`phase2_points`].
pub fn score_phase2(
    questions: &mut [Phase2Question],
    answers: &[Option<i32>],
    rules: &QuizRules,
) -> PhaseScore {
    let mut score = PhaseScore::default();

    for (index, question) in questions.iter_mut().enumerate() {
        let guess = answers.get(index).copied().flatten();

        question.user_guess = guess;
        question.correct_guess = guess == Some(question.event_year);
        question.points = guess
            .map(|year| phase2_points(question.event_year, year, rules))
            .unwrap_or(0);

        score.add(question.points, question.correct_guess);
    }

    score
}

/// Phase 3: each presentation slot earns `p3_points` minus how far the chosen
/// event's true rank is from that slot, never less than zero.
///
/// `order` lists event names by slot. Unknown or missing names earn nothing.
pub fn score_phase3(
    questions: &[Phase3Question],
    order: &[String],
    rules: &QuizRules,
) -> (Vec<Phase3Placement>, PhaseScore) {
    let true_order: HashMap<&str, usize> = questions
        .iter()
        .map(|question| (question.event_name.as_str(), question.order))
        .collect();

    let mut score = PhaseScore::default();
    let placements = (0..questions.len())
        .map(|slot| {
            let event_name = order.get(slot).cloned();
            let rank = event_name
                .as_deref()
                .and_then(|name| true_order.get(name).copied());

            let (points, correct) = match rank {
                Some(rank) => {
                    let difference = rank.abs_diff(slot) as i32;
                    ((rules.p3_points - difference).max(0), difference == 0)
                }
                None => (0, false),
            };
            score.add(points, correct);

            Phase3Placement {
                slot,
                event_name,
                true_order: rank,
                points,
                correct_guess: correct,
            }
        })
        .collect();

    (placements, score)
}
